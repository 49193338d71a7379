//! bp-ledger-core: BP_Total loyalty-points ledger.
//!
//! Aggregates per-category source tables into one ledger row per player,
//! tracks redemptions in an append-only log and keeps
//! `current = historical - redeemed` (capped) consistent across both.

pub mod aggregate;
pub mod audit;
pub mod balance;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod ledger_table;
pub mod reconcile;
pub mod redemption;
pub mod schema;
pub mod sheet;
pub mod store;
pub mod types;
