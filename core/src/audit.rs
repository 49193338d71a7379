//! Audit sink: one-way record of every ledger operation outcome.
//!
//! RULE: Audit emission is fire-and-forget. A sink that fails must never
//! fail the operation being audited; the ledger logs the sink error and
//! carries on.

use crate::{clock::format_timestamp, store::{AuditRow, LedgerStore}};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ReconcileAll,
    ReconcileOne,
    Redemption,
    AdjustHistorical,
    EnsureSchema,
}

impl AuditAction {
    /// Stable name used for the `action_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReconcileAll => "RECONCILE_ALL",
            Self::ReconcileOne => "RECONCILE_ONE",
            Self::Redemption => "REDEMPTION",
            Self::AdjustHistorical => "ADJUST_HISTORICAL",
            Self::EnsureSchema => "ENSURE_SCHEMA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub action: AuditAction,
    pub details: String,
    pub status: AuditStatus,
}

pub trait AuditSink: Send {
    fn emit(&mut self, entry: &AuditEntry) -> anyhow::Result<()>;
}

/// Writes entries to the `log` facade only.
#[derive(Debug, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn emit(&mut self, entry: &AuditEntry) -> anyhow::Result<()> {
        match entry.status {
            AuditStatus::Success => {
                log::info!("audit {} SUCCESS: {}", entry.action.as_str(), entry.details)
            }
            AuditStatus::Failed => {
                log::warn!("audit {} FAILED: {}", entry.action.as_str(), entry.details)
            }
        }
        Ok(())
    }
}

/// Collects entries in memory. Clones share the same buffer, so a test
/// keeps one handle and hands the other to the ledger.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, action: AuditAction, status: AuditStatus) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.action == action && e.status == status)
            .count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&mut self, entry: &AuditEntry) -> anyhow::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

/// Persists entries to the `audit_log` table through its own connection.
pub struct SqliteAuditSink {
    store: LedgerStore,
}

impl SqliteAuditSink {
    /// `store` must already be migrated.
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }
}

impl AuditSink for SqliteAuditSink {
    fn emit(&mut self, entry: &AuditEntry) -> anyhow::Result<()> {
        self.store.append_audit(&AuditRow {
            id: None,
            logged_at: format_timestamp(&entry.at),
            action_type: entry.action.as_str().to_string(),
            details: entry.details.clone(),
            status: entry.status.as_str().to_string(),
        })?;
        Ok(())
    }
}
