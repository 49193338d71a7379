use crate::types::Points;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Table '{table}' is missing required column '{column}'")]
    SchemaInvalid { table: String, column: String },

    #[error("No player roster found (looked for {tried:?})")]
    RosterMissing { tried: Vec<String> },

    #[error("Insufficient balance for '{name}': requested {requested}, available {available}")]
    InsufficientBalance {
        name: String,
        requested: Points,
        available: Points,
    },

    #[error("Invalid redemption amount: {amount}")]
    InvalidAmount { amount: Points },

    #[error("Player '{name}' not found in the ledger")]
    PlayerNotFound { name: String },

    #[error("A reason is required for manual adjustments")]
    MissingReason,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    /// Player-facing validation failures, as opposed to a misconfigured
    /// environment (missing tables, broken schema, database faults).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. }
                | Self::InvalidAmount { .. }
                | Self::PlayerNotFound { .. }
                | Self::MissingReason
        )
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
