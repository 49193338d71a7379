//! Shared primitive types used across the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One BP. All balances are whole points.
pub type Points = i64;

/// A player's identity key: trimmed, case-sensitive.
pub type PlayerName = String;

/// Unique identifier of a redemption transaction.
pub type RowId = String;

/// The point categories fed by external source tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Attendance,
    Flag,
    Dice,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Attendance, Category::Flag, Category::Dice];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::Flag => "flag",
            Self::Dice => "dice",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trim a raw identity cell into a name key. Blank names yield None.
pub fn normalize_name(raw: &str) -> Option<PlayerName> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
