//! Balance queries and manual historical adjustments.
//!
//! Queries read the reconciled ledger table as it stands; unknown players
//! read as zero. `adjust_historical` is the one write path that bypasses
//! aggregation: it overrides `historical` until the player is next
//! reconciled, at which point the source totals win again.

use crate::{
    audit::{AuditAction, AuditStatus},
    balance::{settle, PlayerBalance},
    clock::format_timestamp,
    engine::Ledger,
    error::{LedgerError, LedgerResult},
    ledger_table::LedgerSnapshot,
    schema::{CURRENT, HISTORICAL, LAST_UPDATED, OVERFLOW},
    sheet::{Cell, SheetWrite},
    types::{PlayerName, Points},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Breakdown {
    pub name: PlayerName,
    pub current: Points,
    pub attendance: Points,
    pub flag: Points,
    pub dice: Points,
    pub historical: Points,
    pub redeemed: Points,
    pub overflow: Points,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<PlayerBalance> for Breakdown {
    fn from(b: PlayerBalance) -> Self {
        Self {
            name: b.name,
            current: b.current,
            attendance: b.points.attendance,
            flag: b.points.flag,
            dice: b.points.dice,
            historical: b.historical,
            redeemed: b.redeemed,
            overflow: b.overflow,
            last_updated: b.last_updated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentResult {
    pub previous_historical: Points,
    pub new_historical: Points,
    pub new_current: Points,
    pub new_overflow: Points,
}

impl Ledger {
    fn snapshot(&self) -> LedgerResult<Option<LedgerSnapshot>> {
        self.ledger_table().read_existing()
    }

    fn stored_balance(&self, name: &str) -> LedgerResult<Option<PlayerBalance>> {
        let name = name.trim();
        Ok(self
            .snapshot()?
            .and_then(|s| s.find(name).map(|row| row.to_balance())))
    }

    /// Spendable balance; 0 for an unknown player.
    pub fn get_balance(&self, name: &str) -> LedgerResult<Points> {
        Ok(self.stored_balance(name)?.map_or(0, |b| b.current))
    }

    /// Every stored column for a player; zeroed for an unknown player.
    pub fn get_breakdown(&self, name: &str) -> LedgerResult<Breakdown> {
        Ok(match self.stored_balance(name)? {
            Some(balance) => balance.into(),
            None => Breakdown {
                name: name.trim().to_string(),
                ..Breakdown::default()
            },
        })
    }

    /// Reconcile the player first, then report.
    pub fn refreshed_breakdown(&mut self, name: &str) -> LedgerResult<Breakdown> {
        self.reconcile_one(name)?;
        self.get_breakdown(name)
    }

    /// Points earned beyond the cap and not yet spent; 0 if unknown.
    pub fn overflow(&self, name: &str) -> LedgerResult<Points> {
        Ok(self.stored_balance(name)?.map_or(0, |b| b.overflow))
    }

    /// Every ledger row, in table order.
    pub fn all_balances(&self) -> LedgerResult<Vec<PlayerBalance>> {
        Ok(self
            .snapshot()?
            .map(|s| s.rows.iter().map(|row| row.to_balance()).collect())
            .unwrap_or_default())
    }

    /// Shift a player's `historical` by `delta` without touching sources.
    /// `current` and `overflow` are recomputed from the stored `redeemed`.
    pub fn adjust_historical(
        &mut self,
        name: &str,
        delta: Points,
        reason: &str,
    ) -> LedgerResult<AdjustmentResult> {
        let context = format!("adjust '{}' by {delta}", name.trim());
        let result = self.apply_adjustment(name.trim(), delta, reason.trim());
        match result {
            Ok(adjustment) => {
                self.emit(
                    AuditAction::AdjustHistorical,
                    AuditStatus::Success,
                    format!(
                        "{context}: {} -> {} (current {}); reason: {}",
                        adjustment.previous_historical,
                        adjustment.new_historical,
                        adjustment.new_current,
                        reason.trim()
                    ),
                );
                Ok(adjustment)
            }
            Err(e) => self.fail(AuditAction::AdjustHistorical, &context, e),
        }
    }

    fn apply_adjustment(&self, name: &str, delta: Points, reason: &str) -> LedgerResult<AdjustmentResult> {
        if reason.is_empty() {
            return Err(LedgerError::MissingReason);
        }
        let not_found = || LedgerError::PlayerNotFound { name: name.to_string() };
        let snapshot = self.snapshot()?.ok_or_else(not_found)?;
        let stored = snapshot.find(name).ok_or_else(not_found)?;

        let previous_historical = stored.historical();
        let new_historical = previous_historical.saturating_add(delta).max(0);
        let (new_current, new_overflow) = settle(
            new_historical,
            stored.redeemed(),
            self.config.cap,
            self.config.cap_policy,
        );

        let column = |key: &str| snapshot.column(key);
        let write = SheetWrite::Update {
            row_id: stored.row_id,
            cells: vec![
                (column(HISTORICAL)?, Cell::from(new_historical)),
                (column(CURRENT)?, Cell::from(new_current)),
                (column(OVERFLOW)?, Cell::from(new_overflow)),
                (column(LAST_UPDATED)?, Cell::text(format_timestamp(&self.now()))),
            ],
        };
        self.ledger_table().apply(&[write])?;
        log::info!("'{name}' historical {previous_historical} -> {new_historical}: {reason}");

        Ok(AdjustmentResult {
            previous_historical,
            new_historical,
            new_current,
            new_overflow,
        })
    }
}
