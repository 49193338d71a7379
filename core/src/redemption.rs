//! Redemption ledger: the append-only log of points spent.
//!
//! RULES:
//!   - Records are only ever appended. Nothing here updates or deletes.
//!   - `redeemed` for a player is the sum of that player's record amounts;
//!     there is no other source of truth for it.
//!   - Validation (amount > 0, amount ≤ current) happens in
//!     `Ledger::record_redemption` before `append` is reached.

use crate::{
    aggregate::PlayerTotals,
    clock::{format_timestamp, parse_timestamp},
    error::{LedgerError, LedgerResult},
    schema::{
        self, AMOUNT, CATEGORY, EVENT_ID, NAME, REASON, REDEMPTION_FIELDS, ROW_ID, STAFF,
        TIMESTAMP,
    },
    sheet::{Cell, SheetRow},
    store::LedgerStore,
    types::{normalize_name, PlayerName, Points, RowId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a caller asks for when spending points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    pub name: PlayerName,
    pub amount: Points,
    pub reason: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub staff: String,
}

impl RedemptionRequest {
    pub fn new(name: impl Into<String>, amount: Points, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount,
            reason: reason.into(),
            category: String::new(),
            event_id: String::new(),
            staff: String::new(),
        }
    }
}

/// One immutable row of the redemption log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionRecord {
    /// None only for legacy rows whose timestamp cell does not parse.
    pub timestamp: Option<DateTime<Utc>>,
    pub player_name: PlayerName,
    pub amount: Points,
    pub reason: String,
    pub category: String,
    pub event_id: String,
    pub staff: String,
    pub row_id: RowId,
}

impl RedemptionRecord {
    pub fn from_request(request: &RedemptionRequest, at: DateTime<Utc>, row_id: RowId) -> Self {
        Self {
            timestamp: Some(at),
            player_name: request.name.trim().to_string(),
            amount: request.amount,
            reason: request.reason.clone(),
            category: request.category.clone(),
            event_id: request.event_id.clone(),
            staff: request.staff.clone(),
            row_id,
        }
    }
}

/// A fresh transaction identifier.
pub fn new_row_id() -> RowId {
    uuid::Uuid::new_v4().to_string()
}

/// Sum of amounts per player.
pub fn totals_by_player(records: &[RedemptionRecord]) -> PlayerTotals {
    let mut totals = PlayerTotals::new();
    for record in records {
        let entry = totals.entry(record.player_name.clone()).or_insert(0);
        *entry = entry.saturating_add(record.amount);
    }
    totals
}

/// Most recent first; records sharing a timestamp keep reverse log order.
pub fn sort_most_recent_first(records: &mut [RedemptionRecord]) {
    records.reverse();
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Store-backed view of the redemption log table.
pub struct RedemptionLog<'a> {
    store: &'a LedgerStore,
    table: &'a str,
}

impl<'a> RedemptionLog<'a> {
    pub fn new(store: &'a LedgerStore, table: &'a str) -> Self {
        Self { store, table }
    }

    /// Create the log or add missing canonical columns.
    pub fn ensure_schema(&self) -> LedgerResult<()> {
        schema::ensure_schema(self.store, self.table, REDEMPTION_FIELDS)?;
        Ok(())
    }

    /// Every valid record in log order. A missing table is an empty log.
    /// Rows with a blank name or a non-positive amount are skipped.
    pub fn records(&self) -> LedgerResult<Vec<RedemptionRecord>> {
        if !self.store.table_exists(self.table)? {
            return Ok(Vec::new());
        }
        let sheet = self.store.read_table(self.table)?;
        let resolved = schema::resolve(self.table, &sheet.headers, REDEMPTION_FIELDS);
        let name_col = resolved.require(NAME)?;
        let amount_col = resolved.require(AMOUNT)?;
        let text = |row: &SheetRow, key: &str| {
            resolved
                .get(key)
                .map(|i| row.cell(i).as_text())
                .unwrap_or_default()
        };

        let mut records = Vec::with_capacity(sheet.rows.len());
        for row in &sheet.rows {
            let Some(player_name) = normalize_name(&row.cell(name_col).as_text()) else {
                continue;
            };
            let amount = row.cell(amount_col).as_points();
            if amount <= 0 {
                log::debug!("{}: skipping row {} with amount {amount}", self.table, row.row_id);
                continue;
            }
            let row_id = match text(row, ROW_ID) {
                id if id.trim().is_empty() => format!("row-{}", row.row_id),
                id => id,
            };
            records.push(RedemptionRecord {
                timestamp: parse_timestamp(&text(row, TIMESTAMP)),
                player_name,
                amount,
                reason: text(row, REASON),
                category: text(row, CATEGORY),
                event_id: text(row, EVENT_ID),
                staff: text(row, STAFF),
                row_id,
            });
        }
        Ok(records)
    }

    pub fn totals(&self) -> LedgerResult<PlayerTotals> {
        Ok(totals_by_player(&self.records()?))
    }

    /// Sum of a player's redemptions; 0 if none.
    pub fn total_redeemed(&self, name: &str) -> LedgerResult<Points> {
        let name = name.trim();
        Ok(self
            .records()?
            .iter()
            .filter(|r| r.player_name == name)
            .map(|r| r.amount)
            .fold(0, Points::saturating_add))
    }

    /// A player's records, most recent first.
    pub fn history(&self, name: &str) -> LedgerResult<Vec<RedemptionRecord>> {
        let name = name.trim();
        let mut records: Vec<_> = self
            .records()?
            .into_iter()
            .filter(|r| r.player_name == name)
            .collect();
        sort_most_recent_first(&mut records);
        Ok(records)
    }

    /// The latest `limit` records across all players.
    pub fn recent(&self, limit: usize) -> LedgerResult<Vec<RedemptionRecord>> {
        let mut records = self.records()?;
        sort_most_recent_first(&mut records);
        records.truncate(limit);
        Ok(records)
    }

    /// Append one record. The only write this log ever performs.
    pub fn append(&self, record: &RedemptionRecord) -> LedgerResult<()> {
        if record.amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount: record.amount });
        }
        let resolved = schema::ensure_schema(self.store, self.table, REDEMPTION_FIELDS)?;
        let column = |key: &str| -> LedgerResult<String> {
            resolved
                .header(key)
                .map(str::to_string)
                .ok_or_else(|| LedgerError::SchemaInvalid {
                    table: self.table.to_string(),
                    column: key.to_string(),
                })
        };
        let timestamp = record
            .timestamp
            .map(|t| Cell::text(format_timestamp(&t)))
            .unwrap_or_default();
        let cells = vec![
            (column(TIMESTAMP)?, timestamp),
            (column(NAME)?, Cell::text(&record.player_name)),
            (column(AMOUNT)?, Cell::from(record.amount)),
            (column(REASON)?, Cell::text(&record.reason)),
            (column(CATEGORY)?, Cell::text(&record.category)),
            (column(EVENT_ID)?, Cell::text(&record.event_id)),
            (column(STAFF)?, Cell::text(&record.staff)),
            (column(ROW_ID)?, Cell::text(&record.row_id)),
        ];
        self.store.append_row(self.table, &cells)?;
        log::debug!(
            "{}: appended {} for '{}' ({})",
            self.table,
            record.amount,
            record.player_name,
            record.row_id
        );
        Ok(())
    }
}
