//! The BP_Total ledger table: reading stored balances and rendering
//! derived ones back into cells.
//!
//! The table acts as a cache of derived values. Only the columns listed
//! in `DERIVED_KEYS` (plus the name and the `lastUpdated` stamp) are ever
//! written; any other column a maintainer added is left alone.

use crate::{
    balance::{CategoryPoints, PlayerBalance},
    clock::{format_timestamp, parse_timestamp},
    error::LedgerResult,
    schema::{
        self, ResolvedSchema, ATTENDANCE, CURRENT, DICE, FLAG, HISTORICAL, LAST_UPDATED,
        LEDGER_FIELDS, NAME, OVERFLOW, REDEEMED,
    },
    sheet::{Cell, SheetWrite},
    store::LedgerStore,
    types::{normalize_name, PlayerName, Points},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Columns reconciliation owns, in `PlayerBalance::derived_values` order.
pub const DERIVED_KEYS: [&str; 7] = [CURRENT, ATTENDANCE, FLAG, DICE, HISTORICAL, REDEEMED, OVERFLOW];

const CURRENT_IDX: usize = 0;
const HISTORICAL_IDX: usize = 4;
const REDEEMED_IDX: usize = 5;
const OVERFLOW_IDX: usize = 6;

/// One ledger row as stored. `values` is None where a cell is empty or
/// not a number.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub row_id: i64,
    pub name: PlayerName,
    pub values: [Option<Points>; 7],
    pub last_updated: Option<DateTime<Utc>>,
}

impl StoredRow {
    /// True when any reconciliation-owned column differs from `derived`.
    pub fn differs_from(&self, derived: &PlayerBalance) -> bool {
        self.values
            .iter()
            .zip(derived.derived_values())
            .any(|(stored, value)| *stored != Some(value))
    }

    /// How far a manual adjustment has moved `historical` away from the
    /// stored category columns. 0 when any of them is empty.
    pub fn adjustment(&self) -> Points {
        let stored = |i: usize| self.values[i];
        match (stored(1), stored(2), stored(3), stored(HISTORICAL_IDX)) {
            (Some(a), Some(f), Some(d), Some(h)) => {
                h.saturating_sub(a.saturating_add(f).saturating_add(d))
            }
            _ => 0,
        }
    }

    pub fn historical(&self) -> Points {
        self.values[HISTORICAL_IDX].unwrap_or(0)
    }

    pub fn redeemed(&self) -> Points {
        self.values[REDEEMED_IDX].unwrap_or(0)
    }

    pub fn current(&self) -> Points {
        self.values[CURRENT_IDX].unwrap_or(0)
    }

    pub fn overflow(&self) -> Points {
        self.values[OVERFLOW_IDX].unwrap_or(0)
    }

    pub fn to_balance(&self) -> PlayerBalance {
        let v = |i: usize| self.values[i].unwrap_or(0);
        PlayerBalance {
            name: self.name.clone(),
            points: CategoryPoints {
                attendance: v(1),
                flag: v(2),
                dice: v(3),
            },
            historical: v(HISTORICAL_IDX),
            redeemed: v(REDEEMED_IDX),
            current: v(CURRENT_IDX),
            overflow: v(OVERFLOW_IDX),
            last_updated: self.last_updated,
        }
    }
}

/// The ledger as read at one instant.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub schema: ResolvedSchema,
    pub rows: Vec<StoredRow>,
    by_name: HashMap<PlayerName, usize>,
}

impl LedgerSnapshot {
    pub fn empty(schema: ResolvedSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// The first row stored for `name`.
    pub fn find(&self, name: &str) -> Option<&StoredRow> {
        self.by_name.get(name).map(|&i| &self.rows[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.name.as_str())
    }

    /// Header text for a canonical key. Every key is present once the
    /// schema has been ensured.
    pub(crate) fn column(&self, key: &str) -> LedgerResult<String> {
        self.schema.require(key)?;
        Ok(self.schema.header(key).unwrap_or(key).to_string())
    }

    /// Cells for every derived column plus the stamp.
    pub fn balance_cells(
        &self,
        balance: &PlayerBalance,
        stamp: &DateTime<Utc>,
    ) -> LedgerResult<Vec<(String, Cell)>> {
        let mut cells = Vec::with_capacity(DERIVED_KEYS.len() + 1);
        for (key, value) in DERIVED_KEYS.iter().zip(balance.derived_values()) {
            cells.push((self.column(key)?, Cell::from(value)));
        }
        cells.push((self.column(LAST_UPDATED)?, Cell::text(format_timestamp(stamp))));
        Ok(cells)
    }

    /// The write that brings the stored row for `balance.name` in line,
    /// or None when nothing differs.
    pub fn write_for(
        &self,
        balance: &PlayerBalance,
        stamp: &DateTime<Utc>,
    ) -> LedgerResult<Option<SheetWrite>> {
        match self.find(&balance.name) {
            Some(stored) if !stored.differs_from(balance) => Ok(None),
            Some(stored) => Ok(Some(SheetWrite::Update {
                row_id: stored.row_id,
                cells: self.balance_cells(balance, stamp)?,
            })),
            None => {
                let mut cells = vec![(self.column(NAME)?, Cell::text(&balance.name))];
                cells.extend(self.balance_cells(balance, stamp)?);
                Ok(Some(SheetWrite::Insert { cells }))
            }
        }
    }
}

/// Store-backed view of the ledger table.
pub struct LedgerTable<'a> {
    store: &'a LedgerStore,
    table: &'a str,
}

impl<'a> LedgerTable<'a> {
    pub fn new(store: &'a LedgerStore, table: &'a str) -> Self {
        Self { store, table }
    }

    pub fn ensure_schema(&self) -> LedgerResult<ResolvedSchema> {
        schema::ensure_schema(self.store, self.table, LEDGER_FIELDS)
    }

    /// Read the table if it exists. Never creates or alters it.
    pub fn read_existing(&self) -> LedgerResult<Option<LedgerSnapshot>> {
        if !self.store.table_exists(self.table)? {
            return Ok(None);
        }
        let sheet = self.store.read_table(self.table)?;
        let resolved = schema::resolve(self.table, &sheet.headers, LEDGER_FIELDS);
        let name_col = resolved.require(NAME)?;
        let columns: Vec<Option<usize>> = DERIVED_KEYS.iter().map(|k| resolved.get(k)).collect();
        let stamp_col = resolved.get(LAST_UPDATED);

        let mut snapshot = LedgerSnapshot::empty(resolved);
        for row in &sheet.rows {
            let Some(name) = normalize_name(&row.cell(name_col).as_text()) else {
                continue;
            };
            let mut values = [None; 7];
            for (slot, col) in values.iter_mut().zip(&columns) {
                *slot = col.and_then(|c| row.cell(c).as_signed_points());
            }
            let last_updated = stamp_col.and_then(|c| parse_timestamp(&row.cell(c).as_text()));

            if snapshot.by_name.contains_key(&name) {
                log::warn!(
                    "{}: duplicate row {} for '{name}' ignored; the first row is authoritative",
                    self.table,
                    row.row_id
                );
                continue;
            }
            snapshot.by_name.insert(name.clone(), snapshot.rows.len());
            snapshot.rows.push(StoredRow {
                row_id: row.row_id,
                name,
                values,
                last_updated,
            });
        }
        Ok(Some(snapshot))
    }

    /// Ensure the schema, then read.
    pub fn read(&self) -> LedgerResult<LedgerSnapshot> {
        let resolved = self.ensure_schema()?;
        Ok(self
            .read_existing()?
            .unwrap_or_else(|| LedgerSnapshot::empty(resolved)))
    }

    pub fn apply(&self, writes: &[SheetWrite]) -> LedgerResult<usize> {
        self.store.apply_writes(self.table, writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{balance::derive_balance, clock::{Clock, FixedClock}, config::CapPolicy};

    #[test]
    fn unchanged_balance_produces_no_write() {
        let store = LedgerStore::in_memory().unwrap();
        let table = LedgerTable::new(&store, "BP_Total");
        let now = FixedClock::epoch().now();
        let points = CategoryPoints { attendance: 10, flag: 5, dice: 0 };
        let balance = derive_balance("Ada", points, 0, 100, CapPolicy::TrackOverflow);

        let snapshot = table.read().unwrap();
        let write = snapshot.write_for(&balance, &now).unwrap().unwrap();
        assert!(matches!(write, SheetWrite::Insert { .. }));
        table.apply(&[write]).unwrap();

        let snapshot = table.read().unwrap();
        assert_eq!(snapshot.find("Ada").unwrap().to_balance().current, 15);
        assert!(snapshot.write_for(&balance, &now).unwrap().is_none());
    }

    #[test]
    fn empty_cells_count_as_different() {
        let row = StoredRow {
            row_id: 1,
            name: "Ada".into(),
            values: [Some(0), Some(0), Some(0), Some(0), Some(0), Some(0), None],
            last_updated: None,
        };
        let zero = derive_balance("Ada", CategoryPoints::default(), 0, 100, CapPolicy::TrackOverflow);
        assert!(row.differs_from(&zero));
    }

    #[test]
    fn extra_columns_survive_reconciliation_writes() {
        let store = LedgerStore::in_memory().unwrap();
        store
            .create_table("BP_Total", &["Name".to_string(), "Team".to_string()])
            .unwrap();
        store
            .append_row(
                "BP_Total",
                &[("Name".into(), Cell::text("Ada")), ("Team".into(), Cell::text("Red"))],
            )
            .unwrap();

        let table = LedgerTable::new(&store, "BP_Total");
        let snapshot = table.read().unwrap();
        let balance = derive_balance(
            "Ada",
            CategoryPoints { attendance: 3, flag: 0, dice: 0 },
            0,
            100,
            CapPolicy::TrackOverflow,
        );
        let write = snapshot
            .write_for(&balance, &FixedClock::epoch().now())
            .unwrap()
            .unwrap();
        table.apply(&[write]).unwrap();

        let sheet = store.read_table("BP_Total").unwrap();
        assert_eq!(&sheet.headers[..2], &["Name".to_string(), "Team".to_string()]);
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0].cell(1), &Cell::text("Red"));
    }
}
