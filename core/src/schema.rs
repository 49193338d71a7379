//! Schema resolver: maps observed column headers to canonical fields.
//!
//! Tables are maintained by hand and their headers drift ("Attendance
//! Points" vs "Attendance Mission Points", "BP_Current" vs "Current BP").
//! Every read or write goes through a `ResolvedSchema` first.
//!
//! RULES:
//!   - Matching is on normalized header text (case, `_`/`-`, spacing).
//!   - The leftmost matching column wins.
//!   - `ensure_schema` only ever appends missing canonical columns; it
//!     never reorders, renames, deletes or rewrites existing columns.

use crate::{
    error::{LedgerError, LedgerResult},
    store::LedgerStore,
    types::Category,
};
use std::collections::HashMap;

/// A canonical field: the key the code uses, the header written when the
/// column has to be created, and the legacy header variants accepted.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub header: &'static str,
    pub synonyms: &'static [&'static str],
}

impl FieldSpec {
    fn matches(&self, normalized: &str) -> bool {
        normalize_header(self.header) == normalized
            || self.synonyms.iter().any(|s| normalize_header(s) == normalized)
    }
}

// ── Field keys ────────────────────────────────────────────────

pub const NAME: &str = "name";
pub const CURRENT: &str = "current";
pub const HISTORICAL: &str = "historical";
pub const REDEEMED: &str = "redeemed";
pub const OVERFLOW: &str = "overflow";
pub const ATTENDANCE: &str = "attendance";
pub const FLAG: &str = "flag";
pub const DICE: &str = "dice";
pub const LAST_UPDATED: &str = "last_updated";

pub const TIMESTAMP: &str = "timestamp";
pub const AMOUNT: &str = "amount";
pub const REASON: &str = "reason";
pub const CATEGORY: &str = "category";
pub const EVENT_ID: &str = "event_id";
pub const STAFF: &str = "staff";
pub const ROW_ID: &str = "row_id";

/// Identity column aliases shared by every table.
pub const NAME_FIELD: FieldSpec = FieldSpec {
    key: NAME,
    header: "Player Name",
    synonyms: &["Name", "Player", "Member", "Member Name", "Participant"],
};

pub const ATTENDANCE_FIELD: FieldSpec = FieldSpec {
    key: ATTENDANCE,
    header: "Attendance Mission Points",
    synonyms: &["Attendance Points", "Attendance BP", "Attendance", "Attendance Total"],
};

pub const FLAG_FIELD: FieldSpec = FieldSpec {
    key: FLAG,
    header: "Flag Mission Points",
    synonyms: &["Flag Points", "Flag BP", "Flag Missions", "Flag Total"],
};

pub const DICE_FIELD: FieldSpec = FieldSpec {
    key: DICE,
    header: "Dice Roll Points",
    synonyms: &["Dice Points", "Dice BP", "Dice Roll BP", "Dice Total", "Dice"],
};

/// Canonical layout of the BP_Total ledger table.
pub const LEDGER_FIELDS: &[FieldSpec] = &[
    NAME_FIELD,
    FieldSpec {
        key: CURRENT,
        header: "BP_Current",
        synonyms: &["Current BP", "Current", "Balance", "BP Balance"],
    },
    ATTENDANCE_FIELD,
    FLAG_FIELD,
    DICE_FIELD,
    FieldSpec {
        key: HISTORICAL,
        header: "BP_Historical",
        synonyms: &["Historical BP", "Lifetime BP", "Total Earned", "Historical"],
    },
    FieldSpec {
        key: REDEEMED,
        header: "BP_Redeemed",
        synonyms: &["Redeemed BP", "Total Redeemed", "Redeemed"],
    },
    FieldSpec {
        key: OVERFLOW,
        header: "BP_Overflow",
        synonyms: &["Overflow BP", "Overflow"],
    },
    FieldSpec {
        key: LAST_UPDATED,
        header: "LastUpdated",
        synonyms: &["Last Updated", "Updated", "Updated At"],
    },
];

/// Canonical layout of the append-only redemption log.
pub const REDEMPTION_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        key: TIMESTAMP,
        header: "Timestamp",
        synonyms: &["Date", "Time", "Redeemed At"],
    },
    NAME_FIELD,
    FieldSpec {
        key: AMOUNT,
        header: "BP_Amount",
        synonyms: &["Amount", "BP Redeemed", "Points", "Cost"],
    },
    FieldSpec {
        key: REASON,
        header: "Reason",
        synonyms: &["Item", "Reward", "Description"],
    },
    FieldSpec {
        key: CATEGORY,
        header: "Category",
        synonyms: &["Type", "Reward Category"],
    },
    FieldSpec {
        key: EVENT_ID,
        header: "Event ID",
        synonyms: &["Event", "EventId"],
    },
    FieldSpec {
        key: STAFF,
        header: "Staff",
        synonyms: &["Redeemed By", "Staff Member", "Processed By"],
    },
    FieldSpec {
        key: ROW_ID,
        header: "Row ID",
        synonyms: &["Transaction ID", "Txn ID", "RowId"],
    },
];

/// Point-column aliases for a source category.
pub fn category_field(category: Category) -> FieldSpec {
    match category {
        Category::Attendance => ATTENDANCE_FIELD,
        Category::Flag => FLAG_FIELD,
        Category::Dice => DICE_FIELD,
    }
}

/// Lowercase, fold `_`/`-` into spaces, collapse whitespace.
pub fn normalize_header(raw: &str) -> String {
    raw.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Column-index map for one table, keyed by canonical field key.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    pub table: String,
    pub headers: Vec<String>,
    index: HashMap<&'static str, usize>,
}

impl ResolvedSchema {
    pub fn get(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Index of a column the current operation cannot proceed without.
    pub fn require(&self, key: &str) -> LedgerResult<usize> {
        self.get(key).ok_or_else(|| LedgerError::SchemaInvalid {
            table: self.table.clone(),
            column: key.to_string(),
        })
    }

    /// The header text actually present in the table for `key`.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|i| self.headers.get(i))
            .map(String::as_str)
    }
}

/// Resolve `headers` against `fields`. Pure: touches no store.
pub fn resolve(table: &str, headers: &[String], fields: &[FieldSpec]) -> ResolvedSchema {
    let mut index = HashMap::new();
    for (i, raw) in headers.iter().enumerate() {
        let normalized = normalize_header(raw);
        if normalized.is_empty() {
            continue;
        }
        if let Some(field) = fields.iter().find(|f| f.matches(&normalized)) {
            index.entry(field.key).or_insert(i);
        }
    }
    ResolvedSchema {
        table: table.to_string(),
        headers: headers.to_vec(),
        index,
    }
}

/// Canonical headers that `resolved` is still missing, in field order.
pub fn missing_headers(resolved: &ResolvedSchema, fields: &[FieldSpec]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|f| !resolved.contains(f.key))
        .map(|f| f.header)
        .collect()
}

/// Make sure `table` exists and carries every canonical column.
/// Missing columns are appended after the existing ones.
pub fn ensure_schema(
    store: &LedgerStore,
    table: &str,
    fields: &[FieldSpec],
) -> LedgerResult<ResolvedSchema> {
    if !store.table_exists(table)? {
        let headers: Vec<String> = fields.iter().map(|f| f.header.to_string()).collect();
        store.create_table(table, &headers)?;
        log::info!("created table '{table}' with {} canonical columns", headers.len());
        return Ok(resolve(table, &headers, fields));
    }

    let headers = store.table_headers(table)?;
    let resolved = resolve(table, &headers, fields);
    let missing = missing_headers(&resolved, fields);
    if missing.is_empty() {
        return Ok(resolved);
    }

    for header in &missing {
        store.add_column(table, header)?;
    }
    log::info!("table '{table}': added missing columns {missing:?}");
    let headers = store.table_headers(table)?;
    Ok(resolve(table, &headers, fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn synonyms_resolve_to_canonical_keys() {
        let schema = resolve(
            "BP_Total",
            &headers(&["Name", "Notes", "Current BP", "attendance_points", "BP Historical"]),
            LEDGER_FIELDS,
        );
        assert_eq!(schema.get(NAME), Some(0));
        assert_eq!(schema.get(CURRENT), Some(2));
        assert_eq!(schema.get(ATTENDANCE), Some(3));
        assert_eq!(schema.get(HISTORICAL), Some(4));
        assert_eq!(schema.get(REDEEMED), None);
    }

    #[test]
    fn leftmost_duplicate_wins() {
        let schema = resolve("t", &headers(&["Player", "Player Name"]), &[NAME_FIELD]);
        assert_eq!(schema.get(NAME), Some(0));
    }

    #[test]
    fn require_reports_table_and_column() {
        let schema = resolve("Dice", &headers(&["Score"]), &[NAME_FIELD]);
        match schema.require(NAME) {
            Err(LedgerError::SchemaInvalid { table, column }) => {
                assert_eq!(table, "Dice");
                assert_eq!(column, NAME);
            }
            other => panic!("expected SchemaInvalid, got {other:?}"),
        }
    }

    #[test]
    fn missing_headers_lists_only_absent_fields() {
        let schema = resolve("BP_Total", &headers(&["Player Name", "Extra"]), LEDGER_FIELDS);
        let missing = missing_headers(&schema, LEDGER_FIELDS);
        assert!(!missing.contains(&"Player Name"));
        assert!(missing.contains(&"BP_Current"));
        assert_eq!(missing.len(), LEDGER_FIELDS.len() - 1);
    }

    #[test]
    fn normalization_folds_case_and_separators() {
        assert_eq!(normalize_header("  BP_Current "), "bp current");
        assert_eq!(normalize_header("Flag-Mission   Points"), "flag mission points");
    }
}
