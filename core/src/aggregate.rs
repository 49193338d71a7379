//! Source aggregator: per-category point totals from external tables.
//!
//! Each category may be fed by several tables (e.g. a current dice table
//! and a legacy one). Per-player totals from every table of a category
//! are summed, never overwritten.
//!
//! Per table:
//!   - name column   → `NAME_FIELD` aliases; required.
//!   - points column → the category's aliases; when absent and the table
//!     allows it, every numeric or checked cell on the row is summed
//!     instead (a checked box is worth its configured value, default 1).

use crate::{
    balance::CategoryPoints,
    config::{LedgerConfig, SourceTableConfig},
    error::{LedgerError, LedgerResult},
    schema::{self, normalize_header, NAME, NAME_FIELD},
    sheet::{Cell, Sheet},
    store::LedgerStore,
    types::{normalize_name, Category, PlayerName, Points},
};
use std::collections::{BTreeSet, HashMap};

pub type PlayerTotals = HashMap<PlayerName, Points>;

/// A source table read from the store, paired with its configuration.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub config: SourceTableConfig,
    pub sheet: Sheet,
}

/// Totals for one table.
pub fn aggregate_table(source: &SourceTableConfig, sheet: &Sheet) -> LedgerResult<PlayerTotals> {
    let field = schema::category_field(source.category);
    let resolved = schema::resolve(&sheet.name, &sheet.headers, &[NAME_FIELD, field]);
    let name_col = resolved.require(NAME)?;

    let points_col = resolved.get(field.key);
    if points_col.is_none() && !source.fallback_sum {
        return Err(LedgerError::SchemaInvalid {
            table: sheet.name.clone(),
            column: field.key.to_string(),
        });
    }

    let ignored: Vec<String> = source
        .ignore_columns
        .iter()
        .map(|h| normalize_header(h))
        .collect();
    // Columns the fallback may sum: everything but the name and ignored ones.
    let summable: Vec<(usize, Points)> = sheet
        .headers
        .iter()
        .enumerate()
        .filter(|(i, h)| *i != name_col && !ignored.contains(&normalize_header(h)))
        .map(|(i, h)| (i, source.checkbox_value(h)))
        .collect();

    let mut totals = PlayerTotals::new();
    for row in &sheet.rows {
        let Some(name) = normalize_name(&row.cell(name_col).as_text()) else {
            continue;
        };
        let row_points = match points_col {
            Some(col) => row.cell(col).as_points(),
            None => summable
                .iter()
                .map(|(col, checkbox_value)| match row.cell(*col) {
                    Cell::Bool(true) => (*checkbox_value).max(0),
                    other => other.as_points(),
                })
                .fold(0, Points::saturating_add),
        };
        let entry = totals.entry(name).or_insert(0);
        *entry = entry.saturating_add(row_points);
    }

    log::debug!(
        "aggregated {} players from '{}' ({}){}",
        totals.len(),
        sheet.name,
        source.category,
        if points_col.is_none() { " via fallback sum" } else { "" }
    );
    Ok(totals)
}

/// Totals for one category across every table that feeds it.
/// Tables configured for other categories are ignored.
pub fn aggregate(category: Category, sources: &[LoadedSource]) -> LedgerResult<PlayerTotals> {
    let mut combined = PlayerTotals::new();
    for source in sources.iter().filter(|s| s.config.category == category) {
        for (name, points) in aggregate_table(&source.config, &source.sheet)? {
            let entry = combined.entry(name).or_insert(0);
            *entry = entry.saturating_add(points);
        }
    }
    Ok(combined)
}

/// Aggregated totals for every category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTotals {
    by_category: HashMap<Category, PlayerTotals>,
}

impl SourceTotals {
    pub fn from_sources(sources: &[LoadedSource]) -> LedgerResult<Self> {
        let mut by_category = HashMap::new();
        for category in Category::ALL {
            by_category.insert(category, aggregate(category, sources)?);
        }
        Ok(Self { by_category })
    }

    pub fn category(&self, category: Category) -> Option<&PlayerTotals> {
        self.by_category.get(&category)
    }

    pub fn points_for(&self, name: &str) -> CategoryPoints {
        let mut points = CategoryPoints::default();
        for category in Category::ALL {
            let total = self
                .category(category)
                .and_then(|totals| totals.get(name))
                .copied()
                .unwrap_or(0);
            points.set(category, total);
        }
        points
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_category.values().any(|t| t.contains_key(name))
    }

    /// Every player that appears in any source, sorted.
    pub fn players(&self) -> BTreeSet<&str> {
        self.by_category
            .values()
            .flat_map(|t| t.keys().map(String::as_str))
            .collect()
    }
}

/// Read every configured source table that exists. Missing candidates
/// are skipped; a present table without a name column is an error.
pub fn load_sources(store: &LedgerStore, config: &LedgerConfig) -> LedgerResult<Vec<LoadedSource>> {
    let mut loaded = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        if !store.table_exists(&source.table)? {
            log::debug!("source table '{}' ({}) not present, skipping", source.table, source.category);
            continue;
        }
        loaded.push(LoadedSource {
            config: source.clone(),
            sheet: store.read_table(&source.table)?,
        });
    }
    if loaded.is_empty() {
        log::warn!("none of the {} configured source tables exist", config.sources.len());
    }
    Ok(loaded)
}

pub fn collect_totals(store: &LedgerStore, config: &LedgerConfig) -> LedgerResult<SourceTotals> {
    SourceTotals::from_sources(&load_sources(store, config)?)
}
