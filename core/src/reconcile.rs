//! Reconciliation engine: derives every player's balance and writes the
//! ledger, in full-refresh or single-player mode.
//!
//! ORDER (both modes, never interleaved):
//!   1. Read: roster, source tables, redemption log, ledger table.
//!   2. Derive: `derive_balance` per player (pure).
//!   3. Diff: keep only rows whose derived columns changed.
//!   4. Write: one batched transaction.
//!
//! A failure in steps 1–3 leaves the ledger untouched. Both modes derive
//! through `plan`, so `reconcile_one(p)` and `reconcile_all()` agree on
//! every player they both touch, except that a manual adjustment on a
//! stored row survives `reconcile_one` and is cleared by `reconcile_all`.

use crate::{
    aggregate::{self, PlayerTotals, SourceTotals},
    balance::{derive_balance, PlayerBalance},
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    ledger_table::{LedgerSnapshot, LedgerTable},
    redemption::RedemptionLog,
    schema::{self, NAME, NAME_FIELD},
    sheet::SheetWrite,
    store::LedgerStore,
    types::{normalize_name, PlayerName},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub updated: usize,
    pub inserted: usize,
    pub unchanged: usize,
}

impl ReconcileSummary {
    /// Rows written by this pass.
    pub fn touched(&self) -> usize {
        self.updated + self.inserted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Updated,
    Unchanged,
}

/// The roster actually used and the table it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    pub table: String,
    pub names: Vec<PlayerName>,
}

/// Everything a reconciliation reads, captured before anything is written.
#[derive(Debug, Clone)]
pub struct ReconcileInputs {
    pub totals: SourceTotals,
    pub redeemed: PlayerTotals,
    pub ledger: LedgerSnapshot,
}

impl ReconcileInputs {
    pub fn derive(&self, name: &str, config: &LedgerConfig) -> PlayerBalance {
        derive_balance(
            name,
            self.totals.points_for(name),
            self.redeemed.get(name).copied().unwrap_or(0),
            config.cap,
            config.cap_policy,
        )
    }
}

/// Derived balances and the writes needed to store them.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub balances: Vec<PlayerBalance>,
    pub writes: Vec<SheetWrite>,
    pub summary: ReconcileSummary,
}

/// Whether stored manual adjustments are carried into derived rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustments {
    Keep,
    Clear,
}

/// Derive `players` and diff them against the stored ledger. Pure.
pub fn plan(
    players: &[PlayerName],
    inputs: &ReconcileInputs,
    config: &LedgerConfig,
    stamp: &DateTime<Utc>,
    adjustments: Adjustments,
) -> LedgerResult<ReconcilePlan> {
    let mut plan = ReconcilePlan::default();
    for name in players {
        let mut balance = inputs.derive(name, config);
        if adjustments == Adjustments::Keep {
            if let Some(stored) = inputs.ledger.find(name) {
                balance = balance.with_adjustment(stored.adjustment(), config.cap, config.cap_policy);
            }
        }
        match inputs.ledger.write_for(&balance, stamp)? {
            None => plan.summary.unchanged += 1,
            Some(write) => {
                match write {
                    SheetWrite::Update { .. } => plan.summary.updated += 1,
                    SheetWrite::Insert { .. } => plan.summary.inserted += 1,
                }
                plan.writes.push(write);
            }
        }
        plan.balances.push(balance);
    }
    Ok(plan)
}

/// Full-refresh player order: roster, then source-only players (sorted),
/// then players that only have a ledger row. Ledger rows are never dropped.
pub fn player_order(roster: &[PlayerName], inputs: &ReconcileInputs) -> Vec<PlayerName> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut order = Vec::new();
    let candidates = roster
        .iter()
        .map(String::as_str)
        .chain(inputs.totals.players())
        .chain(inputs.ledger.names());
    for name in candidates {
        if seen.insert(name) {
            order.push(name.to_string());
        }
    }
    order
}

pub struct ReconcileEngine<'a> {
    store: &'a LedgerStore,
    config: &'a LedgerConfig,
}

impl<'a> ReconcileEngine<'a> {
    pub fn new(store: &'a LedgerStore, config: &'a LedgerConfig) -> Self {
        Self { store, config }
    }

    fn ledger(&self) -> LedgerTable<'a> {
        LedgerTable::new(self.store, &self.config.ledger_table)
    }

    /// The primary roster, else the secondary one.
    pub fn load_roster(&self) -> LedgerResult<Roster> {
        let tried = self.config.roster_tables();
        for table in &tried {
            if !self.store.table_exists(table)? {
                continue;
            }
            let sheet = self.store.read_table(table)?;
            let resolved = schema::resolve(table, &sheet.headers, &[NAME_FIELD]);
            let name_col = resolved.require(NAME)?;
            let mut seen = HashSet::new();
            let names = sheet
                .rows
                .iter()
                .filter_map(|row| normalize_name(&row.cell(name_col).as_text()))
                .filter(|name| seen.insert(name.clone()))
                .collect();
            if table != &self.config.roster.primary {
                log::warn!("primary roster '{}' missing, using '{table}'", self.config.roster.primary);
            }
            return Ok(Roster {
                table: table.clone(),
                names,
            });
        }
        Err(LedgerError::RosterMissing { tried })
    }

    /// Read sources, redemptions and (after ensuring its schema) the ledger.
    pub fn read_inputs(&self) -> LedgerResult<ReconcileInputs> {
        let totals = aggregate::collect_totals(self.store, self.config)?;
        let redeemed = RedemptionLog::new(self.store, &self.config.redemption_table).totals()?;
        let ledger = self.ledger().read()?;
        Ok(ReconcileInputs {
            totals,
            redeemed,
            ledger,
        })
    }

    /// Fresh balance for one player from sources and redemptions, plus any
    /// manual adjustment on the stored row. Never writes or creates the
    /// ledger table.
    pub fn derive_one(&self, name: &str) -> LedgerResult<PlayerBalance> {
        let name = name.trim();
        let totals = aggregate::collect_totals(self.store, self.config)?;
        let redeemed = RedemptionLog::new(self.store, &self.config.redemption_table).total_redeemed(name)?;
        let adjustment = self
            .ledger()
            .read_existing()?
            .and_then(|ledger| ledger.find(name).map(|row| row.adjustment()))
            .unwrap_or(0);
        Ok(derive_balance(
            name,
            totals.points_for(name),
            redeemed,
            self.config.cap,
            self.config.cap_policy,
        )
        .with_adjustment(adjustment, self.config.cap, self.config.cap_policy))
    }

    /// Full refresh. Clears every manual adjustment.
    pub fn reconcile_all(&self, stamp: &DateTime<Utc>) -> LedgerResult<ReconcileSummary> {
        let roster = self.load_roster()?;
        let inputs = self.read_inputs()?;
        let players = player_order(&roster.names, &inputs);
        let plan = plan(&players, &inputs, self.config, stamp, Adjustments::Clear)?;

        self.ledger().apply(&plan.writes)?;
        log::info!(
            "reconciled {} players from roster '{}': {} updated, {} new, {} unchanged",
            players.len(),
            roster.table,
            plan.summary.updated,
            plan.summary.inserted,
            plan.summary.unchanged
        );
        Ok(plan.summary)
    }

    /// Reconcile a single player, keeping a manual adjustment on their row.
    /// Players known to no roster, source or ledger row are left alone.
    pub fn reconcile_one(&self, name: &str, stamp: &DateTime<Utc>) -> LedgerResult<ReconcileOutcome> {
        let Some(name) = normalize_name(name) else {
            return Ok(ReconcileOutcome::Unchanged);
        };
        let in_roster = match self.load_roster() {
            Ok(roster) => roster.names.contains(&name),
            Err(LedgerError::RosterMissing { .. }) => false,
            Err(e) => return Err(e),
        };
        let inputs = self.read_inputs()?;
        let known = in_roster || inputs.totals.contains(&name) || inputs.ledger.find(&name).is_some();
        if !known {
            log::debug!("reconcile_one: '{name}' is not a known player");
            return Ok(ReconcileOutcome::Unchanged);
        }

        let plan = plan(
            std::slice::from_ref(&name),
            &inputs,
            self.config,
            stamp,
            Adjustments::Keep,
        )?;
        if plan.writes.is_empty() {
            return Ok(ReconcileOutcome::Unchanged);
        }
        self.ledger().apply(&plan.writes)?;
        log::debug!("reconcile_one: '{name}' rewritten");
        Ok(ReconcileOutcome::Updated)
    }
}
