//! The ledger. Owns the store, configuration, clock and audit sink, and
//! exposes every ledger operation.
//!
//! RULES:
//!   - Every mutating operation takes `&mut self`. At most one runs at a
//!     time, and none can re-enter another mid-flight.
//!   - A redemption appends to the log before it reconciles the player,
//!     so the reconciliation read always sees the new record.
//!   - Every outcome is audited: failures as FAILED, changes as SUCCESS.
//!     Audit sink errors are logged and swallowed.

use crate::{
    audit::{AuditAction, AuditEntry, AuditSink, AuditStatus, LogAuditSink, MemoryAuditSink, SqliteAuditSink},
    balance::PlayerBalance,
    clock::{Clock, FixedClock, SystemClock},
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    ledger_table::LedgerTable,
    reconcile::{ReconcileEngine, ReconcileOutcome, ReconcileSummary},
    redemption::{new_row_id, RedemptionLog, RedemptionRecord, RedemptionRequest},
    store::LedgerStore,
    types::Points,
};

pub struct Ledger {
    pub config: LedgerConfig,
    pub store: LedgerStore,
    clock: Box<dyn Clock>,
    audit: Box<dyn AuditSink>,
}

impl Ledger {
    pub fn new(
        config: LedgerConfig,
        store: LedgerStore,
        clock: Box<dyn Clock>,
        audit: Box<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            audit,
        }
    }

    /// Open a file-backed (or shared-memory URI) ledger with wall-clock
    /// time, auditing into the same database's `audit_log` table.
    pub fn open(path: &str, config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        let store = LedgerStore::open(path)?;
        store.migrate()?;
        let audit_store = store.reopen()?;
        audit_store.migrate()?;
        Ok(Self::new(
            config,
            store,
            Box::new(SystemClock),
            Box::new(SqliteAuditSink::new(audit_store)),
        ))
    }

    /// In-memory ledger with the default layout, a clock pinned to
    /// `FixedClock::epoch()` and an in-memory audit sink.
    pub fn build_test() -> LedgerResult<Self> {
        let store = LedgerStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(
            LedgerConfig::default(),
            store,
            Box::new(FixedClock::epoch()),
            Box::new(MemoryAuditSink::new()),
        ))
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Audit to the `log` facade only.
    pub fn without_persistent_audit(self) -> Self {
        self.with_audit(Box::new(LogAuditSink))
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub(crate) fn ledger_table(&self) -> LedgerTable<'_> {
        LedgerTable::new(&self.store, &self.config.ledger_table)
    }

    fn redemption_log(&self) -> RedemptionLog<'_> {
        RedemptionLog::new(&self.store, &self.config.redemption_table)
    }

    fn engine(&self) -> ReconcileEngine<'_> {
        ReconcileEngine::new(&self.store, &self.config)
    }

    pub(crate) fn emit(&mut self, action: AuditAction, status: AuditStatus, details: String) {
        let entry = AuditEntry {
            at: self.clock.now(),
            action,
            details,
            status,
        };
        if let Err(e) = self.audit.emit(&entry) {
            log::warn!("audit sink failed for {}: {e}", action.as_str());
        }
    }

    /// Audit a failure and hand the error back.
    pub(crate) fn fail<T>(&mut self, action: AuditAction, context: &str, err: LedgerError) -> LedgerResult<T> {
        self.emit(action, AuditStatus::Failed, format!("{context}: {err}"));
        Err(err)
    }

    // ── Schema ────────────────────────────────────────────────────

    /// Create or repair the ledger and redemption log tables.
    pub fn ensure_schema(&mut self) -> LedgerResult<()> {
        let result = self
            .ledger_table()
            .ensure_schema()
            .and_then(|_| self.redemption_log().ensure_schema());
        match result {
            Ok(()) => {
                let details = format!(
                    "tables '{}' and '{}' carry every canonical column",
                    self.config.ledger_table, self.config.redemption_table
                );
                self.emit(AuditAction::EnsureSchema, AuditStatus::Success, details);
                Ok(())
            }
            Err(e) => self.fail(AuditAction::EnsureSchema, "ensure schema", e),
        }
    }

    // ── Reconciliation ────────────────────────────────────────────

    /// Recompute every player and write all changes in one batch.
    pub fn reconcile_all(&mut self) -> LedgerResult<ReconcileSummary> {
        let stamp = self.now();
        let result = self.engine().reconcile_all(&stamp);
        match result {
            Ok(summary) => {
                if summary.touched() > 0 {
                    self.emit(
                        AuditAction::ReconcileAll,
                        AuditStatus::Success,
                        format!(
                            "{} rows touched ({} updated, {} new)",
                            summary.touched(),
                            summary.updated,
                            summary.inserted
                        ),
                    );
                }
                Ok(summary)
            }
            Err(e) => self.fail(AuditAction::ReconcileAll, "full reconciliation", e),
        }
    }

    /// Recompute one player. Same derivation as `reconcile_all`.
    pub fn reconcile_one(&mut self, name: &str) -> LedgerResult<ReconcileOutcome> {
        let stamp = self.now();
        let result = self.engine().reconcile_one(name, &stamp);
        match result {
            Ok(outcome) => {
                if outcome == ReconcileOutcome::Updated {
                    self.emit(
                        AuditAction::ReconcileOne,
                        AuditStatus::Success,
                        format!("1 row touched ({})", name.trim()),
                    );
                }
                Ok(outcome)
            }
            Err(e) => self.fail(AuditAction::ReconcileOne, &format!("reconcile '{}'", name.trim()), e),
        }
    }

    /// Incremental trigger for an edit to `table` affecting `name`.
    /// Edits to tables that feed no category are ignored (None).
    pub fn handle_source_edit(&mut self, table: &str, name: &str) -> LedgerResult<Option<ReconcileOutcome>> {
        if !self.config.is_source_table(table) {
            log::debug!("edit to '{table}' ignored: not a source table");
            return Ok(None);
        }
        self.reconcile_one(name).map(Some)
    }

    /// Balance derived fresh from sources and redemptions, keeping any
    /// stored manual adjustment. Writes nothing.
    pub fn derive_balance(&self, name: &str) -> LedgerResult<PlayerBalance> {
        self.engine().derive_one(name)
    }

    // ── Redemptions ───────────────────────────────────────────────

    /// Spend points. Validates, appends one record, then reconciles the
    /// player so the ledger reflects the spend.
    pub fn record_redemption(&mut self, request: RedemptionRequest) -> LedgerResult<RedemptionRecord> {
        let context = format!("redeem {} for '{}'", request.amount, request.name.trim());
        let result = self.append_redemption(&request);
        match result {
            Ok(record) => {
                self.emit(
                    AuditAction::Redemption,
                    AuditStatus::Success,
                    format!("{context}: {} ({})", record.reason, record.row_id),
                );
                // The record is durable from here on. A failed refresh is
                // audited by reconcile_one and repaired by the next pass.
                if let Err(e) = self.reconcile_one(&record.player_name) {
                    log::warn!("ledger refresh after {} failed: {e}", record.row_id);
                }
                Ok(record)
            }
            Err(e) => self.fail(AuditAction::Redemption, &context, e),
        }
    }

    fn append_redemption(&self, request: &RedemptionRequest) -> LedgerResult<RedemptionRecord> {
        if request.amount <= 0 {
            return Err(LedgerError::InvalidAmount {
                amount: request.amount,
            });
        }
        let name = request.name.trim();
        if name.is_empty() {
            return Err(LedgerError::PlayerNotFound { name: String::new() });
        }
        let available = self.engine().derive_one(name)?.current;
        if request.amount > available {
            return Err(LedgerError::InsufficientBalance {
                name: name.to_string(),
                requested: request.amount,
                available,
            });
        }
        let record = RedemptionRecord::from_request(request, self.now(), new_row_id());
        self.redemption_log().append(&record)?;
        Ok(record)
    }

    pub fn total_redeemed(&self, name: &str) -> LedgerResult<Points> {
        self.redemption_log().total_redeemed(name)
    }

    /// A player's redemptions, most recent first.
    pub fn redemption_history(&self, name: &str) -> LedgerResult<Vec<RedemptionRecord>> {
        self.redemption_log().history(name)
    }

    pub fn recent_redemptions(&self, limit: usize) -> LedgerResult<Vec<RedemptionRecord>> {
        self.redemption_log().recent(limit)
    }
}
