//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine, the redemption log and the facade call store methods;
//! they never execute SQL directly.
//!
//! Two kinds of tables live here:
//!   - internal tables created by migrations (the audit log), and
//!   - free-form "sheets" (roster, sources, ledger, redemption log)
//!     whose headers belong to whoever maintains them. See `tables.rs`.

mod audit;
mod tables;

pub use audit::AuditRow;

use crate::error::LedgerResult;
use rusqlite::Connection;

pub struct LedgerStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file or URI
}

impl LedgerStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        // `:memory:` becomes a uniquely named shared-cache URI so `reopen`
        // reaches the same database.
        let path = if path == ":memory:" {
            format!("file:bp_ledger_{}?mode=memory&cache=shared", uuid::Uuid::new_v4().simple())
        } else {
            path.to_string()
        };
        let conn = Connection::open_with_flags(
            &path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, path: None })
    }

    /// Open a second connection to the same database.
    /// For a private in-memory database this returns a new, isolated one;
    /// use a shared-cache URI (`file:x?mode=memory&cache=shared`) to share.
    pub fn reopen(&self) -> LedgerResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_audit_log.sql"))?;
        Ok(())
    }
}

/// Quote an identifier for SQLite. Table and column names come from
/// hand-maintained headers, so they are never spliced in raw.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
