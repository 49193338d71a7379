use super::LedgerStore;
use crate::error::LedgerResult;
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// The audit log entry as persisted to SQLite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRow {
    pub id: Option<i64>,
    pub logged_at: String,
    pub action_type: String,
    pub details: String,
    pub status: String,
}

impl LedgerStore {
    pub fn append_audit(&self, row: &AuditRow) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO audit_log (logged_at, action_type, details, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![row.logged_at, row.action_type, row.details, row.status],
        )?;
        Ok(())
    }

    /// Most recent entries first.
    pub fn recent_audit(&self, limit: usize) -> LedgerResult<Vec<AuditRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, logged_at, action_type, details, status
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(AuditRow {
                    id: Some(row.get(0)?),
                    logged_at: row.get(1)?,
                    action_type: row.get(2)?,
                    details: row.get(3)?,
                    status: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn audit_count(&self, action_type: &str) -> LedgerResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE action_type = ?1",
            params![action_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
