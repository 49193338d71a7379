use super::{quote_ident, LedgerStore};
use crate::{
    error::LedgerResult,
    sheet::{Cell, Sheet, SheetRow, SheetWrite},
};
use rusqlite::{params, types::ToSql};

impl LedgerStore {
    // ── Table shape ───────────────────────────────────────────────

    pub fn table_exists(&self, table: &str) -> LedgerResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Column headers in table order. Empty when the table does not exist.
    pub fn table_headers(&self, table: &str) -> LedgerResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let headers = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(headers)
    }

    /// Create a free-form table. Columns are untyped so every cell keeps
    /// whatever type it was written with.
    pub fn create_table(&self, table: &str, headers: &[String]) -> LedgerResult<()> {
        if headers.is_empty() {
            return Err(anyhow::anyhow!("cannot create table '{table}' without columns").into());
        }
        let columns = headers
            .iter()
            .map(|h| quote_ident(h))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn.execute_batch(&format!(
            "CREATE TABLE {} ({columns});",
            quote_ident(table)
        ))?;
        Ok(())
    }

    /// Append a column after the existing ones. Existing rows read it as empty.
    pub fn add_column(&self, table: &str, header: &str) -> LedgerResult<()> {
        self.conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {};",
            quote_ident(table),
            quote_ident(header)
        ))?;
        Ok(())
    }

    // ── Rows ──────────────────────────────────────────────────────

    pub fn read_table(&self, table: &str) -> LedgerResult<Sheet> {
        let headers = self.table_headers(table)?;
        let width = headers.len();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT rowid, * FROM {} ORDER BY rowid ASC",
            quote_ident(table)
        ))?;
        let rows = stmt
            .query_map([], |row| {
                let row_id: i64 = row.get(0)?;
                let cells = (0..width)
                    .map(|i| row.get::<_, Cell>(i + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SheetRow { row_id, cells })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Sheet {
            name: table.to_string(),
            headers,
            rows,
        })
    }

    /// Append one row; unspecified columns stay empty. Returns the row id.
    pub fn append_row(&self, table: &str, cells: &[(String, Cell)]) -> LedgerResult<i64> {
        self.conn.execute(&insert_sql(table, cells), cell_params(cells).as_slice())?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Apply a batch of writes to one table inside a single transaction.
    /// Either every write lands or none does.
    pub fn apply_writes(&self, table: &str, writes: &[SheetWrite]) -> LedgerResult<usize> {
        if writes.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        for write in writes {
            match write {
                SheetWrite::Update { row_id, cells } => {
                    if cells.is_empty() {
                        continue;
                    }
                    let assignments = cells
                        .iter()
                        .enumerate()
                        .map(|(i, (column, _))| format!("{} = ?{}", quote_ident(column), i + 1))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let sql = format!(
                        "UPDATE {} SET {assignments} WHERE rowid = ?{}",
                        quote_ident(table),
                        cells.len() + 1
                    );
                    let mut values = cell_params(cells);
                    values.push(row_id);
                    tx.execute(&sql, values.as_slice())?;
                }
                SheetWrite::Insert { cells } => {
                    tx.execute(&insert_sql(table, cells), cell_params(cells).as_slice())?;
                }
            }
        }
        tx.commit()?;
        Ok(writes.len())
    }

    pub fn row_count(&self, table: &str) -> LedgerResult<i64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn insert_sql(table: &str, cells: &[(String, Cell)]) -> String {
    if cells.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
    }
    let columns = cells
        .iter()
        .map(|(column, _)| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=cells.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders})",
        quote_ident(table)
    )
}

fn cell_params(cells: &[(String, Cell)]) -> Vec<&dyn ToSql> {
    cells.iter().map(|(_, cell)| cell as &dyn ToSql).collect()
}
