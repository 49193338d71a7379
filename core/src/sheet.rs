//! In-memory view of a tabular store table ("sheet").
//!
//! Tables are free-form: headers come from whoever maintains the table,
//! and cells are dynamically typed. Everything the ledger computes is
//! derived from `Sheet` values so it can be tested without a store.

use crate::types::Points;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cell {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Numeric view of the cell. Numeric text parses; booleans and
    /// anything else are not numbers.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(t) => t.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Coerce to non-negative whole points. Non-numeric → 0.
    pub fn as_points(&self) -> Points {
        self.as_number()
            .map(|n| n.round().max(0.0) as Points)
            .unwrap_or(0)
    }

    /// Coerce to signed whole points. Used for stored ledger columns,
    /// where a manual adjustment may have left any value.
    pub fn as_signed_points(&self) -> Option<Points> {
        self.as_number().map(|n| n.round() as Points)
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Text(t) => t.clone(),
            Self::Bool(true) => "TRUE".into(),
            Self::Bool(false) => "FALSE".into(),
        }
    }
}

impl From<Points> for Cell {
    fn from(value: Points) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Self::Empty => Value::Null,
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Value::Integer(*n as i64),
            Self::Number(n) => Value::Real(*n),
            Self::Text(t) => Value::Text(t.clone()),
            // Checkboxes are persisted as spreadsheet-style literals.
            Self::Bool(b) => Value::Text(if *b { "TRUE" } else { "FALSE" }.into()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

impl FromSql for Cell {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null | ValueRef::Blob(_) => Self::Empty,
            ValueRef::Integer(i) => Self::Number(i as f64),
            ValueRef::Real(f) => Self::Number(f),
            ValueRef::Text(bytes) => {
                let text = String::from_utf8_lossy(bytes).into_owned();
                match text.trim().to_ascii_uppercase().as_str() {
                    "TRUE" => Self::Bool(true),
                    "FALSE" => Self::Bool(false),
                    _ => Self::Text(text),
                }
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// Store-assigned key; stable across reads of the same table.
    pub row_id: i64,
    pub cells: Vec<Cell>,
}

impl SheetRow {
    /// Cell at `index`, or Empty when the row is short.
    pub fn cell(&self, index: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.cells.get(index).unwrap_or(&EMPTY)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows: Vec::new(),
        }
    }

    /// Builder used by tests and fixtures: row ids are assigned in order.
    pub fn with_row(mut self, cells: Vec<Cell>) -> Self {
        let row_id = self.rows.len() as i64 + 1;
        self.rows.push(SheetRow { row_id, cells });
        self
    }
}

/// One pending change to a table, applied by the store in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetWrite {
    Update {
        row_id: i64,
        cells: Vec<(String, Cell)>,
    },
    Insert {
        cells: Vec<(String, Cell)>,
    },
}
