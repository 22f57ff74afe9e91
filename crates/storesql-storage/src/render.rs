//! Plain-text rendering of query results.

use std::fmt;

use rusqlite::types::ValueRef;
use serde::Serialize;

/// Render one SQLite value for display.
pub fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

/// Rows produced by one statement, already rendered to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rows dropped because of the row cap.
    pub truncated: usize,
}

impl QueryOutput {
    pub fn row_count(&self) -> usize {
        self.rows.len() + self.truncated
    }
}

impl fmt::Display for QueryOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.columns.join(" | "))?;
        if self.rows.is_empty() {
            return write!(f, "\n(no rows)");
        }
        for row in &self.rows {
            write!(f, "\n{}", row.join(" | "))?;
        }
        if self.truncated > 0 {
            write!(f, "\n... ({} more rows)", self.truncated)?;
        }
        Ok(())
    }
}
