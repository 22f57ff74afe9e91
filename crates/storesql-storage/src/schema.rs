//! Schema introspection.
//!
//! Builds the textual schema description handed to the query generator:
//! the table DDL followed by a few sample rows, per table.

use std::fmt;

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use storesql_core::error::StoreSqlError;

use crate::loader::quote_ident;
use crate::render::render_value;

/// One column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
}

/// Description of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub ddl: String,
    pub columns: Vec<ColumnInfo>,
    pub sample_rows: Vec<Vec<String>>,
}

/// Read-only description of the queryable tables, computed once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    /// Introspect `tables` on `conn`, skipping names that do not exist.
    pub fn capture(
        conn: &Connection,
        tables: &[String],
        sample_rows: usize,
    ) -> Result<Self, StoreSqlError> {
        let mut out = Vec::new();
        for name in tables {
            if let Some(table) = describe_table(conn, name, sample_rows)? {
                out.push(table);
            }
        }
        Ok(Self { tables: out })
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl fmt::Display for SchemaSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, table) in self.tables.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", table.ddl.trim())?;
            if table.sample_rows.is_empty() {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "/*")?;
            writeln!(
                f,
                "{} rows from {} table:",
                table.sample_rows.len(),
                table.name
            )?;
            let header: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
            writeln!(f, "{}", header.join("\t"))?;
            for row in &table.sample_rows {
                writeln!(f, "{}", row.join("\t"))?;
            }
            writeln!(f, "*/")?;
        }
        Ok(())
    }
}

fn describe_table(
    conn: &Connection,
    name: &str,
    sample_rows: usize,
) -> Result<Option<TableSchema>, StoreSqlError> {
    let found: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT name, sql FROM sqlite_master
             WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE",
            [name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| StoreSqlError::Storage(format!("Schema query: {}", e)))?;

    let Some((table_name, ddl)) = found else {
        return Ok(None);
    };
    let ddl = ddl.unwrap_or_default();
    let quoted = quote_ident(&table_name);

    let mut columns = Vec::new();
    {
        let mut stmt = conn
            .prepare(&format!("PRAGMA main.table_info({})", quoted))
            .map_err(|e| StoreSqlError::Storage(format!("table_info prepare: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    decl_type: row.get(2)?,
                })
            })
            .map_err(|e| StoreSqlError::Storage(format!("table_info: {}", e)))?;
        for row in rows {
            columns.push(row.map_err(|e| StoreSqlError::Storage(e.to_string()))?);
        }
    }

    let mut samples = Vec::new();
    if sample_rows > 0 {
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {} LIMIT {}", quoted, sample_rows))
            .map_err(|e| StoreSqlError::Storage(format!("Sample query prepare: {}", e)))?;
        let width = stmt.column_count();
        let mut rows = stmt
            .query([])
            .map_err(|e| StoreSqlError::Storage(format!("Sample query: {}", e)))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| StoreSqlError::Storage(e.to_string()))?
        {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                let value = row
                    .get_ref(i)
                    .map_err(|e| StoreSqlError::Storage(e.to_string()))?;
                cells.push(render_value(value));
            }
            samples.push(cells);
        }
    }

    Ok(Some(TableSchema {
        name: table_name,
        ddl,
        columns,
        sample_rows: samples,
    }))
}
