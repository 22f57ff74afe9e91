//! Tabular data loader.
//!
//! Materializes a CSV file (a spreadsheet export) as a table. The table is
//! replaced on every load; column types are inferred from the cell values.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use rusqlite::params_from_iter;
use rusqlite::types::Value;
use tracing::info;

use storesql_core::error::StoreSqlError;

use crate::db::Database;

/// Column affinity inferred from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Narrowest type that can still hold `cell`.
    fn widen(self, cell: &str) -> Self {
        match self {
            ColumnType::Integer if cell.parse::<i64>().is_ok() => ColumnType::Integer,
            ColumnType::Integer | ColumnType::Real if cell.parse::<f64>().is_ok() => {
                ColumnType::Real
            }
            _ => ColumnType::Text,
        }
    }
}

/// Outcome of a load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub table: String,
    pub columns: Vec<(String, ColumnType)>,
    pub rows: usize,
}

/// Load a CSV file into `table`, replacing any existing table of that name.
pub fn load_csv(db: &Database, path: &Path, table: &str) -> Result<LoadReport, StoreSqlError> {
    let file = std::fs::File::open(path)?;
    let report = load_csv_reader(db, file, table)?;
    info!(
        path = %path.display(),
        table = %report.table,
        rows = report.rows,
        "Loaded tabular data"
    );
    Ok(report)
}

/// Load CSV data from any reader into `table`.
pub fn load_csv_reader<R: Read>(
    db: &Database,
    reader: R,
    table: &str,
) -> Result<LoadReport, StoreSqlError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| StoreSqlError::Load(format!("Failed to read header: {}", e)))?
        .clone();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(StoreSqlError::Load("CSV has no header row".into()));
    }
    let names = column_names(headers.iter());

    let mut records = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| StoreSqlError::Load(format!("Bad record: {}", e)))?;
        records.push(record);
    }

    let mut types = vec![ColumnType::Integer; names.len()];
    for record in &records {
        for (i, cell) in record.iter().enumerate().take(names.len()) {
            if !cell.is_empty() {
                types[i] = types[i].widen(cell);
            }
        }
    }
    // A column with no values at all carries no type information.
    for (i, ty) in types.iter_mut().enumerate() {
        if records.iter().all(|r| r.get(i).map_or(true, str::is_empty)) {
            *ty = ColumnType::Text;
        }
    }

    let columns: Vec<(String, ColumnType)> = names.into_iter().zip(types).collect();
    let column_defs = columns
        .iter()
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let quoted_table = quote_ident(table);

    db.with_conn(|conn| {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreSqlError::Storage(format!("Failed to begin load: {}", e)))?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {t}; CREATE TABLE {t} ({defs});",
            t = quoted_table,
            defs = column_defs
        ))
        .map_err(|e| StoreSqlError::Storage(format!("Failed to create table: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {} VALUES ({})",
                    quoted_table, placeholders
                ))
                .map_err(|e| StoreSqlError::Storage(format!("Insert prepare: {}", e)))?;
            for record in &records {
                let values = columns
                    .iter()
                    .enumerate()
                    .map(|(i, (_, ty))| cell_value(record.get(i).unwrap_or(""), *ty));
                stmt.execute(params_from_iter(values))
                    .map_err(|e| StoreSqlError::Storage(format!("Insert failed: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| StoreSqlError::Storage(format!("Failed to commit load: {}", e)))
    })?;

    Ok(LoadReport {
        table: table.to_string(),
        columns,
        rows: records.len(),
    })
}

/// Quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_names<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for (i, header) in headers.enumerate() {
        let base = if header.is_empty() {
            format!("column_{}", i + 1)
        } else {
            header.to_string()
        };
        let mut name = base.clone();
        let mut n = 2;
        while !seen.insert(name.to_lowercase()) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        names.push(name);
    }
    names
}

fn cell_value(cell: &str, ty: ColumnType) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match ty {
        ColumnType::Integer => cell
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(cell.to_string())),
        ColumnType::Real => cell
            .parse::<f64>()
            .map(Value::Real)
            .unwrap_or_else(|_| Value::Text(cell.to_string())),
        ColumnType::Text => Value::Text(cell.to_string()),
    }
}
