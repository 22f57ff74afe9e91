//! Database accessor: schema description plus guarded statement execution.

use std::sync::Arc;

use rusqlite::hooks::AuthContext;
use rusqlite::{Connection, ErrorCode};
use tracing::{debug, info, warn};

use storesql_core::error::StoreSqlError;

use crate::db::Database;
use crate::guard::QueryGuard;
use crate::loader::quote_ident;
use crate::render::{render_value, QueryOutput};
use crate::schema::SchemaSnapshot;

/// Read access to the relational store used by the conversation workflow.
pub trait DatabaseAccessor: Send + Sync {
    /// SQL dialect the store accepts.
    fn dialect(&self) -> &str;

    /// Schema snapshot taken when the accessor was built.
    fn schema(&self) -> &SchemaSnapshot;

    /// Execute one statement and render its rows.
    fn run(&self, sql: &str) -> Result<QueryOutput, StoreSqlError>;
}

/// SQLite implementation of [`DatabaseAccessor`].
///
/// Copies the store's rows of every allow-listed table into the `temp`
/// schema and installs an authorizer on the shared connection that only
/// lets statements read those copies. Anything that needs to write (the
/// loader) must run before the accessor is built, and a database carries at
/// most one accessor.
pub struct SqliteAccessor {
    db: Arc<Database>,
    guard: QueryGuard,
    schema: SchemaSnapshot,
}

impl SqliteAccessor {
    pub fn new(
        db: Arc<Database>,
        guard: QueryGuard,
        sample_rows: usize,
    ) -> Result<Self, StoreSqlError> {
        let mut tables: Vec<String> = guard.allowed_tables().iter().cloned().collect();
        tables.sort();

        let schema = db.with_conn(|conn| {
            install_scope(conn, &guard, &tables)?;
            SchemaSnapshot::capture(conn, &tables, sample_rows)
        })?;
        if schema.is_empty() {
            warn!(?tables, "None of the allowed tables exist");
        }

        let allowed = guard.allowed_tables().clone();
        db.with_conn(|conn| {
            conn.authorizer(Some(move |ctx: AuthContext<'_>| {
                QueryGuard::authorize(&allowed, &ctx)
            }));
            Ok(())
        })?;

        info!(tables = schema.tables.len(), "Database accessor ready");
        Ok(Self { db, guard, schema })
    }
}

impl DatabaseAccessor for SqliteAccessor {
    fn dialect(&self) -> &str {
        "sqlite"
    }

    fn schema(&self) -> &SchemaSnapshot {
        &self.schema
    }

    fn run(&self, sql: &str) -> Result<QueryOutput, StoreSqlError> {
        let text = self.guard.check_text(sql).inspect_err(|e| {
            warn!(error = %e, "Statement rejected before prepare");
        })?;
        let max_rows = self.guard.max_rows();

        let output = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&text).map_err(prepare_error)?;
            if !stmt.readonly() {
                return Err(StoreSqlError::Rejected(
                    "only read-only statements may run".into(),
                ));
            }

            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let width = columns.len();

            let mut rows = stmt
                .query([])
                .map_err(|e| StoreSqlError::Query(e.to_string()))?;
            let mut rendered = Vec::new();
            let mut truncated = 0;
            while let Some(row) = rows
                .next()
                .map_err(|e| StoreSqlError::Query(e.to_string()))?
            {
                if rendered.len() >= max_rows {
                    truncated += 1;
                    continue;
                }
                let mut cells = Vec::with_capacity(width);
                for i in 0..width {
                    let value = row
                        .get_ref(i)
                        .map_err(|e| StoreSqlError::Query(e.to_string()))?;
                    cells.push(render_value(value));
                }
                rendered.push(cells);
            }

            Ok(QueryOutput {
                columns,
                rows: rendered,
                truncated,
            })
        })?;

        debug!(sql = %text, rows = output.row_count(), "Statement executed");
        Ok(output)
    }
}

/// Create the store-scoped copy of each existing table in `tables`.
fn install_scope(
    conn: &Connection,
    guard: &QueryGuard,
    tables: &[String],
) -> Result<(), StoreSqlError> {
    let column = &guard.scope().column;
    for table in tables {
        let columns = base_columns(conn, table)?;
        if columns.is_empty() {
            continue;
        }
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            return Err(StoreSqlError::Config(format!(
                "table {} has no {} column to scope by",
                table, column
            )));
        }
        conn.execute_batch(&guard.scoped_copy_sql(table))
            .map_err(|e| StoreSqlError::Storage(format!("Scoped copy of {}: {}", table, e)))?;
        debug!(table = %table, scope = %column, id = guard.scope().id, "Store-scoped copy created");
    }
    Ok(())
}

/// Column names of a table in the main schema; empty when it does not exist.
fn base_columns(conn: &Connection, table: &str) -> Result<Vec<String>, StoreSqlError> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA main.table_info({})", quote_ident(table)))
        .map_err(|e| StoreSqlError::Storage(format!("table_info prepare: {}", e)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| StoreSqlError::Storage(format!("table_info: {}", e)))?;
    names
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreSqlError::Storage(e.to_string()))
}

fn prepare_error(err: rusqlite::Error) -> StoreSqlError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::AuthorizationForStatementDenied =>
        {
            StoreSqlError::Rejected("statement uses a table or operation that is not allowed".into())
        }
        _ => StoreSqlError::Query(err.to_string()),
    }
}
