//! Execution hardening for model-generated SQL.
//!
//! Statements reach SQLite only as a single read-only statement that stays
//! inside the table allow-list. Allow-listed tables are only readable through
//! their store-scoped copies in the `temp` schema, which shadow the base
//! tables for unqualified names.

use std::collections::HashSet;

use rusqlite::hooks::{AuthAction, AuthContext, Authorization};

use storesql_core::error::StoreSqlError;
use storesql_core::types::StoreScope;

use crate::loader::quote_ident;

/// Tables SQLite reads internally while preparing statements.
const SCHEMA_TABLES: &[&str] = &["sqlite_master", "sqlite_schema", "sqlite_temp_master"];

/// Schema holding the store-scoped copies.
pub const SCOPED_SCHEMA: &str = "temp";

/// Policy applied to every statement the accessor runs.
#[derive(Debug, Clone)]
pub struct QueryGuard {
    allowed_tables: HashSet<String>,
    scope: StoreScope,
    max_rows: usize,
}

impl QueryGuard {
    pub fn new<I, S>(allowed_tables: I, scope: StoreScope, max_rows: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_tables: allowed_tables
                .into_iter()
                .map(|t| t.as_ref().to_ascii_lowercase())
                .collect(),
            scope,
            max_rows,
        }
    }

    pub fn allowed_tables(&self) -> &HashSet<String> {
        &self.allowed_tables
    }

    pub fn scope(&self) -> &StoreScope {
        &self.scope
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Normalize `sql` to exactly one statement, or reject it.
    pub fn check_text(&self, sql: &str) -> Result<String, StoreSqlError> {
        let text = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if text.is_empty() {
            return Err(StoreSqlError::Rejected("empty statement".into()));
        }
        if has_second_statement(text) {
            return Err(StoreSqlError::Rejected(
                "only a single statement may run".into(),
            ));
        }
        Ok(text.to_string())
    }

    /// Statement that copies the store's rows of `table` into the scoped schema.
    pub fn scoped_copy_sql(&self, table: &str) -> String {
        let name = quote_ident(table);
        format!(
            "CREATE TEMP TABLE {name} AS SELECT * FROM main.{name} WHERE {} = {}",
            quote_ident(&self.scope.column),
            self.scope.id
        )
    }

    /// Authorizer decision for one action SQLite reports while preparing.
    ///
    /// Allow-listed tables are readable only in the scoped schema, so a
    /// `main.`-qualified reference to a base table is denied.
    pub fn authorize(allowed: &HashSet<String>, ctx: &AuthContext<'_>) -> Authorization {
        match ctx.action {
            AuthAction::Select | AuthAction::Function { .. } | AuthAction::Recursive => {
                Authorization::Allow
            }
            AuthAction::Read { table_name, .. } => {
                let table = table_name.to_ascii_lowercase();
                if SCHEMA_TABLES.contains(&table.as_str()) {
                    return Authorization::Allow;
                }
                let scoped = ctx
                    .database_name
                    .is_some_and(|db| db.eq_ignore_ascii_case(SCOPED_SCHEMA));
                if scoped && allowed.contains(&table) {
                    Authorization::Allow
                } else {
                    Authorization::Deny
                }
            }
            _ => Authorization::Deny,
        }
    }
}

/// True when a `;` outside quotes is followed by more SQL.
fn has_second_statement(sql: &str) -> bool {
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                ';' => {
                    let rest = sql[i + 1..].trim();
                    if !rest.is_empty() && !rest.starts_with("--") {
                        return true;
                    }
                }
                _ => {}
            },
        }
    }
    false
}
