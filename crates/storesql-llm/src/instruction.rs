//! System instruction for the query generator.
//!
//! The template is configuration text with `{placeholder}` slots filled at
//! startup from the schema snapshot and the store scope.

use std::path::Path;

use storesql_core::error::StoreSqlError;
use storesql_core::types::StoreScope;

/// Built-in instruction template.
pub const DEFAULT_TEMPLATE: &str = "\
You write SQL for the {dialect} dialect.

Answer the user's question with one syntactically valid, efficient query that
follows every rule below:

- Use only these tables and columns:
{table_info}
- Every query must filter on {store_column} = {store_id}. Never return rows for
  another store.
- Select only the columns the question needs; never use SELECT *.
- Never invent columns that are not in the schema.
- For a named month, filter with strftime('%m', activity_date), e.g. March is
  '03' and April is '04'. For several months use IN ('03', '04').
- Add LIMIT 10 unless the question asks for a specific number of results.
- Prefer aggregates such as SUM or COUNT when the question asks for totals.

If the question asks about a period the data does not cover, do not write a
query; reply with exactly: {sentinel}

Your reply must be exactly one of:
1. a single SQL query with no commentary,
2. a one-line numeric answer such as \"There were 24 total orders in March 2020.\",
3. the exact phrase: {sentinel}
";

/// Values substituted into the template.
#[derive(Debug, Clone)]
pub struct InstructionParams<'a> {
    pub dialect: &'a str,
    pub table_info: &'a str,
    pub scope: &'a StoreScope,
    pub sentinel: &'a str,
}

/// Fill `template` with `params`.
pub fn render_instruction(template: &str, params: &InstructionParams<'_>) -> String {
    template
        .replace("{dialect}", params.dialect)
        .replace("{table_info}", params.table_info.trim_end())
        .replace("{store_column}", &params.scope.column)
        .replace("{store_id}", &params.scope.id.to_string())
        .replace("{sentinel}", params.sentinel)
}

/// Read a template override, or fall back to [`DEFAULT_TEMPLATE`].
pub fn load_template(path: Option<&Path>) -> Result<String, StoreSqlError> {
    match path {
        Some(path) => {
            let template = std::fs::read_to_string(path)?;
            if !template.contains("{store_id}") {
                return Err(StoreSqlError::Config(format!(
                    "instruction template {} has no {{store_id}} placeholder",
                    path.display()
                )));
            }
            Ok(template)
        }
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}
