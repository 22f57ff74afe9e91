//! The SQL tool: generate a query for a question, run it, format the outcome.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use storesql_core::error::StoreSqlError;
use storesql_core::types::GeneratedQuery;
use storesql_llm::generator::QueryGenerator;
use storesql_llm::types::ToolSpec;
use storesql_storage::accessor::DatabaseAccessor;

use crate::response::{format_error, format_sql_result};

/// Name the controller uses to call the tool.
pub const TOOL_NAME: &str = "handle_sql_query";

/// Outcome of one tool run.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRun {
    /// What the generator produced, if it succeeded.
    pub query: Option<GeneratedQuery>,
    /// Rendered rows, if a statement was executed successfully.
    pub raw: Option<String>,
    /// Text shown to the user (or handed back to the controller).
    pub output: String,
    pub failed: bool,
}

impl ToolRun {
    fn error(query: Option<GeneratedQuery>, err: &StoreSqlError) -> Self {
        Self {
            query,
            raw: None,
            output: format_error(err),
            failed: true,
        }
    }
}

/// Query generator plus database accessor behind one call.
pub struct SqlTool {
    generator: Arc<QueryGenerator>,
    accessor: Arc<dyn DatabaseAccessor>,
}

impl SqlTool {
    pub fn new(generator: Arc<QueryGenerator>, accessor: Arc<dyn DatabaseAccessor>) -> Self {
        Self {
            generator,
            accessor,
        }
    }

    /// Declaration sent to the controller model.
    pub fn spec() -> ToolSpec {
        ToolSpec {
            name: TOOL_NAME.to_string(),
            description: "Generate a SQL query for a question about the store's data, \
                          run it and return the query with its result."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "The user's question in natural language"
                    }
                },
                "required": ["question"]
            }),
        }
    }

    /// Ask the generator for a query. Errors propagate.
    pub async fn generate(&self, question: &str) -> Result<GeneratedQuery, StoreSqlError> {
        self.generator.generate(question).await
    }

    /// Carry out a generated query. Never fails: execution errors become an
    /// error block, the sentinel and direct answers are shown verbatim.
    pub fn execute(&self, query: &GeneratedQuery) -> ToolRun {
        match query {
            GeneratedQuery::NoData => ToolRun {
                query: Some(GeneratedQuery::NoData),
                raw: None,
                output: self.generator.sentinel().to_string(),
                failed: false,
            },
            GeneratedQuery::Answer(text) => ToolRun {
                query: Some(query.clone()),
                raw: None,
                output: text.clone(),
                failed: false,
            },
            GeneratedQuery::Sql(sql) => match self.accessor.run(sql) {
                Ok(output) => {
                    info!(rows = output.row_count(), "Query executed");
                    let raw = output.to_string();
                    ToolRun {
                        query: Some(query.clone()),
                        output: format_sql_result(sql, &raw),
                        raw: Some(raw),
                        failed: false,
                    }
                }
                Err(e) => {
                    warn!(error = %e, %sql, "Query execution failed");
                    ToolRun::error(Some(query.clone()), &e)
                }
            },
        }
    }

    /// Generate and execute, catching every failure.
    pub async fn call(&self, question: &str) -> ToolRun {
        match self.generate(question).await {
            Ok(query) => self.execute(&query),
            Err(e) => {
                warn!(error = %e, "Query generation failed");
                ToolRun::error(None, &e)
            }
        }
    }
}
