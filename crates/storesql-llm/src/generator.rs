//! Query generator: question in, classified SQL / sentinel / answer out.

use std::sync::Arc;

use tracing::{debug, info};

use storesql_core::error::StoreSqlError;
use storesql_core::types::GeneratedQuery;

use crate::provider::LanguageModel;
use crate::types::ModelRequest;

/// First keywords that mark a reply as a SQL statement.
const STATEMENT_KEYWORDS: &[&str] = &[
    "select", "with", "insert", "update", "delete", "create", "drop", "alter", "pragma",
    "replace", "attach", "detach", "vacuum",
];

/// Turns questions into queries using a fixed system instruction.
pub struct QueryGenerator {
    model: Arc<dyn LanguageModel>,
    instruction: String,
    sentinel: String,
}

impl QueryGenerator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        instruction: impl Into<String>,
        sentinel: impl Into<String>,
    ) -> Self {
        Self {
            model,
            instruction: instruction.into(),
            sentinel: sentinel.into(),
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Ask the model for a query answering `question`.
    ///
    /// Model and transport errors are returned unchanged.
    pub async fn generate(&self, question: &str) -> Result<GeneratedQuery, StoreSqlError> {
        let reply = self
            .model
            .invoke(ModelRequest::prompt(self.instruction.clone(), question))
            .await?;
        let raw = reply.joined_text();
        if raw.trim().is_empty() {
            return Err(StoreSqlError::llm(
                self.model.name(),
                "model returned no text",
            ));
        }

        let query = classify(&raw, &self.sentinel);
        match &query {
            GeneratedQuery::Sql(sql) => debug!(%sql, "Generated SQL"),
            GeneratedQuery::NoData => info!("Generator reported no data for the question"),
            GeneratedQuery::Answer(text) => debug!(%text, "Generator answered directly"),
        }
        Ok(query)
    }
}

/// Classify raw model output.
pub fn classify(raw: &str, sentinel: &str) -> GeneratedQuery {
    let trimmed = raw.trim();
    let unquoted = trimmed.trim_matches(|c: char| c == '"' || c == '\'' || c == '`').trim();
    if unquoted == sentinel.trim() {
        return GeneratedQuery::NoData;
    }

    let body = strip_code_fence(trimmed);
    let first_word = body
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if STATEMENT_KEYWORDS.contains(&first_word.as_str()) {
        GeneratedQuery::Sql(body.to_string())
    } else {
        GeneratedQuery::Answer(trimmed.to_string())
    }
}

fn strip_code_fence(text: &str) -> &str {
    let inner = if let Some(s) = text.strip_prefix("```sql") {
        s
    } else if let Some(s) = text.strip_prefix("```") {
        s
    } else {
        text
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
