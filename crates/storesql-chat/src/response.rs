//! Markdown blocks shown for each turn.

use std::fmt::Display;

/// Generated statement followed by its rendered result.
pub fn format_sql_result(sql: &str, result: &str) -> String {
    format!(
        "**Generated SQL:**\n```sql\n{}\n```\n\n**Result:**\n```\n{}\n```",
        sql.trim(),
        result
    )
}

/// Failure of generation or execution, shown in place of a result.
pub fn format_error(err: &impl Display) -> String {
    format!("**Error during execution:** {}", err)
}
