//! Reactive strategy: a controller model that may call the SQL tool.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use storesql_core::types::TurnResult;
use storesql_llm::provider::LanguageModel;
use storesql_llm::types::{ContentBlock, Message, ModelReply, ModelRequest};

use crate::error::ChatError;
use crate::tool::{SqlTool, ToolRun, TOOL_NAME};

/// Final controller output before it is turned into display text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ControllerOutput {
    Text(String),
    Structured(Vec<ContentBlock>),
}

impl ControllerOutput {
    pub fn from_reply(reply: ModelReply) -> Self {
        let mut content = reply.content;
        if content.len() == 1 {
            if let ContentBlock::Text { text } = &mut content[0] {
                return ControllerOutput::Text(std::mem::take(text));
            }
        }
        ControllerOutput::Structured(content)
    }

    /// Display string: the text itself, or the text blocks joined by newlines.
    pub fn into_display(self) -> String {
        match self {
            ControllerOutput::Text(text) => text,
            ControllerOutput::Structured(blocks) => blocks
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Tool-calling controller.
pub struct ToolAgent {
    model: Arc<dyn LanguageModel>,
    tool: Arc<SqlTool>,
    system_prompt: String,
    max_rounds: usize,
}

impl ToolAgent {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tool: Arc<SqlTool>,
        system_prompt: impl Into<String>,
        max_rounds: usize,
    ) -> Self {
        Self {
            model,
            tool,
            system_prompt: system_prompt.into(),
            max_rounds,
        }
    }

    /// Run one turn over `context`.
    ///
    /// Tool failures are handed back to the controller as error results;
    /// a failing controller call fails the turn.
    pub async fn run_turn(&self, context: &str) -> Result<TurnResult, ChatError> {
        let mut messages = vec![Message::user(context)];
        let mut last_run: Option<ToolRun> = None;
        let mut rounds = 0;

        loop {
            let request = ModelRequest {
                system: self.system_prompt.clone(),
                messages: messages.clone(),
                tools: vec![SqlTool::spec()],
            };
            let reply = self.model.invoke(request).await?;

            let calls: Vec<(String, String, Value)> = reply
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            if calls.is_empty() {
                let mut display = ControllerOutput::from_reply(reply).into_display();
                if display.trim().is_empty() {
                    if let Some(run) = &last_run {
                        display = run.output.clone();
                    }
                }
                info!(rounds, "Controller finished");
                return Ok(TurnResult {
                    query: last_run.as_ref().and_then(|r| r.query.clone()),
                    raw_result: last_run.and_then(|r| r.raw),
                    display,
                });
            }

            if rounds >= self.max_rounds {
                warn!(max_rounds = self.max_rounds, "Controller kept calling tools");
                return Err(ChatError::ToolRoundLimit(self.max_rounds));
            }
            rounds += 1;

            messages.push(Message::assistant_blocks(reply.content));
            let mut results = Vec::with_capacity(calls.len());
            for (id, name, input) in calls {
                let block = match self.dispatch(&name, &input).await {
                    Ok(run) => {
                        let block = ContentBlock::ToolResult {
                            tool_use_id: id,
                            content: run.output.clone(),
                            is_error: run.failed,
                        };
                        last_run = Some(run);
                        block
                    }
                    Err(message) => ContentBlock::ToolResult {
                        tool_use_id: id,
                        content: message,
                        is_error: true,
                    },
                };
                results.push(block);
            }
            messages.push(Message::user_blocks(results));
        }
    }

    async fn dispatch(&self, name: &str, input: &Value) -> Result<ToolRun, String> {
        if name != TOOL_NAME {
            return Err(format!("unknown tool: {}", name));
        }
        let question = input
            .get("question")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing string field: question".to_string())?;
        debug!(%question, "Controller called the SQL tool");
        Ok(self.tool.call(question).await)
    }
}
