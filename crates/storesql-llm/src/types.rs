//! Provider-neutral request and reply types.
//!
//! The shapes follow the Messages API content-block model: a message carries
//! either plain text or a list of text / tool-use / tool-result blocks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use storesql_core::types::Role;

// ============================================================================
// MESSAGES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(blocks),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "is_false")]
        is_error: bool,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

// ============================================================================
// REQUEST / REPLY
// ============================================================================

/// One model invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
}

impl ModelRequest {
    /// A single-question request with no tools.
    pub fn prompt(system: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: vec![Message::user(question)],
            tools: Vec::new(),
        }
    }
}

/// What the model sent back.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            stop_reason: Some("end_turn".to_string()),
        }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            content: vec![ContentBlock::ToolUse {
                id: id.into(),
                name: name.into(),
                input,
            }],
            stop_reason: Some("tool_use".to_string()),
        }
    }

    /// All text blocks joined by newlines.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `(id, name, input)` of every tool call in the reply.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &Value)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_message_serializes_as_string() {
        let value = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_tool_result_block_serialization() {
        let msg = Message::user_blocks(vec![ContentBlock::ToolResult {
            tool_use_id: "toolu_1".into(),
            content: "24".into(),
            is_error: false,
        }]);
        let value = serde_json::to_value(msg).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": "toolu_1", "content": "24"}]
            })
        );
    }

    #[test]
    fn test_tool_use_block_roundtrip_from_api_shape() {
        let block: ContentBlock = serde_json::from_value(json!({
            "type": "tool_use",
            "id": "toolu_9",
            "name": "handle_sql_query",
            "input": {"question": "orders in March"}
        }))
        .unwrap();
        assert!(matches!(block, ContentBlock::ToolUse { ref name, .. } if name == "handle_sql_query"));
    }

    #[test]
    fn test_reply_helpers() {
        let reply = ModelReply {
            content: vec![
                ContentBlock::Text { text: "Let me check.".into() },
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "handle_sql_query".into(),
                    input: json!({"question": "q"}),
                },
                ContentBlock::Text { text: "Done.".into() },
            ],
            stop_reason: Some("tool_use".into()),
        };
        assert_eq!(reply.joined_text(), "Let me check.\nDone.");
        let uses = reply.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].0, "t1");
    }
}
