//! Shared data model: messages, conversations, generated queries, turn results.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Role / Message
// =============================================================================

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a conversation.
///
/// Messages are only created by [`Conversation::append`], which assigns the
/// position. Fields are private so a stored message cannot be mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    role: Role,
    content: String,
    position: usize,
    created_at: i64,
}

impl Message {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Zero-based index of this message in its conversation.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Creation time as epoch seconds.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// An append-only sequence of messages keyed by a session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    id: Uuid,
    started_at: i64,
    last_message_at: i64,
    messages: Vec<Message>,
}

impl Conversation {
    /// Start an empty conversation with a fresh random id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id,
            started_at: now,
            last_message_at: now,
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn last_message_at(&self) -> i64 {
        self.last_message_at
    }

    /// Append a message at the end of the conversation.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> &Message {
        let now = Utc::now().timestamp();
        let position = self.messages.len();
        self.messages.push(Message {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            position,
            created_at: now,
        });
        self.last_message_at = now;
        &self.messages[position]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The last `n` messages (fewer if the conversation is shorter).
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Store scope
// =============================================================================

/// The single store every generated query is restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreScope {
    /// Column holding the store identifier.
    pub column: String,
    /// Identifier of the store.
    pub id: i64,
}

impl StoreScope {
    pub fn new(column: impl Into<String>, id: i64) -> Self {
        Self {
            column: column.into(),
            id,
        }
    }
}

// =============================================================================
// Generated query / turn result
// =============================================================================

/// Classified output of the query generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum GeneratedQuery {
    /// A SQL statement to execute.
    Sql(String),
    /// The model answered with the "no data" sentinel.
    NoData,
    /// A one-line natural-language answer that needs no execution.
    Answer(String),
}

impl GeneratedQuery {
    pub fn sql(&self) -> Option<&str> {
        match self {
            GeneratedQuery::Sql(sql) => Some(sql),
            _ => None,
        }
    }
}

/// Transient record of one conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// The last query produced during the turn, if the generator ran.
    pub query: Option<GeneratedQuery>,
    /// Raw rendering of the execution result, if a statement was executed.
    pub raw_result: Option<String>,
    /// Markdown text shown to the user and stored as the assistant message.
    pub display: String,
}

// =============================================================================
// Strategy
// =============================================================================

/// Control structure used by the conversation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// A tool-calling controller decides when to run the SQL tool.
    #[default]
    Reactive,
    /// A fixed generate -> execute graph.
    Pipeline,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reactive" | "agent" => Ok(Strategy::Reactive),
            "pipeline" | "graph" => Ok(Strategy::Pipeline),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Reactive => f.write_str("reactive"),
            Strategy::Pipeline => f.write_str("pipeline"),
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        let home = std::env::var("USERPROFILE")
            .or_else(|_| std::env::var("HOME"))
            .unwrap_or_else(|_| ".".to_string());
        path.replacen('~', &home, 1)
    } else {
        path.to_string()
    }
}
