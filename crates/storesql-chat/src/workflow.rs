//! Conversation workflow: sessions, validation and strategy dispatch.
//!
//! Owns every conversation, builds the per-turn context, hands it to the
//! configured strategy and appends the finished turn to history.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use storesql_core::config::ChatConfig;
use storesql_core::types::{Conversation, Message, Role, Strategy, TurnResult};
use storesql_llm::provider::LanguageModel;

use crate::agent::ToolAgent;
use crate::checkpoint::{Checkpoint, Checkpointer, MemoryCheckpointer};
use crate::context::ContextWindow;
use crate::error::ChatError;
use crate::graph::QueryGraph;
use crate::tool::SqlTool;

/// Summary of one session for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: String,
    pub last_message_at: String,
    pub message_count: usize,
}

enum Engine {
    Reactive(ToolAgent),
    Pipeline(QueryGraph),
}

/// One conversation workflow behind either strategy.
pub struct ConversationWorkflow {
    strategy: Strategy,
    engine: Engine,
    context: ContextWindow,
    max_message_length: usize,
    checkpointer: Arc<dyn Checkpointer>,
    sessions: Mutex<HashMap<Uuid, Conversation>>,
}

impl ConversationWorkflow {
    /// Build a workflow with an in-memory checkpointer.
    pub fn new(
        strategy: Strategy,
        config: &ChatConfig,
        model: Arc<dyn LanguageModel>,
        tool: Arc<SqlTool>,
    ) -> Self {
        Self::with_checkpointer(
            strategy,
            config,
            model,
            tool,
            Arc::new(MemoryCheckpointer::new()),
        )
    }

    pub fn with_checkpointer(
        strategy: Strategy,
        config: &ChatConfig,
        model: Arc<dyn LanguageModel>,
        tool: Arc<SqlTool>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        let engine = match strategy {
            Strategy::Reactive => Engine::Reactive(ToolAgent::new(
                model,
                tool,
                config.agent_prompt.clone(),
                config.max_tool_rounds,
            )),
            Strategy::Pipeline => Engine::Pipeline(QueryGraph::new(tool, checkpointer.clone())),
        };
        info!(%strategy, history_window = config.history_window, "Conversation workflow ready");

        Self {
            strategy,
            engine,
            context: ContextWindow::new(config.history_window),
            max_message_length: config.max_message_length,
            checkpointer,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Handle one user message.
    ///
    /// Returns the turn result and the session id (new or existing). The
    /// question and answer are appended to history only when the turn
    /// succeeds.
    pub async fn handle_message(
        &self,
        message: &str,
        session_id: Option<Uuid>,
    ) -> Result<(TurnResult, Uuid), ChatError> {
        let text = message.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.max_message_length {
            return Err(ChatError::MessageTooLong(self.max_message_length));
        }

        let (sid, context, is_new) = {
            let sessions = self.lock_sessions()?;
            let sid = resolve_session(&sessions, session_id);
            match sessions.get(&sid) {
                Some(conversation) => (sid, self.context.build(conversation, text), false),
                None => (sid, text.to_string(), true),
            }
        };

        let outcome = match &self.engine {
            Engine::Reactive(agent) => agent.run_turn(&context).await,
            Engine::Pipeline(graph) => graph.run_turn(sid, &context).await,
        };
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(session = %sid, error = %e, "Turn failed");
                if is_new {
                    // nobody holds this id yet
                    self.checkpointer.delete_thread(sid)?;
                }
                return Err(e);
            }
        };

        {
            let mut sessions = self.lock_sessions()?;
            let conversation = sessions
                .entry(sid)
                .or_insert_with(|| Conversation::with_id(sid));
            conversation.append(Role::User, text);
            conversation.append(Role::Assistant, result.display.clone());
        }

        info!(session = %sid, executed = result.raw_result.is_some(), "Turn complete");
        Ok((result, sid))
    }

    /// Message history of a session in append order.
    pub fn get_history(&self, session_id: Uuid) -> Result<Vec<Message>, ChatError> {
        let sessions = self.lock_sessions()?;
        sessions
            .get(&session_id)
            .map(|c| c.messages().to_vec())
            .ok_or(ChatError::SessionNotFound(session_id))
    }

    pub fn get_session(&self, session_id: Uuid) -> Option<Conversation> {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(&session_id).cloned())
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions = match self.sessions.lock() {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .map(|c| SessionSummary {
                id: c.id(),
                started_at: format_epoch(c.started_at()),
                last_message_at: format_epoch(c.last_message_at()),
                message_count: c.len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        summaries
    }

    /// Delete a session and its checkpoints.
    pub fn delete_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        let removed = self.lock_sessions()?.remove(&session_id).is_some();
        if !removed {
            return Err(ChatError::SessionNotFound(session_id));
        }
        self.checkpointer.delete_thread(session_id)
    }

    /// Checkpoints recorded for a session's graph runs.
    pub fn checkpoints(&self, session_id: Uuid) -> Result<Vec<Checkpoint>, ChatError> {
        self.checkpointer.list(session_id)
    }

    fn lock_sessions(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Conversation>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::Storage(format!("session lock poisoned: {}", e)))
    }
}

/// Reuse a known session id or pick a fresh one. The session itself is
/// stored only once a turn succeeds.
fn resolve_session(sessions: &HashMap<Uuid, Conversation>, requested: Option<Uuid>) -> Uuid {
    requested
        .filter(|sid| sessions.contains_key(sid))
        .unwrap_or_else(Uuid::new_v4)
}

fn format_epoch(epoch: i64) -> String {
    Utc.timestamp_opt(epoch, 0)
        .single()
        .map(|dt: DateTime<Utc>| dt.to_rfc3339())
        .unwrap_or_else(|| epoch.to_string())
}
