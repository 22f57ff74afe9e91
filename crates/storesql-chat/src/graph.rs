//! Pipeline strategy: a fixed `generate_query -> execute_query` graph.
//!
//! State is checkpointed under the session id after the input is accepted
//! and after every node, so a thread can be inspected or resumed.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use storesql_core::types::{GeneratedQuery, Role, TurnResult};

use crate::checkpoint::{Checkpoint, Checkpointer};
use crate::error::ChatError;
use crate::tool::SqlTool;

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMessage {
    pub role: Role,
    pub content: String,
}

/// Graph state carried between nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub messages: Vec<GraphMessage>,
    pub sql_query: Option<GeneratedQuery>,
    pub raw_result: Option<String>,
}

impl GraphState {
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(GraphMessage {
            role,
            content: content.into(),
        });
    }

    pub fn last_message(&self) -> Option<&GraphMessage> {
        self.messages.last()
    }
}

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    GenerateQuery,
    ExecuteQuery,
}

impl Node {
    pub const START: Node = Node::GenerateQuery;

    /// The node after this one; `None` ends the run.
    pub fn next(self) -> Option<Node> {
        match self {
            Node::GenerateQuery => Some(Node::ExecuteQuery),
            Node::ExecuteQuery => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::GenerateQuery => f.write_str("generate_query"),
            Node::ExecuteQuery => f.write_str("execute_query"),
        }
    }
}

// =============================================================================
// Graph
// =============================================================================

pub struct QueryGraph {
    tool: Arc<SqlTool>,
    checkpointer: Arc<dyn Checkpointer>,
}

impl QueryGraph {
    pub fn new(tool: Arc<SqlTool>, checkpointer: Arc<dyn Checkpointer>) -> Self {
        Self { tool, checkpointer }
    }

    pub fn checkpointer(&self) -> &Arc<dyn Checkpointer> {
        &self.checkpointer
    }

    /// Answer `context` on the thread, continuing from its last finished run.
    ///
    /// Input left behind by a failed run is dropped; use [`Self::resume`] to
    /// retry it instead.
    pub async fn run_turn(&self, thread_id: Uuid, context: &str) -> Result<TurnResult, ChatError> {
        let mut state = self
            .checkpointer
            .last_completed(thread_id)?
            .map(|c| c.state)
            .unwrap_or_default();
        state.push(Role::User, context);
        state.sql_query = None;
        state.raw_result = None;

        let state = self.invoke(thread_id, state).await?;
        Ok(turn_result(state))
    }

    /// Run the whole graph over `state`.
    pub async fn invoke(&self, thread_id: Uuid, state: GraphState) -> Result<GraphState, ChatError> {
        self.save(thread_id, None, Some(Node::START), &state)?;
        self.run_from(thread_id, Node::START, state).await
    }

    /// Continue the thread from the node recorded in its latest checkpoint.
    pub async fn resume(&self, thread_id: Uuid) -> Result<GraphState, ChatError> {
        let checkpoint = self.checkpointer.latest(thread_id)?.ok_or_else(|| {
            ChatError::Checkpoint(format!("no checkpoint for thread {}", thread_id))
        })?;
        match checkpoint.next {
            Some(node) => {
                info!(%thread_id, %node, "Resuming graph");
                self.run_from(thread_id, node, checkpoint.state).await
            }
            None => Ok(checkpoint.state),
        }
    }

    async fn run_from(
        &self,
        thread_id: Uuid,
        start: Node,
        mut state: GraphState,
    ) -> Result<GraphState, ChatError> {
        let mut current = Some(start);
        while let Some(node) = current {
            self.step(node, &mut state).await?;
            current = node.next();
            self.save(thread_id, Some(node), current, &state)?;
            debug!(%thread_id, %node, "Node complete");
        }
        Ok(state)
    }

    async fn step(&self, node: Node, state: &mut GraphState) -> Result<(), ChatError> {
        match node {
            Node::GenerateQuery => {
                let question = state
                    .last_message()
                    .map(|m| m.content.clone())
                    .ok_or_else(|| ChatError::Generation("no message to answer".to_string()))?;
                let query = self.tool.generate(&question).await?;
                state.sql_query = Some(query);
            }
            Node::ExecuteQuery => {
                let query = state.sql_query.as_ref().ok_or_else(|| {
                    ChatError::Checkpoint("execute_query reached without a query".to_string())
                })?;
                let run = self.tool.execute(query);
                state.raw_result = run.raw;
                state.push(Role::Assistant, run.output);
            }
        }
        Ok(())
    }

    fn save(
        &self,
        thread_id: Uuid,
        node: Option<Node>,
        next: Option<Node>,
        state: &GraphState,
    ) -> Result<(), ChatError> {
        let step = self
            .checkpointer
            .latest(thread_id)?
            .map_or(0, |c| c.step + 1);
        self.checkpointer.put(Checkpoint {
            thread_id,
            step,
            node,
            next,
            state: state.clone(),
            created_at: Utc::now().timestamp(),
        })
    }
}

fn turn_result(state: GraphState) -> TurnResult {
    let display = state
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content.clone())
        .unwrap_or_default();
    TurnResult {
        query: state.sql_query,
        raw_result: state.raw_result,
        display,
    }
}
