//! Conversation workflow for storesql.
//!
//! Turns each user message into a generated query, runs it through the
//! guarded accessor and keeps per-session history. Two strategies share one
//! interface: a tool-calling controller and a fixed two-node graph with
//! checkpointing.

pub mod agent;
pub mod checkpoint;
pub mod context;
pub mod error;
pub mod graph;
pub mod response;
pub mod tool;
pub mod workflow;

pub use agent::{ControllerOutput, ToolAgent};
pub use checkpoint::{Checkpoint, Checkpointer, MemoryCheckpointer};
pub use context::ContextWindow;
pub use error::ChatError;
pub use graph::{GraphMessage, GraphState, Node, QueryGraph};
pub use tool::{SqlTool, ToolRun, TOOL_NAME};
pub use workflow::{ConversationWorkflow, SessionSummary};
