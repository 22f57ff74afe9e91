//! Language model access for storesql.
//!
//! Provides the provider-neutral [`LanguageModel`] trait, the Anthropic
//! Messages API implementation, and the query generator that turns a
//! question into SQL under a fixed system instruction.

pub mod anthropic;
pub mod generator;
pub mod instruction;
pub mod mock;
pub mod provider;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicModel};
pub use generator::{classify, QueryGenerator};
pub use instruction::{load_template, render_instruction, InstructionParams, DEFAULT_TEMPLATE};
pub use mock::ScriptedModel;
pub use provider::LanguageModel;
pub use types::{ContentBlock, Message, MessageContent, ModelReply, ModelRequest, ToolSpec};
