//! Anthropic (Claude) provider.

pub mod client;
pub mod model;
pub mod types;

pub use client::AnthropicClient;
pub use model::AnthropicModel;
