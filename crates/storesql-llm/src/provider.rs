//! Language model abstraction.

use async_trait::async_trait;

use storesql_core::error::StoreSqlError;

use crate::types::{ModelReply, ModelRequest};

/// A hosted (or scripted) chat model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Send one request and wait for the complete reply.
    async fn invoke(&self, request: ModelRequest) -> Result<ModelReply, StoreSqlError>;
}
