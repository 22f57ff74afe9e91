//! Scripted language model for tests.
//!
//! Replies are returned in the order they were pushed; every request is
//! recorded so tests can inspect what the workflow sent.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use storesql_core::error::StoreSqlError;

use crate::provider::LanguageModel;
use crate::types::{ModelReply, ModelRequest};

#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply, String>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: ModelReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(reply));
        }
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push_reply(ModelReply::text(text));
    }

    pub fn push_tool_use(&self, id: &str, name: &str, input: Value) {
        self.push_reply(ModelReply::tool_use(id, name, input));
    }

    /// Queue a failure surfaced as [`StoreSqlError::Llm`].
    pub fn push_error(&self, message: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(message.into()));
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Replies not yet consumed.
    pub fn pending(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: ModelRequest) -> Result<ModelReply, StoreSqlError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let next = self
            .replies
            .lock()
            .map_err(|e| StoreSqlError::llm("scripted", format!("lock poisoned: {}", e)))?
            .pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(StoreSqlError::llm("scripted", message)),
            None => Err(StoreSqlError::llm("scripted", "script exhausted")),
        }
    }
}
