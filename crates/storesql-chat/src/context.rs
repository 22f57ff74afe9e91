//! Rolling context window.
//!
//! The query generator sees the last few history entries as plain text in
//! front of the new question.

use storesql_core::types::{Conversation, Role};

/// Builds the text passed to the generator for one turn.
#[derive(Debug, Clone, Copy)]
pub struct ContextWindow {
    /// Prior history entries to include.
    pub entries: usize,
}

impl ContextWindow {
    pub fn new(entries: usize) -> Self {
        Self { entries }
    }

    /// Render the last `entries` messages as `role: text` lines followed by
    /// `user: <question>`. With no prior messages this is the bare question.
    pub fn build(&self, conversation: &Conversation, question: &str) -> String {
        let recent = conversation.recent(self.entries);
        if recent.is_empty() {
            return question.to_string();
        }

        let mut context = String::new();
        for message in recent {
            context.push_str(message.role().as_str());
            context.push_str(": ");
            context.push_str(message.content());
            context.push('\n');
        }
        context.push_str(Role::User.as_str());
        context.push_str(": ");
        context.push_str(question);
        context
    }
}
