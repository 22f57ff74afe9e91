//! Checkpoint storage for graph runs, keyed by thread (session) id.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChatError;
use crate::graph::{GraphState, Node};

/// Snapshot of a thread's graph state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: Uuid,
    /// Position in the thread's checkpoint sequence, starting at 0.
    pub step: usize,
    /// Node that just completed; `None` for an accepted input.
    pub node: Option<Node>,
    /// Node to run next; `None` once the run is finished.
    pub next: Option<Node>,
    pub state: GraphState,
    pub created_at: i64,
}

pub trait Checkpointer: Send + Sync {
    fn put(&self, checkpoint: Checkpoint) -> Result<(), ChatError>;

    fn latest(&self, thread_id: Uuid) -> Result<Option<Checkpoint>, ChatError>;

    /// Most recent checkpoint of a finished run (`next` is `None`).
    fn last_completed(&self, thread_id: Uuid) -> Result<Option<Checkpoint>, ChatError>;

    /// All checkpoints of a thread, oldest first.
    fn list(&self, thread_id: Uuid) -> Result<Vec<Checkpoint>, ChatError>;

    fn delete_thread(&self, thread_id: Uuid) -> Result<(), ChatError>;
}

/// In-memory checkpointer. Threads never share state.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    threads: Mutex<HashMap<Uuid, Vec<Checkpoint>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Vec<Checkpoint>>>, ChatError> {
        self.threads
            .lock()
            .map_err(|e| ChatError::Checkpoint(format!("checkpoint lock poisoned: {}", e)))
    }
}

impl Checkpointer for MemoryCheckpointer {
    fn put(&self, checkpoint: Checkpoint) -> Result<(), ChatError> {
        self.lock()?
            .entry(checkpoint.thread_id)
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    fn latest(&self, thread_id: Uuid) -> Result<Option<Checkpoint>, ChatError> {
        Ok(self
            .lock()?
            .get(&thread_id)
            .and_then(|list| list.last().cloned()))
    }

    fn last_completed(&self, thread_id: Uuid) -> Result<Option<Checkpoint>, ChatError> {
        Ok(self.lock()?.get(&thread_id).and_then(|list| {
            list.iter().rev().find(|c| c.next.is_none()).cloned()
        }))
    }

    fn list(&self, thread_id: Uuid) -> Result<Vec<Checkpoint>, ChatError> {
        Ok(self.lock()?.get(&thread_id).cloned().unwrap_or_default())
    }

    fn delete_thread(&self, thread_id: Uuid) -> Result<(), ChatError> {
        self.lock()?.remove(&thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(thread_id: Uuid, step: usize) -> Checkpoint {
        Checkpoint {
            thread_id,
            step,
            node: None,
            next: Some(Node::GenerateQuery),
            state: GraphState::default(),
            created_at: 0,
        }
    }

    #[test]
    fn test_latest_is_last_put() {
        let store = MemoryCheckpointer::new();
        let thread = Uuid::new_v4();
        assert!(store.latest(thread).unwrap().is_none());

        store.put(checkpoint(thread, 0)).unwrap();
        store.put(checkpoint(thread, 1)).unwrap();
        assert_eq!(store.latest(thread).unwrap().unwrap().step, 1);
        assert_eq!(store.list(thread).unwrap().len(), 2);
    }

    #[test]
    fn test_last_completed_skips_unfinished_runs() {
        let store = MemoryCheckpointer::new();
        let thread = Uuid::new_v4();
        store.put(checkpoint(thread, 0)).unwrap();
        assert!(store.last_completed(thread).unwrap().is_none());

        let mut finished = checkpoint(thread, 1);
        finished.node = Some(Node::ExecuteQuery);
        finished.next = None;
        store.put(finished).unwrap();
        store.put(checkpoint(thread, 2)).unwrap();

        assert_eq!(store.last_completed(thread).unwrap().unwrap().step, 1);
        assert_eq!(store.latest(thread).unwrap().unwrap().step, 2);
    }

    #[test]
    fn test_threads_are_isolated() {
        let store = MemoryCheckpointer::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.put(checkpoint(a, 0)).unwrap();

        assert!(store.list(b).unwrap().is_empty());
        store.delete_thread(a).unwrap();
        assert!(store.latest(a).unwrap().is_none());
    }

    #[test]
    fn test_checkpoint_serializes() {
        let value = serde_json::to_value(checkpoint(Uuid::nil(), 0)).unwrap();
        assert_eq!(value["next"], "generate_query");
        assert!(value["node"].is_null());
    }
}
