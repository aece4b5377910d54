//! Checkpoint store port and the in-memory implementation.
//!
//! The store is keyed by thread id and supports exactly `put`/`get`/`delete`.
//! The engine persists a checkpoint after every applied node update and --
//! with the pending interrupt attached -- before suspending; `resume`
//! consults it and continues without replay. A durable SQLite implementation
//! lives in `planweave-infra`.

use std::future::Future;
use std::pin::Pin;

use dashmap::DashMap;

use planweave_types::checkpoint::{Checkpoint, CheckpointError};

// ---------------------------------------------------------------------------
// CheckpointStore port
// ---------------------------------------------------------------------------

/// Storage port for run checkpoints.
pub trait CheckpointStore: Send + Sync {
    fn put(
        &self,
        checkpoint: &Checkpoint,
    ) -> impl Future<Output = Result<(), CheckpointError>> + Send;

    fn get(
        &self,
        thread_id: &str,
    ) -> impl Future<Output = Result<Option<Checkpoint>, CheckpointError>> + Send;

    fn delete(
        &self,
        thread_id: &str,
    ) -> impl Future<Output = Result<(), CheckpointError>> + Send;
}

/// Object-safe version of [`CheckpointStore`] with boxed futures.
pub trait CheckpointStoreDyn: Send + Sync {
    fn put_boxed<'a>(
        &'a self,
        checkpoint: &'a Checkpoint,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + 'a>>;

    fn get_boxed<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Checkpoint>, CheckpointError>> + Send + 'a>>;

    fn delete_boxed<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + 'a>>;
}

impl<T: CheckpointStore> CheckpointStoreDyn for T {
    fn put_boxed<'a>(
        &'a self,
        checkpoint: &'a Checkpoint,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + 'a>> {
        Box::pin(self.put(checkpoint))
    }

    fn get_boxed<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Checkpoint>, CheckpointError>> + Send + 'a>>
    {
        Box::pin(self.get(thread_id))
    }

    fn delete_boxed<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + 'a>> {
        Box::pin(self.delete(thread_id))
    }
}

/// Type-erased checkpoint store for runtime backend selection.
pub struct BoxCheckpointStore {
    inner: Box<dyn CheckpointStoreDyn>,
}

impl BoxCheckpointStore {
    pub fn new<T: CheckpointStore + 'static>(store: T) -> Self {
        Self {
            inner: Box::new(store),
        }
    }

    pub async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.inner.put_boxed(checkpoint).await
    }

    pub async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        self.inner.get_boxed(thread_id).await
    }

    pub async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        self.inner.delete_boxed(thread_id).await
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Concurrent in-memory checkpoint store. The default for tests and
/// single-process runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: DashMap<String, Checkpoint>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.entries
            .insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.entries.get(thread_id).map(|entry| entry.clone()))
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        self.entries.remove(thread_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn checkpoint(thread_id: &str) -> Checkpoint {
        Checkpoint {
            thread_id: thread_id.to_string(),
            state: json!({"goal": "q"}),
            pending_interrupt: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryCheckpointStore::new();
        store.put(&checkpoint("t1")).await.unwrap();

        let loaded = store.get("t1").await.unwrap().unwrap();
        assert_eq!(loaded.state, json!({"goal": "q"}));

        store.delete("t1").await.unwrap();
        assert!(store.get("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_by_thread_id() {
        let store = MemoryCheckpointStore::new();
        store.put(&checkpoint("t1")).await.unwrap();

        let mut second = checkpoint("t1");
        second.state = json!({"goal": "updated"});
        store.put(&second).await.unwrap();

        let loaded = store.get("t1").await.unwrap().unwrap();
        assert_eq!(loaded.state, json!({"goal": "updated"}));
    }

    #[tokio::test]
    async fn test_boxed_store_delegates() {
        let store = BoxCheckpointStore::new(MemoryCheckpointStore::new());
        store.put(&checkpoint("t2")).await.unwrap();
        assert!(store.get("t2").await.unwrap().is_some());
        store.delete("t2").await.unwrap();
        assert!(store.get("t2").await.unwrap().is_none());
    }
}
