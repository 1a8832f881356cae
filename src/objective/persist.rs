//! Progress persistence
//!
//! The event path never waits on storage. Mutations are queued on an
//! unbounded channel and a writer task flushes them in batches, keeping only
//! the latest operation per (player, objective).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::StoreError;
use crate::id::{ObjectId, PlayerId};

/// Stored progress of one active objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveRecord {
    pub player: PlayerId,
    pub objective: ObjectId,
    pub data: Value,
    pub started_at: DateTime<Utc>,
}

/// A queued storage mutation
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    Upsert(ObjectiveRecord),
    Delete { player: PlayerId, objective: ObjectId },
}

impl PersistOp {
    fn key(&self) -> (PlayerId, ObjectId) {
        match self {
            PersistOp::Upsert(record) => (record.player.clone(), record.objective.clone()),
            PersistOp::Delete { player, objective } => (player.clone(), objective.clone()),
        }
    }
}

/// Persistence backend for objective progress
pub trait ProgressStore: Send + Sync + 'static {
    fn load_all(&self) -> impl Future<Output = Result<Vec<ObjectiveRecord>, StoreError>> + Send;

    fn upsert(&self, record: &ObjectiveRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete(
        &self,
        player: &PlayerId,
        objective: &ObjectId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Apply a batch of operations; backends may do this atomically
    fn apply(&self, batch: &[PersistOp]) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            for op in batch {
                match op {
                    PersistOp::Upsert(record) => self.upsert(record).await?,
                    PersistOp::Delete { player, objective } => self.delete(player, objective).await?,
                }
            }
            Ok(())
        }
    }
}

/// Store that keeps records in memory only
#[derive(Default)]
pub struct MemoryProgressStore {
    records: Mutex<HashMap<(PlayerId, ObjectId), ObjectiveRecord>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player: &PlayerId, objective: &ObjectId) -> Option<ObjectiveRecord> {
        self.records
            .lock()
            .get(&(player.clone(), objective.clone()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl ProgressStore for MemoryProgressStore {
    async fn load_all(&self) -> Result<Vec<ObjectiveRecord>, StoreError> {
        let mut records: Vec<ObjectiveRecord> = self.records.lock().values().cloned().collect();
        records.sort_by(|a, b| (&a.player, &a.objective).cmp(&(&b.player, &b.objective)));
        Ok(records)
    }

    async fn upsert(&self, record: &ObjectiveRecord) -> Result<(), StoreError> {
        self.records.lock().insert(
            (record.player.clone(), record.objective.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn delete(&self, player: &PlayerId, objective: &ObjectId) -> Result<(), StoreError> {
        self.records.lock().remove(&(player.clone(), objective.clone()));
        Ok(())
    }
}

enum WriterMessage {
    Op(PersistOp),
    Flush(oneshot::Sender<()>),
}

/// Sending side of the writer task
#[derive(Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<WriterMessage>,
}

impl PersistHandle {
    /// Queue an operation without waiting
    pub fn send(&self, op: PersistOp) {
        if self.tx.send(WriterMessage::Op(op)).is_err() {
            warn!("Progress writer has stopped, dropping update");
        }
    }

    /// Wait until everything queued so far has been written
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Start the writer task. It stops once every handle is dropped, after a
/// final flush.
pub fn spawn_writer<S: ProgressStore>(
    store: Arc<S>,
    flush_every: Duration,
) -> (PersistHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_writer(store, rx, flush_every));
    (PersistHandle { tx }, task)
}

async fn run_writer<S: ProgressStore>(
    store: Arc<S>,
    mut rx: mpsc::UnboundedReceiver<WriterMessage>,
    flush_every: Duration,
) {
    let mut interval = tokio::time::interval(flush_every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut pending: HashMap<(PlayerId, ObjectId), PersistOp> = HashMap::new();

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(WriterMessage::Op(op)) => {
                    pending.insert(op.key(), op);
                }
                Some(WriterMessage::Flush(done)) => {
                    flush(store.as_ref(), &mut pending).await;
                    let _ = done.send(());
                }
                None => {
                    flush(store.as_ref(), &mut pending).await;
                    debug!("Progress writer stopped");
                    break;
                }
            },
            _ = interval.tick() => {
                flush(store.as_ref(), &mut pending).await;
            }
        }
    }
}

async fn flush<S: ProgressStore>(store: &S, pending: &mut HashMap<(PlayerId, ObjectId), PersistOp>) {
    if pending.is_empty() {
        return;
    }
    let batch: Vec<PersistOp> = pending.drain().map(|(_, op)| op).collect();
    match store.apply(&batch).await {
        Ok(()) => debug!("Saved {} progress updates", batch.len()),
        Err(e) => {
            error!("Failed to save {} progress updates: {}", batch.len(), e);
            // Retry on the next flush unless a newer update replaced them
            for op in batch {
                pending.entry(op.key()).or_insert(op);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(player: &str, objective: &str, data: Value) -> ObjectiveRecord {
        ObjectiveRecord {
            player: PlayerId::from(player),
            objective: objective.parse().unwrap(),
            data,
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_writer_keeps_latest_op() {
        let store = Arc::new(MemoryProgressStore::new());
        let (handle, task) = spawn_writer(store.clone(), Duration::from_secs(3600));

        handle.send(PersistOp::Upsert(record("alice", "town.wolves", serde_json::json!({"left": 3}))));
        handle.send(PersistOp::Upsert(record("alice", "town.wolves", serde_json::json!({"left": 2}))));
        handle.send(PersistOp::Upsert(record("bob", "town.wolves", serde_json::json!({"left": 3}))));
        handle.send(PersistOp::Delete {
            player: PlayerId::from("bob"),
            objective: "town.wolves".parse().unwrap(),
        });
        handle.flush().await;

        assert_eq!(store.len(), 1);
        let alice = store
            .get(&PlayerId::from("alice"), &"town.wolves".parse().unwrap())
            .unwrap();
        assert_eq!(alice.data, serde_json::json!({"left": 2}));

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_flushes_on_shutdown() {
        let store = Arc::new(MemoryProgressStore::new());
        let (handle, task) = spawn_writer(store.clone(), Duration::from_secs(3600));
        handle.send(PersistOp::Upsert(record("alice", "town.arrow", Value::Null)));
        drop(handle);
        task.await.unwrap();

        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_before_abort_keeps_queued_ops() {
        let store = Arc::new(MemoryProgressStore::new());
        let (handle, task) = spawn_writer(store.clone(), Duration::from_secs(3600));
        // Still held elsewhere, so the writer cannot see every handle drop
        let other = handle.clone();
        other.send(PersistOp::Upsert(record("alice", "town.wolves", serde_json::json!({"left": 1}))));

        handle.flush().await;
        task.abort();

        assert_eq!(store.len(), 1);
        drop(other);
    }
}
