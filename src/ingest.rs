//! Ingestion adapter — decodes per-machine messages into the snapshot store.
//!
//! A message is `{key: <machine>, value: <JSON list of process records>}`.
//! Decoding happens at submission so a malformed payload is rejected before
//! it is queued; queued snapshots are written by a single background task.
//! Submission never blocks: a full queue drops the message.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::record::ProcessRecord;
use crate::domain::snapshot_store::SnapshotStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMessage {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message has an empty machine key")]
    EmptyKey,
    #[error("malformed payload from machine '{machine}': {source}")]
    Payload {
        machine: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("ingestion queue is full, dropped snapshot from '{0}'")]
    QueueFull(String),
    #[error("ingestion has shut down")]
    Closed,
}

/// Decode a message into its machine name and records.
pub fn decode(message: &IngestMessage) -> Result<(String, Vec<ProcessRecord>), DecodeError> {
    if message.key.trim().is_empty() {
        return Err(DecodeError::EmptyKey);
    }
    let records =
        ProcessRecord::decode_list(&message.value).map_err(|source| DecodeError::Payload {
            machine: message.key.clone(),
            source,
        })?;
    Ok((message.key.clone(), records))
}

struct Snapshot {
    machine: String,
    records: Vec<ProcessRecord>,
}

/// Cloneable, non-blocking submission side of the ingestion queue.
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<Snapshot>,
}

impl IngestHandle {
    /// Decode and enqueue a message. Returns the number of records accepted.
    pub fn submit(&self, message: &IngestMessage) -> Result<usize, IngestError> {
        let (machine, records) = decode(message).inspect_err(|e| {
            warn!(error = %e, "dropping malformed ingestion message");
        })?;
        let count = records.len();

        self.tx
            .try_send(Snapshot { machine, records })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(snapshot) => {
                    warn!(machine = %snapshot.machine, "ingestion queue full, dropping snapshot");
                    IngestError::QueueFull(snapshot.machine)
                }
                mpsc::error::TrySendError::Closed(_) => IngestError::Closed,
            })?;
        Ok(count)
    }
}

/// Start the writer task. It exits once every handle has been dropped.
pub fn spawn(store: Arc<SnapshotStore>, capacity: usize) -> (IngestHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Snapshot>(capacity.max(1));

    let task = tokio::spawn(async move {
        info!(capacity, "ingestion started");
        while let Some(snapshot) = rx.recv().await {
            debug!(
                machine = %snapshot.machine,
                records = snapshot.records.len(),
                "ingesting snapshot"
            );
            store.put(&snapshot.machine, snapshot.records).await;
        }
        info!("ingestion stopped");
    });

    (IngestHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(key: &str, value: &str) -> IngestMessage {
        IngestMessage {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    const ONE_RECORD: &str = r#"[{
        "node_name": "/talker",
        "pid": 7,
        "get_cpu_percent": 3.0,
        "get_memory_percent": 1.0,
        "get_num_threads": 2,
        "cmdline": ["talker"],
        "memory_info": [100, 200]
    }]"#;

    #[test]
    fn decodes_valid_message() {
        let (machine, records) = decode(&message("robot-1", ONE_RECORD)).unwrap();
        assert_eq!(machine, "robot-1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pid, "7");
    }

    #[test]
    fn rejects_empty_key() {
        assert!(matches!(
            decode(&message("  ", ONE_RECORD)),
            Err(DecodeError::EmptyKey)
        ));
    }

    #[test]
    fn rejects_malformed_payload() {
        let err = decode(&message("robot-1", "{not json")).unwrap_err();
        assert!(matches!(err, DecodeError::Payload { ref machine, .. } if machine == "robot-1"));
    }

    #[tokio::test]
    async fn submitted_snapshots_reach_the_store() {
        let store = Arc::new(SnapshotStore::new());
        let (handle, task) = spawn(store.clone(), 8);

        assert_eq!(handle.submit(&message("robot-1", ONE_RECORD)).unwrap(), 1);
        drop(handle);
        task.await.unwrap();

        let all = store.snapshot_all().await;
        assert_eq!(all["robot-1"][0].node_name, "/talker");
    }

    #[tokio::test]
    async fn malformed_message_leaves_store_untouched() {
        let store = Arc::new(SnapshotStore::new());
        let (handle, task) = spawn(store.clone(), 8);
        handle.submit(&message("robot-1", ONE_RECORD)).unwrap();

        let err = handle.submit(&message("robot-1", "[{}]")).unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
        drop(handle);
        task.await.unwrap();

        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = IngestHandle { tx };

        handle.submit(&message("a", "[]")).unwrap();
        let err = handle.submit(&message("b", "[]")).unwrap_err();
        assert!(matches!(err, IngestError::QueueFull(ref m) if m == "b"));
    }
}
