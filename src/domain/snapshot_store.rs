//! SnapshotStore — latest process snapshot per machine.
//!
//! Each message from a machine replaces that machine's previous snapshot
//! wholesale (last write wins). Machines are never evicted: one that stops
//! reporting keeps its final snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::record::ProcessRecord;

/// The records from one machine's most recent message.
pub type MachineSnapshot = Arc<Vec<ProcessRecord>>;

#[derive(Default)]
pub struct SnapshotStore {
    machines: RwLock<HashMap<String, MachineSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot for `machine`.
    pub async fn put(&self, machine: &str, records: Vec<ProcessRecord>) {
        let count = records.len();
        let previous = self
            .machines
            .write()
            .await
            .insert(machine.to_string(), Arc::new(records));
        debug!(
            machine,
            records = count,
            replaced = previous.is_some(),
            "stored machine snapshot"
        );
    }

    /// Shallow point-in-time copy of every machine's snapshot.
    ///
    /// The record lists are shared, so callers can iterate without holding
    /// the store lock.
    pub async fn snapshot_all(&self) -> HashMap<String, MachineSnapshot> {
        self.machines.read().await.clone()
    }

    pub async fn machine_count(&self) -> usize {
        self.machines.read().await.len()
    }

    pub async fn record_count(&self) -> usize {
        self.machines.read().await.values().map(|r| r.len()).sum()
    }

    /// Known machines with their record counts, sorted by name.
    pub async fn machines(&self) -> Vec<(String, usize)> {
        let mut machines: Vec<_> = self
            .machines
            .read()
            .await
            .iter()
            .map(|(name, records)| (name.clone(), records.len()))
            .collect();
        machines.sort();
        machines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::tests::record;

    #[tokio::test]
    async fn machines_are_independent() {
        let store = SnapshotStore::new();
        store.put("m1", vec![record("a", 1.0)]).await;
        store.put("m2", vec![record("b", 2.0), record("c", 3.0)]).await;

        store.put("m1", vec![record("z", 9.0)]).await;

        let all = store.snapshot_all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all["m2"].len(), 2);
        assert_eq!(all["m2"][0].node_name, "b");
        assert_eq!(all["m1"][0].node_name, "z");
    }

    #[tokio::test]
    async fn last_write_wins() {
        let store = SnapshotStore::new();
        store.put("m", vec![record("a", 1.0), record("b", 1.0)]).await;
        store.put("m", vec![record("c", 1.0)]).await;

        let all = store.snapshot_all().await;
        let names: Vec<_> = all["m"].iter().map(|r| r.node_name.as_str()).collect();
        assert_eq!(names, vec!["c"]);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn snapshot_is_not_affected_by_later_puts() {
        let store = SnapshotStore::new();
        store.put("m", vec![record("a", 1.0)]).await;
        let before = store.snapshot_all().await;

        store.put("m", vec![record("b", 1.0)]).await;

        assert_eq!(before["m"][0].node_name, "a");
    }

    #[tokio::test]
    async fn lists_machines_sorted() {
        let store = SnapshotStore::new();
        assert_eq!(store.machine_count().await, 0);
        store.put("zeta", vec![]).await;
        store.put("alpha", vec![record("a", 1.0)]).await;

        assert_eq!(
            store.machines().await,
            vec![("alpha".to_string(), 1), ("zeta".to_string(), 0)]
        );
    }
}
