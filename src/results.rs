use std::{
    collections::BTreeMap,
    fmt,
    net::IpAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::{Mutex, RwLock};

use crate::error::{Error, Result};

/// Identity of one probe task, issued by a [`TaskIdGenerator`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out task ids in creation order.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    next: AtomicU64,
}

impl TaskIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> TaskId {
        TaskId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Counters {
    pub sent: u64,
    pub received: u64,
    pub lost: u64,
}

/// Everything measured for one destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResult {
    pub address: IpAddr,
    pub counters: Counters,
    /// Round trip times of successful probes in milliseconds, in probe order.
    pub samples: Vec<u64>,
}

impl ProbeResult {
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            counters: Counters::default(),
            samples: Vec::new(),
        }
    }

    fn increment_sent(&mut self) {
        self.counters.sent += 1;
    }

    fn record_success(&mut self, rtt_ms: u64) {
        self.increment_sent();
        self.counters.received += 1;
        self.samples.push(rtt_ms);
    }

    fn record_loss(&mut self) {
        self.increment_sent();
        self.counters.lost += 1;
    }
}

pub type Snapshot = Vec<(TaskId, ProbeResult)>;

/// Results of every admitted probe task, keyed by [`TaskId`].
///
/// Each entry sits behind its own lock so tasks updating different destinations never
/// contend; the table lock is only taken exclusively to insert. Entries are never removed.
#[derive(Debug, Default)]
pub struct ResultTable {
    entries: RwLock<BTreeMap<TaskId, Arc<Mutex<ProbeResult>>>>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a zeroed entry for `id`.
    ///
    /// # Errors
    /// [`Error::DuplicateTask`] if `id` already has an entry.
    pub async fn insert(&self, id: TaskId, address: IpAddr) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&id) {
            return Err(Error::DuplicateTask(id));
        }
        entries.insert(id, Arc::new(Mutex::new(ProbeResult::new(address))));
        Ok(())
    }

    /// Counts one sent probe that was answered after `rtt_ms` milliseconds.
    pub async fn record_success(&self, id: TaskId, rtt_ms: u64) -> Result<()> {
        self.entry(id).await?.lock().await.record_success(rtt_ms);
        Ok(())
    }

    /// Counts one sent probe that was not answered.
    pub async fn record_loss(&self, id: TaskId) -> Result<()> {
        self.entry(id).await?.lock().await.record_loss();
        Ok(())
    }

    pub async fn get(&self, id: TaskId) -> Result<ProbeResult> {
        Ok(self.entry(id).await?.lock().await.clone())
    }

    /// Copies every entry, ordered by task id.
    ///
    /// The table stays read-locked for the whole copy, so no entry is added halfway
    /// through; every copied entry is internally consistent.
    pub async fn snapshot(&self) -> Snapshot {
        let entries = self.entries.read().await;
        let mut snapshot = Vec::with_capacity(entries.len());
        for (id, entry) in entries.iter() {
            snapshot.push((*id, entry.lock().await.clone()));
        }
        snapshot
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn entry(&self, id: TaskId) -> Result<Arc<Mutex<ProbeResult>>> {
        self.entries
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownTask(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn test_insert_creates_zeroed_entry() {
        let table = ResultTable::new();
        let id = TaskId::new(0);
        table.insert(id, ADDRESS).await.unwrap();

        let result = table.get(id).await.unwrap();
        assert_eq!(result.address, ADDRESS);
        assert_eq!(result.counters, Counters::default());
        assert!(result.samples.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let table = ResultTable::new();
        let id = TaskId::new(3);
        table.insert(id, ADDRESS).await.unwrap();
        assert!(matches!(
            table.insert(id, ADDRESS).await,
            Err(Error::DuplicateTask(dup)) if dup == id
        ));
    }

    #[tokio::test]
    async fn test_updates_keep_counters_balanced() {
        let table = ResultTable::new();
        let id = TaskId::new(0);
        table.insert(id, ADDRESS).await.unwrap();

        table.record_success(id, 4).await.unwrap();
        table.record_loss(id).await.unwrap();
        table.record_success(id, 2).await.unwrap();

        let result = table.get(id).await.unwrap();
        assert_eq!(
            result.counters,
            Counters {
                sent: 3,
                received: 2,
                lost: 1
            }
        );
        assert_eq!(result.samples, vec![4, 2]);
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let table = ResultTable::new();
        assert!(matches!(
            table.record_loss(TaskId::new(9)).await,
            Err(Error::UnknownTask(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_stay_isolated() {
        let table = Arc::new(ResultTable::new());
        let ids = TaskIdGenerator::new();
        let tasks: Vec<_> = (0..8).map(|_| ids.next_id()).collect();
        for id in &tasks {
            table.insert(*id, ADDRESS).await.unwrap();
        }

        let updates = tasks.iter().map(|id| {
            let table = Arc::clone(&table);
            let id = *id;
            tokio::spawn(async move {
                for n in 0..100 {
                    if n % 4 == 0 {
                        table.record_loss(id).await.unwrap();
                    } else {
                        table.record_success(id, n).await.unwrap();
                    }
                }
            })
        });
        futures::future::try_join_all(updates).await.unwrap();

        let snapshot = table.snapshot().await;
        assert_eq!(snapshot.len(), 8);
        for (_, result) in snapshot {
            assert_eq!(result.counters.sent, 100);
            assert_eq!(result.counters.lost, 25);
            assert_eq!(result.counters.received, 75);
            assert_eq!(result.samples.len(), 75);
        }
    }

    #[tokio::test]
    async fn test_snapshot_is_read_only() {
        let table = ResultTable::new();
        let id = TaskId::new(0);
        table.insert(id, ADDRESS).await.unwrap();
        table.record_success(id, 1).await.unwrap();

        let first = table.snapshot().await;
        let second = table.snapshot().await;
        assert_eq!(first, second);
        assert_eq!(first[0].1.counters.sent, 1);
    }

    #[test]
    fn test_ids_are_sequential() {
        let ids = TaskIdGenerator::new();
        assert_eq!(ids.next_id(), TaskId::new(0));
        assert_eq!(ids.next_id(), TaskId::new(1));
        assert_eq!(TaskId::new(1).to_string(), "#1");
    }
}
