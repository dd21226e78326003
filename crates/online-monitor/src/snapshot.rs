use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::fallback::LastKnownGood;
use crate::history::{History, HistoryPoint};
use crate::persist::PersistedState;

/// Latest committed player counts. `updated` is epoch milliseconds, 0 before
/// the first tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub servers: BTreeMap<String, u32>,
    pub total: u64,
    pub updated: i64,
}

/// What one tick committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickRecord {
    pub total: u64,
    pub updated: i64,
    pub written: BTreeMap<String, u32>,
    pub history_len: usize,
}

#[derive(Debug, Default)]
struct MonitorData {
    snapshot: Snapshot,
    history: History,
    last_known_good: LastKnownGood,
}

/// Shared handle to the in-memory state. Only the sampler writes.
#[derive(Clone, Debug, Default)]
pub struct MonitorStore {
    inner: Arc<RwLock<MonitorData>>,
}

impl MonitorStore {
    pub fn new<S: AsRef<str>>(server_ids: &[S]) -> Self {
        Self::from_parts(server_ids, History::new(), LastKnownGood::new(ids(server_ids)))
    }

    /// Seeds the store from a saved state. History older than the retention
    /// window is dropped right away.
    pub fn restore<S: AsRef<str>>(
        server_ids: &[S],
        saved: PersistedState,
        now: i64,
        retention_ms: i64,
    ) -> Self {
        let mut history = History::from_points(saved.history);
        history.retain_since(now.saturating_sub(retention_ms));
        let last_known_good = LastKnownGood::restore(ids(server_ids), saved.last_valid_online);
        Self::from_parts(server_ids, history, last_known_good)
    }

    fn from_parts<S: AsRef<str>>(
        server_ids: &[S],
        history: History,
        last_known_good: LastKnownGood,
    ) -> Self {
        let snapshot = Snapshot {
            servers: ids(server_ids).map(|id| (id, 0)).collect(),
            ..Snapshot::default()
        };
        Self {
            inner: Arc::new(RwLock::new(MonitorData {
                snapshot,
                history,
                last_known_good,
            })),
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.read().await.snapshot.clone()
    }

    pub async fn history(&self) -> Vec<HistoryPoint> {
        self.inner.read().await.history.points().to_vec()
    }

    pub async fn last_known_good(&self) -> LastKnownGood {
        self.inner.read().await.last_known_good.clone()
    }

    /// Epoch milliseconds of the last committed tick, if any.
    pub async fn last_updated(&self) -> Option<i64> {
        let updated = self.inner.read().await.snapshot.updated;
        (updated > 0).then_some(updated)
    }

    pub async fn persisted(&self) -> PersistedState {
        let data = self.inner.read().await;
        PersistedState {
            history: data.history.points().to_vec(),
            last_valid_online: data.last_known_good.to_map(),
        }
    }

    /// Applies one tick's raw readings: smooths each, writes usable values into
    /// the snapshot, appends the total to history and prunes expired points.
    ///
    /// Servers without a reading keep their previous snapshot value and are
    /// not part of the total.
    pub async fn record_tick(
        &self,
        now: i64,
        readings: Vec<(String, Option<u32>)>,
        retention_ms: i64,
    ) -> TickRecord {
        let mut data = self.inner.write().await;
        let MonitorData {
            snapshot,
            history,
            last_known_good,
        } = &mut *data;

        let mut written = BTreeMap::new();
        for (server_id, raw) in readings {
            if let Some(online) = last_known_good.smooth(&server_id, raw) {
                snapshot.servers.insert(server_id.clone(), online);
                written.insert(server_id, online);
            }
        }

        let total: u64 = written.values().map(|&online| u64::from(online)).sum();
        snapshot.total = total;
        snapshot.updated = now;

        history.push(HistoryPoint { time: now, total });
        history.retain_since(now.saturating_sub(retention_ms));

        TickRecord {
            total,
            updated: now,
            written,
            history_len: history.len(),
        }
    }
}

fn ids<S: AsRef<str>>(server_ids: &[S]) -> impl Iterator<Item = String> + '_ {
    server_ids.iter().map(|id| id.as_ref().to_owned())
}

#[cfg(test)]
mod tests {
    use super::MonitorStore;
    use crate::history::HistoryPoint;
    use crate::persist::PersistedState;
    use std::collections::BTreeMap;

    const IDS: [&str; 3] = ["lobby", "royale", "uhc"];
    const HOUR_MS: i64 = 3_600_000;

    fn readings(values: [Option<u32>; 3]) -> Vec<(String, Option<u32>)> {
        IDS.iter()
            .map(|id| id.to_string())
            .zip(values)
            .collect()
    }

    #[tokio::test]
    async fn starts_with_zeroed_snapshot() {
        let store = MonitorStore::new(&IDS);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.total, 0);
        assert_eq!(snapshot.updated, 0);
        assert_eq!(snapshot.servers.len(), 3);
        assert!(snapshot.servers.values().all(|&v| v == 0));
        assert!(store.last_updated().await.is_none());
        assert!(store.history().await.is_empty());
    }

    #[tokio::test]
    async fn total_equals_values_written_this_tick() {
        let store = MonitorStore::new(&IDS);
        store
            .record_tick(1_000, readings([Some(5), Some(7), Some(3)]), HOUR_MS)
            .await;

        let record = store
            .record_tick(2_000, readings([Some(6), None, Some(0)]), HOUR_MS)
            .await;

        let snapshot = store.snapshot().await;
        // royale failed: keeps its stale 7 but is not counted.
        assert_eq!(snapshot.servers["royale"], 7);
        // uhc read zero: masked with last known good.
        assert_eq!(snapshot.servers["uhc"], 3);
        assert_eq!(record.total, 9);
        assert_eq!(snapshot.total, record.written.values().map(|&v| u64::from(v)).sum::<u64>());
        assert_eq!(snapshot.updated, 2_000);
        assert_eq!(store.last_updated().await, Some(2_000));
    }

    #[tokio::test]
    async fn prunes_history_with_inclusive_cutoff() {
        let store = MonitorStore::new(&IDS);
        for time in [0, HOUR_MS, 2 * HOUR_MS] {
            store
                .record_tick(time, readings([Some(1), None, None]), HOUR_MS)
                .await;
        }

        let times: Vec<_> = store.history().await.iter().map(|p| p.time).collect();
        assert_eq!(times, [HOUR_MS, 2 * HOUR_MS]);
    }

    #[tokio::test]
    async fn restore_prunes_expired_history_and_keeps_last_known_good() {
        let saved = PersistedState {
            history: vec![
                HistoryPoint { time: 5 * HOUR_MS, total: 4 },
                HistoryPoint { time: HOUR_MS, total: 1 },
                HistoryPoint { time: 4 * HOUR_MS, total: 3 },
            ],
            last_valid_online: BTreeMap::from([("lobby".to_owned(), Some(11))]),
        };

        let store = MonitorStore::restore(&IDS, saved, 6 * HOUR_MS, 2 * HOUR_MS);
        let times: Vec<_> = store.history().await.iter().map(|p| p.time).collect();
        assert_eq!(times, [4 * HOUR_MS, 5 * HOUR_MS]);

        let lkg = store.last_known_good().await;
        assert_eq!(lkg.get("lobby"), Some(11));
        assert_eq!(lkg.get("royale"), None);

        // A zero after restart is masked by the restored value.
        store
            .record_tick(6 * HOUR_MS, readings([Some(0), None, None]), 2 * HOUR_MS)
            .await;
        assert_eq!(store.snapshot().await.servers["lobby"], 11);
    }

    #[tokio::test]
    async fn restored_future_point_keeps_history_sorted() {
        let saved = PersistedState {
            history: vec![HistoryPoint { time: 10_000, total: 8 }],
            last_valid_online: BTreeMap::new(),
        };
        let store = MonitorStore::restore(&IDS, saved, 9_000, HOUR_MS);

        let record = store
            .record_tick(9_500, readings([Some(2), None, None]), HOUR_MS)
            .await;
        assert_eq!(record.history_len, 2);

        let times: Vec<_> = store.history().await.iter().map(|p| p.time).collect();
        assert_eq!(times, [9_500, 10_000]);

        // Pruning still works on the reordered history.
        store
            .record_tick(9_500 + HOUR_MS, readings([Some(2), None, None]), HOUR_MS)
            .await;
        let times: Vec<_> = store.history().await.iter().map(|p| p.time).collect();
        assert_eq!(times, [9_500, 10_000, 9_500 + HOUR_MS]);
    }

    #[tokio::test]
    async fn persisted_view_mirrors_history_and_last_known_good() {
        let store = MonitorStore::new(&IDS);
        store
            .record_tick(10, readings([Some(2), Some(0), None]), HOUR_MS)
            .await;

        let persisted = store.persisted().await;
        assert_eq!(persisted.history, [HistoryPoint { time: 10, total: 2 }]);
        assert_eq!(persisted.last_valid_online["lobby"], Some(2));
        assert_eq!(persisted.last_valid_online["royale"], None);
        assert_eq!(persisted.last_valid_online["uhc"], None);
    }
}
