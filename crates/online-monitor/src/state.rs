use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::chart::ChartCache;
use crate::snapshot::MonitorStore;

#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub is_ready: bool,
    pub snapshot_age_seconds: Option<u64>,
}

/// Handle shared by every HTTP handler. Reads never wait on the sampler.
#[derive(Clone)]
pub struct AppState {
    pub metrics: PrometheusHandle,
    pub started_at: Instant,
    pub store: MonitorStore,
    pub charts: Arc<ChartCache>,
    pub stale_after_sec: u64,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        store: MonitorStore,
        charts: ChartCache,
        stale_after_sec: u64,
    ) -> Self {
        Self {
            metrics,
            started_at: Instant::now(),
            store,
            charts: Arc::new(charts),
            stale_after_sec,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub async fn readiness(&self) -> Readiness {
        let last_updated = self.store.last_updated().await;
        let snapshot_age_seconds = snapshot_age_seconds(last_updated, now_millis());
        Readiness {
            is_ready: is_snapshot_fresh(snapshot_age_seconds, self.stale_after_sec),
            snapshot_age_seconds,
        }
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn snapshot_age_seconds(last_updated: Option<i64>, now: i64) -> Option<u64> {
    last_updated.map(|updated| u64::try_from(now.saturating_sub(updated) / 1_000).unwrap_or(0))
}

fn is_snapshot_fresh(snapshot_age_seconds: Option<u64>, stale_after_sec: u64) -> bool {
    snapshot_age_seconds
        .map(|age| age <= stale_after_sec)
        .unwrap_or(false)
}
