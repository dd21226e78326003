//! Downsampled view of the history for charting.
//!
//! Points are grouped into fixed-width buckets aligned to multiples of the
//! bucket width; each bucket reports the rounded mean of its totals. The
//! result is cached and rebuilt at most once per freshness window.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::history::HistoryPoint;
use crate::snapshot::MonitorStore;
use crate::telemetry;

pub const DEFAULT_BUCKET_MS: i64 = 5 * 60 * 1_000;
pub const DEFAULT_FRESHNESS_MS: i64 = 60 * 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChartBucket {
    pub time: i64,
    pub total: u64,
}

/// A built chart together with the epoch milliseconds it was built at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartView {
    pub updated: i64,
    pub data: Arc<[ChartBucket]>,
}

pub fn build_chart(points: &[HistoryPoint], bucket_ms: i64) -> Vec<ChartBucket> {
    let bucket_ms = bucket_ms.max(1);
    let mut buckets: BTreeMap<i64, (u64, u64)> = BTreeMap::new();

    for point in points {
        let start = point.time.div_euclid(bucket_ms) * bucket_ms;
        let (sum, count) = buckets.entry(start).or_default();
        *sum += point.total;
        *count += 1;
    }

    buckets
        .into_iter()
        .map(|(time, (sum, count))| ChartBucket {
            time,
            total: rounded_mean(sum, count),
        })
        .collect()
}

// Half rounds up, like Math.round on non-negative values.
fn rounded_mean(sum: u64, count: u64) -> u64 {
    (sum + count / 2) / count
}

#[derive(Debug)]
pub struct ChartCache {
    bucket_ms: i64,
    freshness_ms: i64,
    cached: RwLock<Option<ChartView>>,
}

impl ChartCache {
    pub fn new(bucket_ms: i64, freshness_ms: i64) -> Self {
        Self {
            bucket_ms,
            freshness_ms,
            cached: RwLock::new(None),
        }
    }

    /// A view stamped later than `now` means the clock stepped back; rebuild.
    fn fresh_at(&self, view: &ChartView, now: i64) -> bool {
        now >= view.updated && now - view.updated <= self.freshness_ms
    }

    /// Returns the cached chart, rebuilding it from `store` when it is older
    /// than the freshness window.
    pub async fn get_or_refresh(&self, now: i64, store: &MonitorStore) -> ChartView {
        if let Some(view) = self
            .cached
            .read()
            .await
            .as_ref()
            .filter(|view| self.fresh_at(view, now))
        {
            return view.clone();
        }

        let history = store.history().await;
        let data: Arc<[ChartBucket]> = build_chart(&history, self.bucket_ms).into();

        let mut cached = self.cached.write().await;
        // Another reader may have rebuilt while this one was aggregating.
        if let Some(view) = cached.as_ref().filter(|view| self.fresh_at(view, now)) {
            return view.clone();
        }

        let view = ChartView { updated: now, data };
        *cached = Some(view.clone());
        telemetry::increment_chart_rebuilds();
        view
    }
}

impl Default for ChartCache {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_MS, DEFAULT_FRESHNESS_MS)
    }
}
