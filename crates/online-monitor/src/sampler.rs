use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::config::MonitoredServer;
use crate::persist::StateFile;
use crate::probe::Prober;
use crate::snapshot::{MonitorStore, TickRecord};
use crate::telemetry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickRecord),
    /// Another tick was still running; nothing was probed or recorded.
    Skipped,
}

pub struct Sampler {
    servers: Vec<MonitoredServer>,
    prober: Arc<dyn Prober>,
    store: MonitorStore,
    state_file: StateFile,
    retention_ms: i64,
    in_flight: Mutex<()>,
}

impl Sampler {
    pub fn new(
        servers: Vec<MonitoredServer>,
        prober: Arc<dyn Prober>,
        store: MonitorStore,
        state_file: StateFile,
        retention_ms: i64,
    ) -> Self {
        Self {
            servers,
            prober,
            store,
            state_file,
            retention_ms,
            in_flight: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &MonitorStore {
        &self.store
    }

    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Utc::now().timestamp_millis()).await
    }

    /// Runs one sampling tick stamped with `now` (epoch milliseconds).
    ///
    /// At most one tick runs at a time; a tick requested while another is in
    /// flight is skipped, not queued.
    pub async fn tick_at(&self, now: i64) -> TickOutcome {
        // Held for the whole tick, released on every exit path.
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("sampling tick skipped, previous tick still running");
            telemetry::increment_ticks_skipped();
            return TickOutcome::Skipped;
        };

        let started = Instant::now();
        let readings = self.probe_all().await;
        let record = self
            .store
            .record_tick(now, readings.clone(), self.retention_ms)
            .await;

        if let Err(err) = self.state_file.save(&self.store.persisted().await).await {
            warn!("failed to persist sampler state: {err}");
            telemetry::increment_persist_failures();
        }

        telemetry::record_tick(started.elapsed(), &readings, &record);
        debug!(
            "sampling tick done: total={}, history_len={}",
            record.total, record.history_len
        );
        TickOutcome::Completed(record)
    }

    /// Probes every server concurrently, keeping configuration order.
    async fn probe_all(&self) -> Vec<(String, Option<u32>)> {
        let probes = self.servers.iter().map(|server| async move {
            let online = self.prober.probe(&server.address).await;
            if online.is_none() {
                debug!("no reading from {} ({})", server.id, server.address);
            }
            (server.id.clone(), online)
        });
        join_all(probes).await
    }
}

/// Samples once right away, then on every interval. Each fire runs in its own
/// task so a slow tick makes the next fire a skip rather than a delay.
pub fn spawn_sampler(sampler: Arc<Sampler>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run_sampler_loop(sampler, interval).await;
    })
}

async fn run_sampler_loop(sampler: Arc<Sampler>, interval: Duration) {
    let interval = interval.max(Duration::from_secs(1));
    info!("starting sampler with interval {}s", interval.as_secs());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // The first tick completes immediately.
        ticker.tick().await;
        let sampler = Arc::clone(&sampler);
        tokio::spawn(async move {
            sampler.tick().await;
        });
    }
}
