use std::sync::Arc;

use log::{info, warn};

use crate::app;
use crate::chart::ChartCache;
use crate::config::MonitorConfig;
use crate::persist::StateFile;
use crate::probe::StatusProber;
use crate::resolve::HickorySrvResolver;
use crate::sampler::{self, Sampler};
use crate::server;
use crate::snapshot::MonitorStore;
use crate::state::{AppState, now_millis};
use crate::telemetry;

pub async fn run() -> anyhow::Result<()> {
    let cfg = load_config()?;
    telemetry::init_logger(cfg.log_level);
    info!(
        "online monitor config: bind_addr={}, servers={}, sample_interval_sec={}, retention_sec={}, chart_bucket_sec={}, chart_cache_sec={}, probe_timeout_ms={}, srv_lookup={}, state_file={}",
        cfg.bind_addr(),
        cfg.servers,
        cfg.sample_interval_sec,
        cfg.retention_sec,
        cfg.chart_bucket_sec,
        cfg.chart_cache_sec,
        cfg.probe_timeout_ms,
        cfg.srv_lookup,
        cfg.state_file
    );

    let metrics = telemetry::install_metrics_recorder()?;
    telemetry::emit_startup_metrics();

    let servers = cfg.monitored_servers()?;
    let server_ids: Vec<String> = servers.iter().map(|server| server.id.clone()).collect();

    let state_file = StateFile::new(&cfg.state_file);
    let saved = state_file.load().await;
    let store = MonitorStore::restore(&server_ids[..], saved, now_millis(), cfg.retention_ms());

    let sampler = Arc::new(Sampler::new(
        servers,
        Arc::new(status_prober(&cfg)),
        store.clone(),
        state_file,
        cfg.retention_ms(),
    ));
    let sampler_task = sampler::spawn_sampler(sampler, cfg.sample_interval());

    let charts = ChartCache::new(cfg.chart_bucket_ms(), cfg.chart_cache_ms());
    let state = AppState::new(metrics, store, charts, cfg.stale_after_sec);
    let app = app::router(state);

    let result = server::serve(&cfg.bind_addr(), app).await;
    sampler_task.abort();
    telemetry::emit_shutdown_metrics();
    result
}

fn status_prober(cfg: &MonitorConfig) -> StatusProber {
    let prober = StatusProber::new(cfg.probe_timeout());
    if !cfg.srv_lookup {
        return prober;
    }
    match HickorySrvResolver::from_system_conf() {
        Ok(resolver) => prober.with_srv_resolver(Arc::new(resolver)),
        Err(err) => {
            warn!("SRV lookup disabled, resolver setup failed: {err}");
            prober
        }
    }
}

fn load_config() -> anyhow::Result<MonitorConfig> {
    dotenv::dotenv()
        .map_err(|err| {
            eprintln!(".env file error: {err}");
            err
        })
        .ok();

    MonitorConfig::fetch()
}
