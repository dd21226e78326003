use std::time::Duration;

use anyhow::Context;
use env_logger::Env;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::snapshot::TickRecord;

pub fn init_logger(level: log::Level) {
    env_logger::Builder::from_env(Env::default().default_filter_or(level.as_str())).init();
}

pub fn install_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .add_global_label("app", "online-monitor")
        .install_recorder()
        .context("Failed to install metrics recorder")
}

pub fn emit_startup_metrics() {
    metrics::gauge!("online_monitor_up").set(1.0);
    metrics::counter!("online_monitor_start_total").increment(1);
}

pub fn emit_shutdown_metrics() {
    metrics::gauge!("online_monitor_up").set(0.0);
}

pub fn record_tick(duration: Duration, readings: &[(String, Option<u32>)], record: &TickRecord) {
    metrics::histogram!("online_monitor_tick_duration_seconds").record(duration.as_secs_f64());
    metrics::counter!("online_monitor_ticks_total").increment(1);
    metrics::gauge!("online_monitor_players_total").set(record.total as f64);
    metrics::gauge!("online_monitor_history_points").set(record.history_len as f64);

    for (server, raw) in readings {
        if raw.is_none() {
            metrics::counter!("online_monitor_probe_failures_total", "server" => server.clone())
                .increment(1);
        }
    }
    for (server, online) in &record.written {
        metrics::gauge!("online_monitor_players", "server" => server.clone()).set(*online as f64);
    }
}

pub fn increment_ticks_skipped() {
    metrics::counter!("online_monitor_ticks_skipped_total").increment(1);
}

pub fn increment_chart_rebuilds() {
    metrics::counter!("online_monitor_chart_rebuilds_total").increment(1);
}

pub fn increment_persist_failures() {
    metrics::counter!("online_monitor_persist_failures_total").increment(1);
}
