use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, bail};
use envconfig::Envconfig;

use crate::probe::{DEFAULT_SERVER_PORT, ServerAddress};

pub const DEFAULT_SERVERS: &str =
    "lobby=mc.teslacraft.org,royale=hub.holyworld.ru,uhc=astrummc.su,meetup=mc.politmine.ru";

#[derive(Debug, Clone, Envconfig)]
pub struct MonitorConfig {
    #[envconfig(from = "ONLINE_MONITOR_HOST", default = "0.0.0.0")]
    pub host: String,
    #[envconfig(from = "PORT", default = "3000")]
    pub port: u16,
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: log::Level,
    #[envconfig(from = "ONLINE_MONITOR_SERVERS", default = "lobby=mc.teslacraft.org,royale=hub.holyworld.ru,uhc=astrummc.su,meetup=mc.politmine.ru")]
    pub servers: String,
    #[envconfig(from = "ONLINE_MONITOR_SAMPLE_INTERVAL_SEC", default = "30")]
    pub sample_interval_sec: u64,
    #[envconfig(from = "ONLINE_MONITOR_RETENTION_SEC", default = "259200")]
    pub retention_sec: u64,
    #[envconfig(from = "ONLINE_MONITOR_CHART_BUCKET_SEC", default = "300")]
    pub chart_bucket_sec: u64,
    #[envconfig(from = "ONLINE_MONITOR_CHART_CACHE_SEC", default = "60")]
    pub chart_cache_sec: u64,
    #[envconfig(from = "ONLINE_MONITOR_PROBE_TIMEOUT_MS", default = "800")]
    pub probe_timeout_ms: u64,
    #[envconfig(from = "ONLINE_MONITOR_SRV_LOOKUP", default = "true")]
    pub srv_lookup: bool,
    #[envconfig(from = "ONLINE_MONITOR_STATE_FILE", default = "./online-history.json")]
    pub state_file: String,
    #[envconfig(from = "ONLINE_MONITOR_STALE_AFTER_SEC", default = "180")]
    pub stale_after_sec: u64,
}

/// A configured server: logical name plus the address that gets probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredServer {
    pub id: String,
    pub address: ServerAddress,
}

impl MonitorConfig {
    pub fn fetch() -> anyhow::Result<Self> {
        let cfg = Self::init_from_env().context("Failed to load online monitor config")?;
        parse_servers(&cfg.servers)?;
        validate_positive("ONLINE_MONITOR_SAMPLE_INTERVAL_SEC", cfg.sample_interval_sec)?;
        validate_positive("ONLINE_MONITOR_RETENTION_SEC", cfg.retention_sec)?;
        validate_positive("ONLINE_MONITOR_CHART_BUCKET_SEC", cfg.chart_bucket_sec)?;
        validate_positive("ONLINE_MONITOR_PROBE_TIMEOUT_MS", cfg.probe_timeout_ms)?;
        if cfg.state_file.trim().is_empty() {
            bail!("ONLINE_MONITOR_STATE_FILE must not be empty");
        }
        Ok(cfg)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn monitored_servers(&self) -> anyhow::Result<Vec<MonitoredServer>> {
        parse_servers(&self.servers)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_sec)
    }

    pub fn retention_ms(&self) -> i64 {
        secs_to_ms(self.retention_sec)
    }

    pub fn chart_bucket_ms(&self) -> i64 {
        secs_to_ms(self.chart_bucket_sec)
    }

    pub fn chart_cache_ms(&self) -> i64 {
        secs_to_ms(self.chart_cache_sec)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1_000)).unwrap_or(i64::MAX)
}

fn validate_positive(name: &str, value: u64) -> anyhow::Result<()> {
    if value == 0 {
        bail!("{name} must be greater than 0");
    }
    Ok(())
}

/// Parses `id=host[:port]` entries separated by commas.
pub fn parse_servers(raw: &str) -> anyhow::Result<Vec<MonitoredServer>> {
    let mut servers = Vec::new();
    let mut seen = HashSet::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (id, addr) = entry
            .split_once('=')
            .with_context(|| format!("server entry `{entry}` must look like id=host[:port]"))?;
        let id = id.trim();
        if id.is_empty() {
            bail!("server entry `{entry}` has an empty id");
        }
        if !seen.insert(id.to_owned()) {
            bail!("server id `{id}` is configured more than once");
        }

        servers.push(MonitoredServer {
            id: id.to_owned(),
            address: parse_address(addr.trim())
                .with_context(|| format!("invalid address for server `{id}`"))?,
        });
    }

    if servers.is_empty() {
        bail!("ONLINE_MONITOR_SERVERS must name at least one server");
    }
    Ok(servers)
}

fn parse_address(addr: &str) -> anyhow::Result<ServerAddress> {
    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .with_context(|| format!("`{port}` is not a valid port"))?;
            (host, port)
        }
        None => (addr, DEFAULT_SERVER_PORT),
    };

    if host.is_empty() {
        bail!("host must not be empty");
    }
    Ok(ServerAddress::new(host, port))
}
