//! `_minecraft._tcp` SRV lookup for configured server hosts.
//!
//! Only hosts configured without an explicit port are looked up, like the
//! game client does. A missing or failed record falls back to the configured
//! host, which the socket connect then resolves through A/AAAA.

use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use log::debug;

use crate::error::ProbeError;
use crate::probe::{DEFAULT_SERVER_PORT, ServerAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub priority: u16,
    pub weight: u16,
    pub target: String,
    pub port: u16,
}

#[async_trait]
pub trait SrvResolver: Send + Sync {
    /// Returns the SRV records published under `name`.
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, ProbeError>;
}

pub struct HickorySrvResolver {
    resolver: TokioAsyncResolver,
}

impl HickorySrvResolver {
    pub fn from_system_conf() -> Result<Self, ProbeError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|err| ProbeError::Resolve(err.to_string()))?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl SrvResolver for HickorySrvResolver {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, ProbeError> {
        let lookup = self
            .resolver
            .srv_lookup(name)
            .await
            .map_err(|err| ProbeError::Resolve(err.to_string()))?;

        Ok(lookup
            .iter()
            .map(|srv| SrvRecord {
                priority: srv.priority(),
                weight: srv.weight(),
                target: srv.target().to_utf8(),
                port: srv.port(),
            })
            .collect())
    }
}

fn wants_srv_lookup(address: &ServerAddress) -> bool {
    address.port == DEFAULT_SERVER_PORT && address.host.parse::<IpAddr>().is_err()
}

/// Lowest priority wins, then the heaviest weight.
fn preferred_target(records: &[SrvRecord]) -> Option<ServerAddress> {
    records
        .iter()
        .filter(|record| !record.target.trim_end_matches('.').is_empty())
        .min_by_key(|record| (record.priority, std::cmp::Reverse(record.weight)))
        .map(|record| ServerAddress::new(record.target.trim_end_matches('.'), record.port))
}

/// Picks the endpoint to connect to for `address`.
pub async fn resolve_endpoint(
    address: &ServerAddress,
    resolver: Option<&dyn SrvResolver>,
) -> ServerAddress {
    let Some(resolver) = resolver.filter(|_| wants_srv_lookup(address)) else {
        return address.clone();
    };

    let name = format!("_minecraft._tcp.{}.", address.host.trim_end_matches('.'));
    match resolver.lookup_srv(&name).await {
        Ok(records) => preferred_target(&records).unwrap_or_else(|| address.clone()),
        Err(err) => {
            debug!("no SRV record for {}: {err}", address.host);
            address.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers every lookup with the same canned result and records queries.
    struct StaticResolver {
        answer: Option<Vec<SrvRecord>>,
        queries: Mutex<Vec<String>>,
    }

    impl StaticResolver {
        fn new(answer: Option<Vec<SrvRecord>>) -> Self {
            Self {
                answer,
                queries: Mutex::new(Vec::new()),
            }
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SrvResolver for StaticResolver {
        async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, ProbeError> {
            self.queries.lock().unwrap().push(name.to_owned());
            self.answer
                .clone()
                .ok_or_else(|| ProbeError::Resolve("no records found".to_owned()))
        }
    }

    fn record(priority: u16, weight: u16, target: &str, port: u16) -> SrvRecord {
        SrvRecord {
            priority,
            weight,
            target: target.to_owned(),
            port,
        }
    }

    #[tokio::test]
    async fn uses_srv_target_when_published() {
        let resolver = StaticResolver::new(Some(vec![record(0, 5, "node1.example.net.", 25590)]));
        let address = ServerAddress::new("mc.example.net", DEFAULT_SERVER_PORT);

        let endpoint = resolve_endpoint(&address, Some(&resolver)).await;
        assert_eq!(endpoint, ServerAddress::new("node1.example.net", 25590));
        assert_eq!(resolver.queries(), ["_minecraft._tcp.mc.example.net."]);
    }

    #[tokio::test]
    async fn falls_back_to_configured_host_without_record() {
        let resolver = StaticResolver::new(None);
        let address = ServerAddress::new("mc.example.net", DEFAULT_SERVER_PORT);
        assert_eq!(resolve_endpoint(&address, Some(&resolver)).await, address);

        let empty = StaticResolver::new(Some(Vec::new()));
        assert_eq!(resolve_endpoint(&address, Some(&empty)).await, address);
    }

    #[tokio::test]
    async fn skips_lookup_for_explicit_port_and_ip_literals() {
        let resolver = StaticResolver::new(Some(vec![record(0, 0, "elsewhere.test", 1)]));

        let explicit = ServerAddress::new("mc.example.net", 25570);
        assert_eq!(resolve_endpoint(&explicit, Some(&resolver)).await, explicit);

        let literal = ServerAddress::new("127.0.0.1", DEFAULT_SERVER_PORT);
        assert_eq!(resolve_endpoint(&literal, Some(&resolver)).await, literal);

        assert!(resolver.queries().is_empty());
    }

    #[tokio::test]
    async fn no_resolver_means_direct_connect() {
        let address = ServerAddress::new("mc.example.net", DEFAULT_SERVER_PORT);
        assert_eq!(resolve_endpoint(&address, None).await, address);
    }

    #[test]
    fn prefers_lowest_priority_then_highest_weight() {
        let records = [
            record(10, 100, "backup.test.", 25565),
            record(0, 1, "light.test.", 25566),
            record(0, 50, "heavy.test.", 25567),
            record(0, 99, ".", 25568),
        ];
        assert_eq!(
            preferred_target(&records),
            Some(ServerAddress::new("heavy.test", 25567))
        );
    }
}
