// src/discovery.rs
use std::collections::HashSet;
use std::sync::Arc;
use log::Level;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use crate::config::Config;
use crate::models::server::{ CycleSummary, Endpoint, ServerRecord, SourceCounts };
use crate::prober::StatusProber;
use crate::report::Reporter;
use crate::sources::http_master::HttpMasterClient;
use crate::sources::lan::LanClient;
use crate::sources::master::MasterClient;

const TARGET: &str = "serverscout::discovery";

/// Concatenates source lists and drops repeated `address:port` keys,
/// keeping the first occurrence.
pub fn merge_endpoints<I>(sources: I) -> Vec<Endpoint>
    where I: IntoIterator<Item = Vec<Endpoint>>
{
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .flatten()
        .filter(|endpoint| seen.insert(endpoint.key()))
        .collect()
}

/// Runs discovery cycles: gather endpoints from every enabled source,
/// merge them, then probe the result.
pub struct DiscoveryEngine {
    config: Arc<Config>,
    http: reqwest::Client,
    reporter: Arc<dyn Reporter>,
}

impl DiscoveryEngine {
    /// `http` is the process-wide transport; the engine keeps a handle to
    /// its connection pool and never rebuilds it.
    pub fn new(config: Config, http: &reqwest::Client, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            config: Arc::new(config),
            http: http.clone(),
            reporter,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Queries the enabled sources concurrently. Each source runs as its own
    /// task so a failure in one leaves the others untouched.
    pub async fn gather_endpoints(&self, cancel: &CancellationToken) -> (Vec<Endpoint>, SourceCounts) {
        let udp = self.config.master_address.is_some().then(|| {
            let client = MasterClient::new(&self.config, self.reporter.clone());
            let cancel = cancel.clone();
            tokio::spawn(async move { client.query_servers(&cancel).await })
        });
        if udp.is_none() {
            self.reporter.report(TARGET, Level::Debug, format_args!("UDP master not configured, skipping"));
        }

        let http = self.config.use_http.then(|| {
            let client = HttpMasterClient::new(&self.http, &self.config, self.reporter.clone());
            let cancel = cancel.clone();
            tokio::spawn(async move { client.query_servers(&cancel).await })
        });

        let lan = self.config.enable_lan.then(|| {
            let client = LanClient::new(&self.config, self.reporter.clone());
            let cancel = cancel.clone();
            tokio::spawn(async move { client.query_servers(&cancel).await })
        });

        let (udp, http, lan) = tokio::join!(
            self.settle("UDP master", udp),
            self.settle("HTTP master", http),
            self.settle("LAN", lan)
        );

        let counts = SourceCounts {
            udp_master: udp.len(),
            http_master: http.len(),
            lan: lan.len(),
        };
        (merge_endpoints([udp, http, lan]), counts)
    }

    async fn settle(&self, name: &str, handle: Option<JoinHandle<Vec<Endpoint>>>) -> Vec<Endpoint> {
        let handle = match handle {
            Some(h) => h,
            None => return Vec::new(),
        };
        match handle.await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                self.reporter.report(TARGET, Level::Error, format_args!("{} source failed: {}", name, e));
                Vec::new()
            }
        }
    }

    /// One full discovery cycle. Records reach `on_record` as probes finish;
    /// the summary reports how many endpoints were tried and answered.
    pub async fn run_cycle<F>(&self, on_record: F, cancel: &CancellationToken) -> CycleSummary
        where F: FnMut(ServerRecord)
    {
        let cycle_id = Uuid::new_v4();
        self.reporter.report(TARGET, Level::Info, format_args!("Discovery cycle {} started", cycle_id));

        let (endpoints, discovered) = self.gather_endpoints(cancel).await;
        let mut summary = CycleSummary {
            cycle_id,
            discovered,
            attempted: 0,
            produced: 0,
            cancelled: false,
        };

        if cancel.is_cancelled() {
            summary.cancelled = true;
            self.reporter.report(TARGET, Level::Info, format_args!("Discovery cycle {} cancelled before probing", cycle_id));
            return summary;
        }

        let prober = StatusProber::new(&self.config, self.reporter.clone());
        let probed = prober.probe_servers(endpoints, on_record, cancel).await;
        summary.attempted = probed.attempted;
        summary.produced = probed.produced;
        summary.cancelled = probed.cancelled;

        self.reporter.report(
            TARGET,
            Level::Info,
            format_args!(
                "Discovery cycle {} finished: {} of {} servers answered{}",
                cycle_id,
                summary.produced,
                summary.attempted,
                if summary.cancelled { " (cancelled)" } else { "" }
            ),
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{ IpAddr, Ipv4Addr };

    fn ep(last: u8, port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), port)
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let (a, b, c) = (ep(1, 27960), ep(2, 27960), ep(3, 27960));
        let merged = merge_endpoints([vec![a, b, a], vec![b, c]]);
        assert_eq!(merged, vec![a, b, c]);
    }

    #[test]
    fn merge_distinguishes_ports() {
        let merged = merge_endpoints([vec![ep(1, 27960)], vec![ep(1, 27961)], Vec::new()]);
        assert_eq!(merged.len(), 2);
    }
}
