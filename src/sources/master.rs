// src/sources/master.rs
use std::sync::Arc;
use std::time::Duration;
use log::Level;
use tokio_util::sync::CancellationToken;
use crate::config::Config;
use crate::models::server::Endpoint;
use crate::protocol::master::{ build_query, parse_servers_response };
use crate::report::Reporter;
use crate::utils::{ bind_ephemeral, resolve_address, DiscoveryError };

const TARGET: &str = "serverscout::master";

/// Largest datagram a master can send.
const MAX_DATAGRAM: usize = 65536;

pub struct MasterClient {
    address: Option<String>,
    port: u16,
    timeout: Duration,
    reporter: Arc<dyn Reporter>,
}

impl MasterClient {
    pub fn new(config: &Config, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            address: config.master_address.clone(),
            port: config.master_port,
            timeout: config.master_timeout(),
            reporter,
        }
    }

    /// Asks the master for its server list. Never fails: errors, timeouts
    /// and cancellation all produce an empty list.
    pub async fn query_servers(&self, cancel: &CancellationToken) -> Vec<Endpoint> {
        let address = match &self.address {
            Some(a) => a.as_str(),
            None => {
                self.reporter.report(TARGET, Level::Error, format_args!("UDP master address is not configured"));
                return Vec::new();
            }
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(DiscoveryError::Cancelled),
            r = tokio::time::timeout(self.timeout, self.exchange(address)) => {
                r.unwrap_or(Err(DiscoveryError::Timeout))
            }
        };

        match result {
            Ok(endpoints) => {
                self.reporter.report(
                    TARGET,
                    Level::Debug,
                    format_args!("UDP master {}:{} listed {} servers", address, self.port, endpoints.len()),
                );
                endpoints
            }
            Err(DiscoveryError::Cancelled) => Vec::new(),
            Err(e) => {
                self.reporter.report(TARGET, Level::Warn, format_args!("UDP master {}:{}: {}", address, self.port, e));
                Vec::new()
            }
        }
    }

    async fn exchange(&self, address: &str) -> Result<Vec<Endpoint>, DiscoveryError> {
        let target = resolve_address(address, self.port).await?;
        let socket = bind_ephemeral(&target).await?;
        socket.connect(target).await?;
        socket.send(&build_query()).await?;

        let mut buffer = vec![0u8; MAX_DATAGRAM];
        loop {
            let len = socket.recv(&mut buffer).await?;
            // stray packets on the same port are skipped until the timeout
            match parse_servers_response(&buffer[..len]) {
                Some(endpoints) => return Ok(endpoints),
                None => self.reporter.report(
                    TARGET,
                    Level::Warn,
                    format_args!("Ignoring {} byte non-list datagram from master {}", len, target),
                ),
            }
        }
    }
}
