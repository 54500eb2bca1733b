// src/sources/lan.rs
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use log::Level;
use tokio::time::{ sleep_until, Instant };
use tokio_util::sync::CancellationToken;
use crate::config::Config;
use crate::models::server::Endpoint;
use crate::protocol::status::{ build_status_query, parse_status_reply };
use crate::report::Reporter;
use crate::utils::{ bind_ephemeral, DiscoveryError };

const TARGET: &str = "serverscout::lan";

const MAX_DATAGRAM: usize = 65536;

/// Finds servers on the local subnet by broadcasting a status query and
/// listening for a fixed window.
pub struct LanClient {
    target: SocketAddr,
    window: Duration,
    reporter: Arc<dyn Reporter>,
}

impl LanClient {
    pub fn new(config: &Config, reporter: Arc<dyn Reporter>) -> Self {
        Self::with_target(config.lan_broadcast_target(), config.lan_window(), reporter)
    }

    pub fn with_target(target: SocketAddr, window: Duration, reporter: Arc<dyn Reporter>) -> Self {
        Self { target, window, reporter }
    }

    pub async fn query_servers(&self, cancel: &CancellationToken) -> Vec<Endpoint> {
        match self.collect(cancel).await {
            Ok(found) => {
                self.reporter.report(
                    TARGET,
                    Level::Debug,
                    format_args!("LAN broadcast to {} found {} servers", self.target, found.len()),
                );
                found
            }
            Err(e) => {
                self.reporter.report(TARGET, Level::Warn, format_args!("LAN broadcast to {} failed: {}", self.target, e));
                Vec::new()
            }
        }
    }

    async fn collect(&self, cancel: &CancellationToken) -> Result<Vec<Endpoint>, DiscoveryError> {
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let socket = bind_ephemeral(&self.target).await?;
        socket.set_broadcast(true)?;
        socket.send_to(&build_status_query(), self.target).await?;

        let deadline = sleep_until(Instant::now() + self.window);
        tokio::pin!(deadline);

        let mut replies = Replies::default();
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = &mut deadline => break,
                received = socket.recv_from(&mut buffer) => {
                    let received = received.map(|(len, from)| (&buffer[..len], from));
                    replies.absorb(received, self.reporter.as_ref());
                }
            }
        }
        Ok(replies.found)
    }
}

/// Distinct responders seen during one broadcast window.
#[derive(Default)]
struct Replies {
    seen: HashSet<Endpoint>,
    found: Vec<Endpoint>,
}

impl Replies {
    /// Receive errors (ICMP unreachables from hosts on the subnet) are
    /// reported and skipped; the window stays open.
    fn absorb(&mut self, received: io::Result<(&[u8], SocketAddr)>, reporter: &dyn Reporter) {
        let (data, from) = match received {
            Ok(r) => r,
            Err(e) => {
                reporter.report(TARGET, Level::Debug, format_args!("LAN receive error: {}", e));
                return;
            }
        };
        match parse_status_reply(data) {
            Ok(_) => {
                let endpoint = Endpoint::from(from);
                if self.seen.insert(endpoint) {
                    self.found.push(endpoint);
                }
            }
            Err(e) => reporter.report(
                TARGET,
                Level::Debug,
                format_args!("Ignoring LAN reply from {}: {}", from, e),
            ),
        }
    }
}
