use std::env;
use std::net::{ IpAddr, Ipv4Addr, SocketAddr };
use std::str::FromStr;
use std::time::Duration;
use ipnetwork::IpNetwork;

#[derive(Clone, Debug)]
pub struct Config {
    // UDP master
    pub master_address: Option<String>,
    pub master_port: u16,
    pub master_timeout_ms: u64,

    // HTTP master mirror
    pub http_master_url: Option<String>,
    pub use_http: bool,
    pub http_timeout_secs: u64,

    // LAN broadcast
    pub enable_lan: bool,
    pub lan_port: u16,
    pub lan_subnet: Option<IpNetwork>,
    pub lan_window_ms: u64,

    // Probing
    pub probe_timeout_ms: u64,
    pub max_concurrent_probes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            master_address: None,
            master_port: 27900,
            master_timeout_ms: 5000,
            http_master_url: None,
            use_http: false,
            http_timeout_secs: 10,
            enable_lan: true,
            lan_port: 27910,
            lan_subnet: None,
            lan_window_ms: 1500,
            probe_timeout_ms: 3000,
            max_concurrent_probes: 75,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            master_address: env_string("MASTER_ADDRESS"),
            master_port: env_or("MASTER_PORT", defaults.master_port),
            master_timeout_ms: env_or("MASTER_TIMEOUT_MS", defaults.master_timeout_ms),

            http_master_url: env_string("HTTP_MASTER_URL"),
            use_http: env_flag("USE_HTTP_MASTER", defaults.use_http),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),

            enable_lan: env_flag("ENABLE_LAN", defaults.enable_lan),
            lan_port: env_or("LAN_PORT", defaults.lan_port),
            lan_subnet: env_string("LAN_SUBNET").and_then(|v| v.parse().ok()),
            lan_window_ms: env_or("LAN_WINDOW_MS", defaults.lan_window_ms),

            probe_timeout_ms: env_or("PROBE_TIMEOUT_MS", defaults.probe_timeout_ms),
            max_concurrent_probes: env_or("MAX_CONCURRENT_PROBES", defaults.max_concurrent_probes),
        }
    }

    pub fn master_timeout(&self) -> Duration {
        Duration::from_millis(self.master_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn lan_window(&self) -> Duration {
        Duration::from_millis(self.lan_window_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_concurrency(&self) -> usize {
        self.max_concurrent_probes.max(1)
    }

    /// Broadcast address of the configured subnet, or the limited
    /// broadcast address when none is set.
    pub fn lan_broadcast_target(&self) -> SocketAddr {
        let ip = match self.lan_subnet {
            Some(IpNetwork::V4(net)) => IpAddr::V4(net.broadcast()),
            // IPv6 has no broadcast
            Some(IpNetwork::V6(_)) | None => IpAddr::V4(Ipv4Addr::BROADCAST),
        };
        SocketAddr::new(ip, self.lan_port)
    }
}
