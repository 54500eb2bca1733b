// src/models/server.rs
use serde::{ Deserialize, Serialize };
use std::collections::BTreeMap;
use std::fmt;
use std::net::{ IpAddr, SocketAddr };
use uuid::Uuid;

/// Address and port of a game server. The `address:port` text form is the
/// dedup and lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port))
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn key(&self) -> String {
        self.0.to_string()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub name: String,
    pub score: i32,
    /// Second numeric column of a player line (ping on most servers).
    pub time: i32,
}

/// A run of display text sharing one color index. `None` is the default color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorSegment {
    pub text: String,
    pub color: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub endpoint: Endpoint,
    pub host_name: String,
    pub map_name: String,
    pub game: String,
    pub num_players: u32,
    pub max_players: u32,
    pub latency_ms: u64,
    pub players: Vec<PlayerEntry>,
    pub attributes: BTreeMap<String, String>,
}

impl ServerRecord {
    pub fn hostname_segments(&self) -> Vec<ColorSegment> {
        crate::protocol::status::color_segments(&self.host_name)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceCounts {
    pub udp_master: usize,
    pub http_master: usize,
    pub lan: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub discovered: SourceCounts,
    pub attempted: usize,
    pub produced: usize,
    pub cancelled: bool,
}
