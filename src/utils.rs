// src/utils.rs
use std::fmt;
use std::io;
use std::net::SocketAddr;
use tokio::net::{ lookup_host, UdpSocket };

#[derive(Debug)]
pub enum DiscoveryError {
    InvalidConfig(String),
    Io(io::Error),
    Timeout,
    Cancelled,
    Http(String),
    HttpStatus(u16),
    EmptyResponse,
    ResponseTooLarge(usize),
    HtmlResponse,
    BadContentType(String),
    Malformed(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::Io(e) => write!(f, "Socket error: {}", e),
            Self::Timeout => write!(f, "Timed out waiting for a reply"),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::Http(msg) => write!(f, "HTTP request failed: {}", msg),
            Self::HttpStatus(code) => write!(f, "HTTP request returned status {}", code),
            Self::EmptyResponse => write!(f, "Response body was empty"),
            Self::ResponseTooLarge(len) => write!(f, "Response body too large ({} bytes)", len),
            Self::HtmlResponse => write!(f, "Response looks like an HTML page"),
            Self::BadContentType(ct) => write!(f, "Unexpected content type: {}", ct),
            Self::Malformed(msg) => write!(f, "Malformed response: {}", msg),
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DiscoveryError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Resolves `host:port`, preferring an IPv4 result since the list
/// formats of this protocol family only carry IPv4.
pub async fn resolve_address(host: &str, port: u16) -> Result<SocketAddr, DiscoveryError> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| DiscoveryError::InvalidConfig(format!("{} did not resolve", host)))
}

/// Binds an ephemeral UDP socket of the same address family as `target`.
pub async fn bind_ephemeral(target: &SocketAddr) -> io::Result<UdpSocket> {
    let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    UdpSocket::bind(local).await
}
