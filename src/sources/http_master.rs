// src/sources/http_master.rs
use std::sync::Arc;
use std::time::Duration;
use log::Level;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use crate::config::Config;
use crate::models::server::Endpoint;
use crate::protocol::oob::{ has_oob_header, parse_endpoint, remove_oob_header, ENDPOINT_RECORD_LEN };
use crate::report::Reporter;
use crate::utils::DiscoveryError;

const TARGET: &str = "serverscout::http_master";

pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;
pub const MAX_ENDPOINTS: usize = 10_000;
const MAX_CHUNK_SIZE: usize = 1024;

/// Builds the HTTP transport shared by every master query for the life of
/// the process. `reqwest::Client` clones share one connection pool.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, DiscoveryError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(concat!("serverscout/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(DiscoveryError::from)
}

#[derive(Debug, Default)]
pub struct ParsedServerList {
    pub endpoints: Vec<Endpoint>,
    pub truncated: bool,
}

pub struct HttpMasterClient {
    client: reqwest::Client,
    url: Option<String>,
    timeout: Duration,
    max_body_bytes: usize,
    reporter: Arc<dyn Reporter>,
}

impl HttpMasterClient {
    pub fn new(client: &reqwest::Client, config: &Config, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            client: client.clone(),
            url: config.http_master_url.clone(),
            timeout: config.http_timeout(),
            max_body_bytes: MAX_BODY_BYTES,
            reporter,
        }
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Fetches and decodes the mirror's list. Every failure, including
    /// cancellation, comes back as an empty list.
    pub async fn query_servers(&self, cancel: &CancellationToken) -> Vec<Endpoint> {
        let url = match self.validated_url() {
            Ok(url) => url,
            Err(e) => {
                self.reporter.report(TARGET, Level::Error, format_args!("HTTP master skipped: {}", e));
                return Vec::new();
            }
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(DiscoveryError::Cancelled),
            r = self.fetch(url.clone()) => r,
        };

        match result {
            Ok(parsed) => {
                if parsed.truncated {
                    self.reporter.report(
                        TARGET,
                        Level::Warn,
                        format_args!("HTTP master {} list truncated to {} servers", url, MAX_ENDPOINTS),
                    );
                }
                self.reporter.report(
                    TARGET,
                    Level::Debug,
                    format_args!("HTTP master {} listed {} servers", url, parsed.endpoints.len()),
                );
                parsed.endpoints
            }
            Err(DiscoveryError::Cancelled) => Vec::new(),
            Err(e) => {
                self.reporter.report(TARGET, Level::Warn, format_args!("HTTP master {}: {}", url, e));
                Vec::new()
            }
        }
    }

    fn validated_url(&self) -> Result<Url, DiscoveryError> {
        let raw = self
            .url
            .as_deref()
            .ok_or_else(|| DiscoveryError::InvalidConfig("HTTP master URL is not set".to_string()))?;
        let url = Url::parse(raw)
            .map_err(|e| DiscoveryError::InvalidConfig(format!("bad HTTP master URL {:?}: {}", raw, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(DiscoveryError::InvalidConfig(format!("HTTP master URL {:?} is not http(s)", raw)));
        }
        Ok(url)
    }

    async fn fetch(&self, url: Url) -> Result<ParsedServerList, DiscoveryError> {
        let mut response = self.client.get(url).timeout(self.timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::HttpStatus(status.as_u16()));
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or("").to_ascii_lowercase();
            if !is_binary_content_type(&content_type) {
                return Err(DiscoveryError::BadContentType(content_type));
            }
        }

        if let Some(len) = response.content_length() {
            let len = usize::try_from(len).unwrap_or(usize::MAX);
            if len > self.max_body_bytes {
                return Err(DiscoveryError::ResponseTooLarge(len));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(DiscoveryError::ResponseTooLarge(body.len() + chunk.len()));
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(DiscoveryError::EmptyResponse);
        }
        if looks_like_html(&body) {
            return Err(DiscoveryError::HtmlResponse);
        }

        parse_server_list(&body)
    }
}

fn is_binary_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    if essence.is_empty() {
        return true;
    }
    if essence.contains("html") {
        return false;
    }
    essence.starts_with("application/") || essence.starts_with("binary/")
}

/// Cheap check for error pages served in place of the list.
pub fn looks_like_html(body: &[u8]) -> bool {
    let body = body.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(body);
    let start = body.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(body.len());
    let head = &body[start..];
    [&b"<html"[..], &b"<!doctype"[..]]
        .iter()
        .any(|tag| head.len() >= tag.len() && head[..tag.len()].eq_ignore_ascii_case(tag))
}

/// Decodes any of the mirror encodings: `+N`/`-N` chunk-size prefix,
/// OOB-framed records, or bare 6-byte records.
pub fn parse_server_list(body: &[u8]) -> Result<ParsedServerList, DiscoveryError> {
    match body {
        [b'+' | b'-', d, ..] if d.is_ascii_digit() => parse_prefixed(&body[1..]),
        _ if has_oob_header(body) => Ok(parse_records(remove_oob_header(body), 0, ENDPOINT_RECORD_LEN)),
        _ => Ok(parse_records(body, 0, ENDPOINT_RECORD_LEN)),
    }
}

fn parse_prefixed(body: &[u8]) -> Result<ParsedServerList, DiscoveryError> {
    let digits = body.iter().take_while(|b| b.is_ascii_digit()).count();
    let chunk_size: usize = std::str::from_utf8(&body[..digits])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| DiscoveryError::Malformed("unreadable chunk size".to_string()))?;
    if !(ENDPOINT_RECORD_LEN..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(DiscoveryError::Malformed(format!("unsupported chunk size {}", chunk_size)));
    }
    Ok(parse_records(body, digits, chunk_size))
}

fn parse_records(body: &[u8], start: usize, chunk_size: usize) -> ParsedServerList {
    let mut parsed = ParsedServerList::default();
    let records = body.get(start..).unwrap_or(&[]);
    for chunk in records.chunks_exact(chunk_size) {
        let endpoint = match parse_endpoint(chunk, 0) {
            Some(ep) => ep,
            None => break,
        };
        if endpoint.port() == 0 || endpoint.ip().is_unspecified() {
            continue;
        }
        if parsed.endpoints.len() == MAX_ENDPOINTS {
            parsed.truncated = true;
            break;
        }
        parsed.endpoints.push(endpoint);
    }
    parsed
}
