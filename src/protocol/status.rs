// src/protocol/status.rs
use std::collections::BTreeMap;
use crate::models::server::{ ColorSegment, Endpoint, PlayerEntry, ServerRecord };
use crate::protocol::oob::{ prepend_oob_header, remove_oob_header };
use crate::utils::DiscoveryError;

pub const STATUS_COMMAND: &[u8] = b"status";
pub const STATUS_RESPONSE_MARKER: &str = "print";

/// Largest reply payload parsed; anything past this is cut off.
pub const MAX_STATUS_PAYLOAD: usize = 64 * 1024;
pub const MAX_ATTRIBUTES: usize = 256;
pub const MAX_PLAYERS: usize = 128;

pub fn build_status_query() -> Vec<u8> {
    prepend_oob_header(STATUS_COMMAND)
}

#[derive(Debug, Clone, Default)]
pub struct StatusReply {
    pub attributes: BTreeMap<String, String>,
    pub players: Vec<PlayerEntry>,
    /// Set when the payload, attribute list or roster hit a cap.
    pub truncated: bool,
}

/// Parses a `print` status datagram: header line, `\key\value` line, then
/// one line per player.
pub fn parse_status_reply(data: &[u8]) -> Result<StatusReply, DiscoveryError> {
    let payload = remove_oob_header(data);
    let mut reply = StatusReply::default();
    let payload = if payload.len() > MAX_STATUS_PAYLOAD {
        reply.truncated = true;
        &payload[..MAX_STATUS_PAYLOAD]
    } else {
        payload
    };

    let text = String::from_utf8_lossy(payload);
    let mut lines = text.split('\n');

    match lines.next() {
        Some(header) if header.trim_end() == STATUS_RESPONSE_MARKER => {}
        _ => return Err(DiscoveryError::Malformed("missing print header".to_string())),
    }

    let info = match lines.next() {
        Some(line) if line.starts_with('\\') => line.trim_end_matches('\r'),
        _ => return Err(DiscoveryError::Malformed("missing attribute line".to_string())),
    };
    reply.truncated |= parse_info_string(info, &mut reply.attributes);

    for line in lines.map(|l| l.trim_end_matches('\r')).filter(|l| !l.is_empty()) {
        if reply.players.len() >= MAX_PLAYERS {
            reply.truncated = true;
            break;
        }
        if let Some(player) = parse_player_line(line) {
            reply.players.push(player);
        }
    }

    Ok(reply)
}

/// Fills `attributes` from a `\key\value\...` string; returns true when
/// the pair cap cut the list short.
fn parse_info_string(info: &str, attributes: &mut BTreeMap<String, String>) -> bool {
    let mut parts = info.strip_prefix('\\').unwrap_or(info).split('\\');
    let mut pairs = 0;
    while let Some(key) = parts.next() {
        let value = parts.next().unwrap_or("");
        if pairs >= MAX_ATTRIBUTES {
            return true;
        }
        pairs += 1;
        if key.is_empty() {
            continue;
        }
        attributes.insert(key.to_string(), value.to_string());
    }
    false
}

fn parse_player_line(line: &str) -> Option<PlayerEntry> {
    let mut fields = line.splitn(3, ' ');
    let score = fields.next()?.parse().ok()?;
    let time = fields.next()?.parse().ok()?;
    let name = fields.next().unwrap_or("").trim();
    let name = name.strip_prefix('"').unwrap_or(name);
    let name = name.strip_suffix('"').unwrap_or(name);
    Some(PlayerEntry { name: name.to_string(), score, time })
}

fn first_attr<'a>(attributes: &'a BTreeMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| attributes.get(*k)).map(String::as_str)
}

impl StatusReply {
    pub fn into_record(self, endpoint: Endpoint, latency_ms: u64) -> ServerRecord {
        let host_name = first_attr(&self.attributes, &["hostname", "sv_hostname"]).unwrap_or("").to_string();
        let map_name = first_attr(&self.attributes, &["mapname"]).unwrap_or("").to_string();
        let game = first_attr(&self.attributes, &["gamename", "game", "fs_game"]).unwrap_or("").to_string();
        let max_players = first_attr(&self.attributes, &["maxclients", "sv_maxclients"])
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        let num_players = first_attr(&self.attributes, &["clients"])
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.players.len() as u32);

        ServerRecord {
            endpoint,
            host_name,
            map_name,
            game,
            num_players,
            max_players,
            latency_ms,
            players: self.players,
            attributes: self.attributes,
        }
    }
}

/// Splits display text on `^<digit>` color markers. Other carets are
/// ordinary characters.
pub fn color_segments(text: &str) -> Vec<ColorSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut color = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '^' {
            if let Some(d) = chars.peek().and_then(|n| n.to_digit(10)) {
                chars.next();
                if !current.is_empty() {
                    segments.push(ColorSegment { text: std::mem::take(&mut current), color });
                }
                color = Some(d as u8);
                continue;
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        segments.push(ColorSegment { text: current, color });
    }
    segments
}

pub fn strip_colors(text: &str) -> String {
    color_segments(text).into_iter().map(|s| s.text).collect()
}
