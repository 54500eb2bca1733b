// src/protocol/oob.rs
use byteorder::{ BigEndian, ByteOrder };
use std::net::{ IpAddr, Ipv4Addr };
use crate::models::server::Endpoint;

/// Marker that distinguishes connectionless control packets from game traffic.
pub const OOB_HEADER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// Size of one IPv4 + port record in list responses.
pub const ENDPOINT_RECORD_LEN: usize = 6;

pub fn prepend_oob_header(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(OOB_HEADER.len() + payload.len());
    framed.extend_from_slice(&OOB_HEADER);
    framed.extend_from_slice(payload);
    framed
}

pub fn has_oob_header(data: &[u8]) -> bool {
    data.len() >= OOB_HEADER.len() && data[..OOB_HEADER.len()] == OOB_HEADER
}

/// Strips the marker if present. Input without a marker comes back unchanged.
pub fn remove_oob_header(data: &[u8]) -> &[u8] {
    if has_oob_header(data) {
        &data[OOB_HEADER.len()..]
    } else {
        data
    }
}

pub fn read_u16_be(buf: &[u8], offset: usize) -> Option<u16> {
    let end = offset.checked_add(2)?;
    buf.get(offset..end).map(BigEndian::read_u16)
}

/// Decodes a 4-byte IPv4 address and 2-byte big-endian port at `offset`.
/// Returns `None` when fewer than six bytes remain, which callers treat as
/// the end of the list.
pub fn parse_endpoint(buf: &[u8], offset: usize) -> Option<Endpoint> {
    let end = offset.checked_add(ENDPOINT_RECORD_LEN)?;
    let record = buf.get(offset..end)?;
    let ip = Ipv4Addr::new(record[0], record[1], record[2], record[3]);
    let port = read_u16_be(record, 4)?;
    Some(Endpoint::new(IpAddr::V4(ip), port))
}

/// True for the all-zero record masters use as a list terminator.
pub fn is_terminator(endpoint: &Endpoint) -> bool {
    endpoint.port() == 0 && endpoint.ip().is_unspecified()
}
