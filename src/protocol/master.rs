// src/protocol/master.rs
use crate::models::server::Endpoint;
use crate::protocol::oob::{ is_terminator, parse_endpoint, prepend_oob_header, remove_oob_header, ENDPOINT_RECORD_LEN };

pub const QUERY_COMMAND: &[u8] = b"query";
pub const SERVERS_RESPONSE_MARKER: &[u8] = b"servers";

pub fn build_query() -> Vec<u8> {
    prepend_oob_header(QUERY_COMMAND)
}

/// Parses a framed master reply. `None` means the datagram is not a server
/// list at all; an empty list is a valid answer.
pub fn parse_servers_response(data: &[u8]) -> Option<Vec<Endpoint>> {
    let payload = remove_oob_header(data);
    let records = payload.strip_prefix(SERVERS_RESPONSE_MARKER)?;
    let records = skip_separator(records);

    let mut endpoints = Vec::new();
    let mut offset = 0;
    // a trailing partial record ends the walk
    while let Some(endpoint) = parse_endpoint(records, offset) {
        if is_terminator(&endpoint) {
            break;
        }
        endpoints.push(endpoint);
        offset += ENDPOINT_RECORD_LEN;
    }
    Some(endpoints)
}

/// Masters put a space or newline after the marker. Both bytes are also
/// valid first address octets, so one is only dropped when it leaves a
/// whole number of records behind.
fn skip_separator(records: &[u8]) -> &[u8] {
    match records.split_first() {
        Some((b' ' | b'\n', rest)) if records.len() % ENDPOINT_RECORD_LEN == 1 => rest,
        _ => records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(separator: &[u8], records: &[[u8; 6]], trailer: &[u8]) -> Vec<u8> {
        let mut body = SERVERS_RESPONSE_MARKER.to_vec();
        body.extend_from_slice(separator);
        for r in records {
            body.extend_from_slice(r);
        }
        body.extend_from_slice(trailer);
        prepend_oob_header(&body)
    }

    fn keys(data: &[u8]) -> Vec<String> {
        parse_servers_response(data).unwrap().iter().map(|e| e.key()).collect()
    }

    #[test]
    fn query_is_framed() {
        let q = build_query();
        assert_eq!(&q[..4], &[0xFF; 4]);
        assert_eq!(&q[4..], b"query");
    }

    #[test]
    fn walks_records_after_space_separator() {
        let data = response(b" ", &[[1, 2, 3, 4, 0x6D, 0x38], [5, 6, 7, 8, 0x6D, 0x39]], &[]);
        assert_eq!(keys(&data), vec!["1.2.3.4:27960", "5.6.7.8:27961"]);
    }

    #[test]
    fn walks_records_after_newline_separator() {
        let data = response(b"\n", &[[192, 168, 0, 7, 0x6D, 0x46]], &[]);
        assert_eq!(keys(&data), vec!["192.168.0.7:27974"]);
    }

    #[test]
    fn keeps_records_that_start_with_separator_bytes() {
        let data = response(b"", &[[10, 0, 0, 1, 0x6D, 0xDA], [32, 1, 1, 1, 0x6D, 0x38]], &[]);
        assert_eq!(keys(&data), vec!["10.0.0.1:28122", "32.1.1.1:27960"]);
    }

    #[test]
    fn stops_at_zero_record() {
        let data = response(b" ", &[[1, 2, 3, 4, 0x6D, 0x38], [0; 6], [5, 6, 7, 8, 0x6D, 0x39]], &[]);
        assert_eq!(parse_servers_response(&data).unwrap().len(), 1);
    }

    #[test]
    fn discards_short_trailing_record() {
        let data = response(b"", &[[1, 2, 3, 4, 0x6D, 0x38]], &[9, 9, 9]);
        assert_eq!(parse_servers_response(&data).unwrap().len(), 1);
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(parse_servers_response(&response(b" ", &[], &[])).unwrap().is_empty());
    }

    #[test]
    fn rejects_other_packets() {
        assert!(parse_servers_response(&prepend_oob_header(b"print\n\\hostname\\x\n")).is_none());
        assert!(parse_servers_response(&[0xFF, 0xFF]).is_none());
    }
}
