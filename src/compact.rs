//! Compact representation

use crate::id::NODE_ID_LEN;
use std::{
    convert::TryInto,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
};

pub(crate) const SOCKET_ADDR_V4_LEN: usize = 6;
pub(crate) const NODE_HANDLE_V4_LEN: usize = NODE_ID_LEN + SOCKET_ADDR_V4_LEN;

/// Lenient reading of `values` (list of compact peers). Entries that are not 6-byte
/// strings are dropped one by one, anything that is not a list yields no peers.
pub(crate) mod values {
    use serde_bencode::value::Value;
    use std::net::SocketAddr;

    pub(crate) fn from_value(value: Value) -> Vec<SocketAddr> {
        match value {
            Value::List(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Bytes(bytes) => super::decode_socket_addr(bytes),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Lenient reading of `nodes` (concatenated 26-byte compact node infos). Node ids are
/// skipped, a trailing partial record is ignored.
pub(crate) mod nodes_v4 {
    use serde_bencode::value::Value;
    use std::net::SocketAddr;

    pub(crate) fn from_value(value: Value) -> Vec<SocketAddr> {
        match value {
            Value::Bytes(buffer) => super::decode_nodes(&buffer),
            _ => Vec::new(),
        }
    }
}

/// Decode the endpoints out of a compact node info buffer.
pub(crate) fn decode_nodes(buffer: &[u8]) -> Vec<SocketAddr> {
    buffer
        .chunks_exact(NODE_HANDLE_V4_LEN)
        .filter_map(|chunk| decode_socket_addr(&chunk[NODE_ID_LEN..]))
        .collect()
}

/// Decode a 6-byte compact IPv4 endpoint. Any other length is rejected.
pub(crate) fn decode_socket_addr(src: &[u8]) -> Option<SocketAddr> {
    if src.len() != SOCKET_ADDR_V4_LEN {
        return None;
    }

    let addr: [u8; 4] = src.get(..4)?.try_into().ok()?;
    let port = u16::from_be_bytes(src.get(4..)?.try_into().ok()?);

    Some(SocketAddrV4::new(Ipv4Addr::from(addr), port).into())
}

/// Encode an IPv4 endpoint into its compact form. `None` for IPv6 endpoints.
#[cfg(test)]
pub(crate) fn encode_socket_addr(addr: &SocketAddr) -> Option<[u8; SOCKET_ADDR_V4_LEN]> {
    match addr {
        SocketAddr::V4(addr) => {
            let mut buffer = [0; SOCKET_ADDR_V4_LEN];
            buffer[..4].copy_from_slice(&addr.ip().octets());
            buffer[4..].copy_from_slice(&addr.port().to_be_bytes());
            Some(buffer)
        }
        SocketAddr::V6(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_bencode::value::Value;

    #[test]
    fn decode_compact_peer() {
        let addr = decode_socket_addr(&[0x01, 0x02, 0x03, 0x04, 0x1a, 0xe1]).unwrap();
        assert_eq!(addr.to_string(), "1.2.3.4:6881");
    }

    #[test]
    fn decode_compact_peer_wrong_length() {
        assert_eq!(decode_socket_addr(&[0x01, 0x02, 0x03, 0x04, 0x1a]), None);
        assert_eq!(decode_socket_addr(&[]), None);
        assert_eq!(decode_socket_addr(&[0; 18]), None);
    }

    #[test]
    fn encode_compact_peer() {
        let addr: SocketAddr = "1.2.3.4:6881".parse().unwrap();
        assert_eq!(
            encode_socket_addr(&addr),
            Some([0x01, 0x02, 0x03, 0x04, 0x1a, 0xe1])
        );

        let addr: SocketAddr = "[::1]:6881".parse().unwrap();
        assert_eq!(encode_socket_addr(&addr), None);
    }

    #[test]
    fn decode_two_nodes() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(b"0123456789abcdefghij");
        buffer.extend_from_slice(&[127, 0, 0, 1, 26, 133]);
        buffer.extend_from_slice(b"klmnopqrstuvwxyz0123");
        buffer.extend_from_slice(&[127, 0, 0, 2, 4, 210]);
        assert_eq!(buffer.len(), 52);

        assert_eq!(
            decode_nodes(&buffer),
            vec![
                "127.0.0.1:6789".parse::<SocketAddr>().unwrap(),
                "127.0.0.2:1234".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn decode_nodes_stops_at_last_complete_record() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(b"0123456789abcdefghij");
        buffer.extend_from_slice(&[10, 0, 0, 1, 0, 80]);
        buffer.extend_from_slice(b"trailing");

        assert_eq!(
            decode_nodes(&buffer),
            vec!["10.0.0.1:80".parse::<SocketAddr>().unwrap()]
        );
        assert!(decode_nodes(&buffer[..25]).is_empty());
        assert!(decode_nodes(&[]).is_empty());
    }

    #[test]
    fn values_drop_malformed_entries() {
        // one good peer, one 5-byte entry, one integer
        let parts: &[&[u8]] = &[
            b"l6:",
            &[127, 0, 0, 1, 26, 133],
            b"5:",
            &[1, 2, 3, 4, 5],
            b"i42ee",
        ];
        let encoded = parts.concat();

        let value: Value = serde_bencode::from_bytes(&encoded).unwrap();
        assert_eq!(
            values::from_value(value),
            vec!["127.0.0.1:6789".parse::<SocketAddr>().unwrap()]
        );

        let value: Value = serde_bencode::from_bytes(b"i7e").unwrap();
        assert!(values::from_value(value).is_empty());
    }

    #[test]
    fn nodes_not_a_string() {
        let value: Value = serde_bencode::from_bytes(b"l3:abce").unwrap();
        assert!(nodes_v4::from_value(value).is_empty());
    }
}
