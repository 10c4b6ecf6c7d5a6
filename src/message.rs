use crate::{
    compact,
    id::{InfoHash, NodeId},
    transaction::TransactionId,
};
use serde::{de::Deserializer, Deserialize, Serialize};
use serde_bencode::value::Value;
use std::net::SocketAddr;

/// Outgoing KRPC message. The crawler only ever sends `get_peers` queries.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub(crate) struct Message {
    #[serde(rename = "t", with = "serde_bytes")]
    pub transaction_id: Vec<u8>,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    pub fn get_peers(transaction_id: TransactionId, id: NodeId, info_hash: InfoHash) -> Self {
        Self {
            transaction_id: transaction_id.to_bytes().to_vec(),
            body: MessageBody::Request(Request::GetPeers(GetPeersRequest { id, info_hash })),
        }
    }

    /// Decode the message from bencode.
    #[cfg(test)]
    pub fn decode(input: &[u8]) -> Result<Self, serde_bencode::Error> {
        serde_bencode::from_bytes(input)
    }

    /// Encode the message into bencode.
    pub fn encode(&self) -> Vec<u8> {
        // `expect` should be fine here as there should be no reason why a serialization into a
        // `Vec` would fail unless we have a bug somewhere.
        serde_bencode::to_bytes(self).expect("failed to serialize message")
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "y")]
pub(crate) enum MessageBody {
    #[serde(rename = "q")]
    Request(Request),
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "q", content = "a")]
#[serde(rename_all = "snake_case")]
pub(crate) enum Request {
    GetPeers(GetPeersRequest),
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub(crate) struct GetPeersRequest {
    pub id: NodeId,
    pub info_hash: InfoHash,
}

// ----------------------------------------------------------------------------//

/// Incoming KRPC message, reduced to the fields the crawler looks at.
///
/// Remote nodes send all kinds of things (queries, errors, responses missing mandatory keys,
/// values of the wrong type). Everything except `t`, `r.values` and `r.nodes` is ignored and
/// those three are read leniently, so the only way decoding fails is input that is not a
/// bencoded dictionary at all.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
pub(crate) struct Inbound {
    #[serde(rename = "t", default, deserialize_with = "lenient::bytes")]
    pub transaction_id: Option<Vec<u8>>,
    #[serde(rename = "r", default, deserialize_with = "lenient::response")]
    pub response: Option<Response>,
}

impl Inbound {
    /// Decode an untrusted datagram. Input is checked by [`check_bencode`] first, so hostile
    /// length prefixes or nesting are rejected before the bencode deserializer acts on them.
    pub fn decode(input: &[u8]) -> Result<Self, serde_bencode::Error> {
        check_bencode(input).map_err(<serde_bencode::Error as serde::de::Error>::custom)?;
        serde_bencode::from_bytes(input)
    }
}

/// Deepest list/dictionary nesting accepted from the network.
const MAX_NESTING_DEPTH: usize = 32;

/// Single pass over bencoded input without allocating. Fails on byte strings claiming more bytes
/// than what is left, nesting deeper than [`MAX_NESTING_DEPTH`] and bytes that cannot start a
/// value. Everything else is left to the deserializer.
fn check_bencode(input: &[u8]) -> Result<(), &'static str> {
    let mut depth = 0usize;
    let mut pos = 0;

    while pos < input.len() {
        match input[pos] {
            b'l' | b'd' => {
                depth += 1;

                if depth > MAX_NESTING_DEPTH {
                    return Err("nesting too deep");
                }

                pos += 1;
            }
            b'e' => {
                depth = depth.checked_sub(1).ok_or("unexpected end marker")?;
                pos += 1;
            }
            b'i' => {
                let len = input[pos..]
                    .iter()
                    .position(|b| *b == b'e')
                    .ok_or("unterminated integer")?;
                pos += len + 1;
            }
            b'0'..=b'9' => {
                let colon = input[pos..]
                    .iter()
                    .position(|b| *b == b':')
                    .ok_or("unterminated string length")?;
                let len: usize = std::str::from_utf8(&input[pos..pos + colon])
                    .ok()
                    .and_then(|digits| digits.parse().ok())
                    .ok_or("invalid string length")?;

                pos += colon + 1;

                if len > input.len() - pos {
                    return Err("string longer than input");
                }

                pos += len;
            }
            _ => return Err("unexpected byte"),
        }
    }

    Ok(())
}

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub(crate) struct Response {
    /// Peers from `values`.
    pub values: Vec<SocketAddr>,
    /// Node endpoints from `nodes`.
    pub nodes: Vec<SocketAddr>,
}

mod lenient {
    use super::*;

    pub(super) fn bytes<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Value::deserialize(d)? {
            Value::Bytes(bytes) => Ok(Some(bytes)),
            _ => Ok(None),
        }
    }

    pub(super) fn response<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Response>, D::Error> {
        let mut dict = match Value::deserialize(d)? {
            Value::Dict(dict) => dict,
            _ => return Ok(None),
        };

        let values = dict
            .remove(&b"values"[..])
            .map(compact::values::from_value)
            .unwrap_or_default();
        let nodes = dict
            .remove(&b"nodes"[..])
            .map(compact::nodes_v4::from_value)
            .unwrap_or_default();

        Ok(Some(Response { values, nodes }))
    }
}
