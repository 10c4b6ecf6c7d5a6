//! Helpers shared by the unit tests.

use crate::{
    compact,
    id::{InfoHash, NodeId},
    message::{Message, MessageBody, Request},
    socket::SocketTrait,
};
use async_trait::async_trait;
use serde_bencode::value::Value;
use std::{
    collections::HashMap,
    io,
    net::{Ipv4Addr, SocketAddr},
};
use tokio::sync::mpsc;

type Datagram = (Vec<u8>, SocketAddr);

/// In-memory socket. Everything sent through it shows up on the paired [`Network`], everything
/// the `Network` delivers is received by it.
pub(crate) struct MockSocket {
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Datagram>,
    inbound: mpsc::UnboundedReceiver<Datagram>,
}

/// The other end of a [`MockSocket`].
pub(crate) struct Network {
    outbound: mpsc::UnboundedReceiver<Datagram>,
    inbound: mpsc::UnboundedSender<Datagram>,
}

pub(crate) fn mock_socket() -> (MockSocket, Network) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let socket = MockSocket {
        addr: (Ipv4Addr::LOCALHOST, 6881).into(),
        outbound: outbound_tx,
        inbound: inbound_rx,
    };
    let network = Network {
        outbound: outbound_rx,
        inbound: inbound_tx,
    };

    (socket, network)
}

#[async_trait]
impl SocketTrait for MockSocket {
    async fn send_to(&self, buf: &[u8], target: &SocketAddr) -> io::Result<()> {
        self.outbound
            .send((buf.to_vec(), *target))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "network is gone"))
    }

    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        match self.inbound.recv().await {
            Some((bytes, from)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok((len, from))
            }
            None => futures_util::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

/// A `get_peers` query seen on the network.
#[derive(Debug)]
pub(crate) struct SentQuery {
    pub transaction_id: Vec<u8>,
    pub id: NodeId,
    pub info_hash: InfoHash,
    pub to: SocketAddr,
}

impl Network {
    /// Next query the crawler sent.
    pub async fn next_query(&mut self) -> SentQuery {
        let (bytes, to) = self.outbound.recv().await.expect("socket dropped");
        let message = Message::decode(&bytes).expect("crawler sent invalid bencode");

        match message.body {
            MessageBody::Request(Request::GetPeers(request)) => SentQuery {
                transaction_id: message.transaction_id,
                id: request.id,
                info_hash: request.info_hash,
                to,
            },
        }
    }

    /// Everything sent so far, without waiting.
    pub fn drain(&mut self) -> Vec<SentQuery> {
        let mut queries = Vec::new();

        while let Ok((bytes, to)) = self.outbound.try_recv() {
            if let Ok(Message {
                transaction_id,
                body: MessageBody::Request(Request::GetPeers(request)),
            }) = Message::decode(&bytes)
            {
                queries.push(SentQuery {
                    transaction_id,
                    id: request.id,
                    info_hash: request.info_hash,
                    to,
                });
            }
        }

        queries
    }

    pub fn deliver(&self, bytes: Vec<u8>, from: SocketAddr) {
        self.inbound.send((bytes, from)).unwrap_or(());
    }
}

/// Bencoded `get_peers` response carrying the given peers and nodes.
pub(crate) fn get_peers_response(
    transaction_id: &[u8],
    values: &[SocketAddr],
    nodes: &[SocketAddr],
) -> Vec<u8> {
    let mut body = HashMap::new();
    body.insert(b"id".to_vec(), Value::Bytes(vec![b'x'; 20]));
    body.insert(b"token".to_vec(), Value::Bytes(b"aoeusnth".to_vec()));

    if !values.is_empty() {
        let values = values
            .iter()
            .filter_map(compact::encode_socket_addr)
            .map(|bytes| Value::Bytes(bytes.to_vec()))
            .collect();
        body.insert(b"values".to_vec(), Value::List(values));
    }

    if !nodes.is_empty() {
        let mut buffer = Vec::new();
        for (index, node) in nodes.iter().enumerate() {
            buffer.extend([index as u8; 20]);
            buffer.extend(compact::encode_socket_addr(node).unwrap_or_default());
        }
        body.insert(b"nodes".to_vec(), Value::Bytes(buffer));
    }

    let mut message = HashMap::new();
    message.insert(b"t".to_vec(), Value::Bytes(transaction_id.to_vec()));
    message.insert(b"y".to_vec(), Value::Bytes(b"r".to_vec()));
    message.insert(b"r".to_vec(), Value::Dict(body));

    serde_bencode::to_bytes(&Value::Dict(message)).unwrap()
}

pub(crate) fn addr(a: u8, b: u8, c: u8, d: u8, port: u16) -> SocketAddr {
    (Ipv4Addr::new(a, b, c, d), port).into()
}
