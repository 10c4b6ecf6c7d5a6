use super::{timer::Timeout, CrawlError, CrawlResult};
use crate::id::InfoHash;
use std::{
    collections::{HashSet, VecDeque},
    net::SocketAddr,
    time::Duration,
};
use tokio::{sync::oneshot, time::Instant};

pub(crate) type ResultSender = oneshot::Sender<Result<CrawlResult, CrawlError>>;

/// Endpoints in the order they were first seen.
#[derive(Default)]
struct OrderedSet {
    order: Vec<SocketAddr>,
    seen: HashSet<SocketAddr>,
}

impl OrderedSet {
    fn insert(&mut self, addr: SocketAddr) -> bool {
        if self.seen.insert(addr) {
            self.order.push(addr);
            true
        } else {
            false
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// State of the crawl for one info hash.
pub(crate) struct Job {
    info_hash: InfoHash,
    started: Instant,
    ttl: Duration,
    peers: OrderedSet,
    nodes: OrderedSet,
    // Endpoints still to be queried. May contain duplicates.
    queue: VecDeque<SocketAddr>,
    max_queue_len: Option<usize>,
    tx: ResultSender,

    // Timers that belong to this job and must be cancelled when it ends.
    pub dispatch: Option<Timeout>,
    pub expiry: Option<Timeout>,
    pub report: Option<Timeout>,
}

impl Job {
    /// Create a job whose queue holds `copies` back to back copies of `seed`. Sending everything
    /// several times makes up for lost packets and routers that happen to be down.
    pub fn new(
        info_hash: InfoHash,
        ttl: Duration,
        seed: &[SocketAddr],
        copies: usize,
        max_queue_len: Option<usize>,
        tx: ResultSender,
    ) -> Self {
        let mut queue = VecDeque::with_capacity(seed.len() * copies);

        for _ in 0..copies {
            queue.extend(seed.iter().copied());
        }

        Self {
            info_hash,
            started: Instant::now(),
            ttl,
            peers: OrderedSet::default(),
            nodes: OrderedSet::default(),
            queue,
            max_queue_len,
            tx,
            dispatch: None,
            expiry: None,
            report: None,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Next endpoint to send a `get_peers` to.
    pub fn next_target(&mut self) -> Option<SocketAddr> {
        self.queue.pop_front()
    }

    /// Record peers. They are results, they don't get queried. Returns how many were new.
    pub fn add_peers<I>(&mut self, peers: I) -> usize
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        peers
            .into_iter()
            .filter(|peer| self.peers.insert(*peer))
            .count()
    }

    /// Record nodes and queue the new ones for querying. Returns how many were new.
    pub fn add_nodes<I>(&mut self, nodes: I) -> usize
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        let mut added = 0;

        for node in nodes {
            if !self.nodes.insert(node) {
                continue;
            }

            added += 1;

            if self
                .max_queue_len
                .map_or(true, |max| self.queue.len() < max)
            {
                self.queue.push_back(node);
            } else {
                log::trace!("{}: Queue full, not querying {node}", self.info_hash);
            }
        }

        added
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Hand the result over to whoever started the crawl. Consumes the job so this happens once.
    pub fn finish(self) -> CrawlResult {
        let result = CrawlResult {
            peers: self.peers.order,
            nodes: self.nodes.order,
        };

        log::info!(
            "[DONE] Crawled {} in {:?}: found {} peers and {} nodes",
            self.info_hash,
            self.started.elapsed(),
            result.peers.len(),
            result.nodes.len()
        );

        // The receiver may have been dropped, the crawl is over either way.
        self.tx.send(Ok(result.clone())).unwrap_or(());

        result
    }
}
