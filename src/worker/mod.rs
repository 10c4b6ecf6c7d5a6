pub(crate) use self::handler::CrawlHandler;
use crate::{
    id::InfoHash,
    transaction::{DEFAULT_TRANSACTION_ID_BITS, TRANSACTION_TIMEOUT},
};
use serde::Serialize;
use std::{io, net::SocketAddr, time::Duration};
use thiserror::Error;
use tokio::sync::oneshot;

pub(crate) mod bootstrap;
mod handler;
pub(crate) mod identity;
mod job;
pub(crate) mod timer;

/// Time between two queries of the same crawl.
pub(crate) const DISPATCH_INTERVAL: Duration = Duration::from_millis(1);

/// Time between two progress lines of a benchmarked crawl.
pub(crate) const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// How many times the bootstrap ring is copied into the queue of a new crawl.
pub(crate) const BOOTSTRAP_COPIES: usize = 5;

/// Tunables of a crawler instance.
#[derive(Clone, Debug)]
pub(crate) struct Settings {
    pub dispatch_interval: Duration,
    pub report_interval: Duration,
    pub rotation_interval: Duration,
    pub transaction_timeout: Duration,
    pub transaction_id_bits: u8,
    pub bootstrap_capacity: usize,
    pub bootstrap_copies: usize,
    pub max_queue_len: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dispatch_interval: DISPATCH_INTERVAL,
            report_interval: REPORT_INTERVAL,
            rotation_interval: identity::ROTATION_INTERVAL,
            transaction_timeout: TRANSACTION_TIMEOUT,
            transaction_id_bits: DEFAULT_TRANSACTION_ID_BITS,
            bootstrap_capacity: bootstrap::BOOTSTRAP_CAPACITY,
            bootstrap_copies: BOOTSTRAP_COPIES,
            max_queue_len: None,
        }
    }
}

/// Everything a finished crawl found, in discovery order and without duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CrawlResult {
    /// Peers announced for the info hash.
    pub peers: Vec<SocketAddr>,
    /// DHT nodes met along the way.
    pub nodes: Vec<SocketAddr>,
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("crawl of {0} is already in progress")]
    DuplicateJob(InfoHash),
    #[error("crawler has shut down")]
    Shutdown,
}

/// Task that our crawler will execute immediately.
pub(crate) enum OneshotTask {
    /// Start crawling an info hash.
    StartCrawl(StartCrawl),
    /// Get the local address the socket is bound to.
    GetLocalAddr(oneshot::Sender<SocketAddr>),
    /// Get the current content of the bootstrap ring.
    GetBootstrapNodes(oneshot::Sender<Vec<SocketAddr>>),
    /// Get the info hashes being crawled right now.
    GetActiveJobs(oneshot::Sender<Vec<InfoHash>>),
    /// Finish all crawls and stop.
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct StartCrawl {
    pub info_hash: InfoHash,
    pub ttl: Duration,
    pub benchmark: bool,
    pub tx: oneshot::Sender<Result<CrawlResult, CrawlError>>,
}

/// Task that our crawler will execute some time later.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ScheduledTaskCheck {
    /// Send the next query of a crawl.
    Dispatch(InfoHash),
    /// Crawl reached its time to live.
    JobExpired(InfoHash),
    /// Log progress of a crawl.
    Report(InfoHash),
    /// Pick a new node id.
    RotateNodeId,
}

#[derive(Error, Debug)]
pub(crate) enum WorkerError {
    #[error("invalid bencode data")]
    InvalidBencode(#[source] serde_bencode::Error),
    #[error("invalid transaction id")]
    InvalidTransactionId,
    #[error("unknown or expired transaction")]
    UnknownTransaction,
    #[error("socket error: {0}")]
    SocketError(#[from] io::Error),
}

/// Resolve `host:port` strings, keeping IPv4 addresses only. Failures are logged and skipped.
pub(crate) async fn resolve<I, T>(routers: I) -> Vec<SocketAddr>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let routers: Vec<String> = routers.into_iter().map(|r| r.as_ref().to_owned()).collect();

    futures_util::future::join_all(routers.iter().map(|router| async move {
        tokio::net::lookup_host(router.as_str())
            .await
            .map_err(|error| log::warn!("Failed to resolve router {router}: {error}"))
    }))
    .await
    .into_iter()
    .filter_map(|result| result.ok())
    .flatten()
    .filter(|addr| addr.is_ipv4())
    .collect()
}
