use crate::{
    id::{InfoHash, NodeId},
    router,
    socket::{Socket, SocketTrait},
    worker::{CrawlError, CrawlHandler, CrawlResult, OneshotTask, Settings, StartCrawl},
};
use std::{
    env,
    future::Future,
    io,
    net::{Ipv4Addr, SocketAddr},
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    net::UdpSocket,
    sync::{mpsc, oneshot},
    task,
};

/// Port the crawler binds to unless `UDP_PORT` or [`CrawlerBuilder::set_port`] says otherwise.
pub const DEFAULT_PORT: u16 = 6881;

/// Name of the environment variable overriding [`DEFAULT_PORT`].
pub const PORT_ENV_VAR: &str = "UDP_PORT";

/// Crawl duration used by [`Crawler::crawl_default`].
pub const DEFAULT_CRAWL_TTL: Duration = Duration::from_secs(20);

/// Handle to a running crawler.
///
/// This type is cheaply cloneable where each clone refers to the same underlying crawler. All
/// clones share one UDP socket, one node id and one set of bootstrap nodes. The crawler stops
/// once every clone and every pending [`Crawl`] has been dropped, or when [`Crawler::shutdown`]
/// is called.
#[derive(Clone)]
pub struct Crawler {
    send: mpsc::UnboundedSender<OneshotTask>,
}

impl Crawler {
    /// Create a new CrawlerBuilder.
    pub fn builder() -> CrawlerBuilder {
        CrawlerBuilder {
            port: None,
            routers: router::DEFAULT_ROUTERS
                .iter()
                .map(|router| router.to_string())
                .collect(),
            nodes: Vec::new(),
            node_id: None,
            settings: Settings::default(),
        }
    }

    fn with_builder(builder: CrawlerBuilder, socket: Socket) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let handler = CrawlHandler::new(
            builder.settings,
            builder.node_id.unwrap_or_else(rand::random),
            socket,
            builder.routers,
            builder.nodes,
            command_rx,
        );

        task::spawn(handler.run());

        Self { send: command_tx }
    }

    /// Crawl the DHT for `info_hash` during `ttl`, then resolve to everything found.
    ///
    /// Fails right away with [`CrawlError::DuplicateJob`] if `info_hash` is already being crawled;
    /// the ongoing crawl is not affected. With `benchmark` set, progress is logged every ten
    /// seconds.
    ///
    /// The crawl starts when this function is called, not when the returned future is first
    /// polled. Dropping the future does not stop the crawl.
    pub fn crawl(&self, info_hash: InfoHash, ttl: Duration, benchmark: bool) -> Crawl {
        let (tx, rx) = oneshot::channel();

        if self
            .send
            .send(OneshotTask::StartCrawl(StartCrawl {
                info_hash,
                ttl,
                benchmark,
                tx,
            }))
            .is_err()
        {
            log::error!("failed to start crawl - CrawlHandler has shut down");
        }

        Crawl {
            rx,
            _send: self.send.clone(),
        }
    }

    /// Same as [`Crawler::crawl`] with [`DEFAULT_CRAWL_TTL`] and no benchmark.
    pub fn crawl_default(&self, info_hash: InfoHash) -> Crawl {
        self.crawl(info_hash, DEFAULT_CRAWL_TTL, false)
    }

    /// Get the local address this crawler is bound to.
    pub async fn local_addr(&self) -> io::Result<SocketAddr> {
        self.request(OneshotTask::GetLocalAddr).await
    }

    /// Current entry points new crawls start from, oldest first.
    pub async fn bootstrap_nodes(&self) -> io::Result<Vec<SocketAddr>> {
        self.request(OneshotTask::GetBootstrapNodes).await
    }

    /// Info hashes being crawled right now.
    pub async fn active_jobs(&self) -> io::Result<Vec<InfoHash>> {
        self.request(OneshotTask::GetActiveJobs).await
    }

    /// Finish every active crawl with what it found so far and stop the crawler. Returns once
    /// the crawler has stopped.
    pub async fn shutdown(&self) {
        self.request(OneshotTask::Shutdown).await.unwrap_or(())
    }

    async fn request<T>(
        &self,
        task: impl FnOnce(oneshot::Sender<T>) -> OneshotTask,
    ) -> io::Result<T> {
        let (tx, rx) = oneshot::channel();

        fn error() -> io::Error {
            io::Error::new(io::ErrorKind::Other, "CrawlHandler has shut down")
        }

        self.send.send(task(tx)).map_err(|_| error())?;

        rx.await.map_err(|_| error())
    }
}

/// Future returned from [`Crawler::crawl()`].
#[must_use = "futures do nothing unless polled"]
pub struct Crawl {
    rx: oneshot::Receiver<Result<CrawlResult, CrawlError>>,
    // Keeps the crawler alive until the crawl completes.
    _send: mpsc::UnboundedSender<OneshotTask>,
}

impl Future for Crawl {
    type Output = Result<CrawlResult, CrawlError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(CrawlError::Shutdown)))
    }
}

// ----------------------------------------------------------------------------//

/// Stores information for initializing a crawler.
#[derive(Debug)]
pub struct CrawlerBuilder {
    port: Option<u16>,
    routers: Vec<String>,
    nodes: Vec<SocketAddr>,
    node_id: Option<NodeId>,
    settings: Settings,
}

impl CrawlerBuilder {
    /// Port to bind to in [`CrawlerBuilder::bind`]. Takes precedence over `UDP_PORT`.
    pub fn set_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Add a router (`host:port`) to seed the bootstrap nodes with. The well-known public
    /// routers are there by default.
    pub fn add_router<T: Into<String>>(mut self, router: T) -> Self {
        self.routers.push(router.into());
        self
    }

    /// Replace the routers. Pass an empty list to start from [`CrawlerBuilder::add_node`]
    /// entries only.
    pub fn set_routers<I, T>(mut self, routers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.routers = routers.into_iter().map(|r| r.into()).collect();
        self
    }

    /// Add an already resolved bootstrap node.
    pub fn add_node(mut self, node_addr: SocketAddr) -> Self {
        self.nodes.push(node_addr);
        self
    }

    /// Add nodes. Same as calling `add_node` multiple times but more convenient in some cases.
    pub fn add_nodes<I>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        self.nodes.extend(nodes);
        self
    }

    /// Set the initial node id. If not provided, a random one is generated. It is replaced by a
    /// random id every ten seconds either way.
    pub fn set_node_id(mut self, id: NodeId) -> Self {
        self.node_id = Some(id);
        self
    }

    /// Width of the random transaction id space, clamped to `1..=16`. Defaults to 12 (4096 ids).
    ///
    /// Ids are not checked for collisions: a response to a query whose id got reused is
    /// attributed to the newer query's crawl.
    pub fn set_transaction_id_bits(mut self, bits: u8) -> Self {
        self.settings.transaction_id_bits = bits;
        self
    }

    /// Limit how many endpoints a single crawl keeps queued. Nodes found while the queue is full
    /// are reported but not queried. Unbounded by default.
    pub fn set_max_queue_len(mut self, len: usize) -> Self {
        self.settings.max_queue_len = Some(len);
        self
    }

    /// How many copies of the bootstrap nodes a new crawl queues. Defaults to 5.
    pub fn set_bootstrap_copies(mut self, copies: usize) -> Self {
        self.settings.bootstrap_copies = copies;
        self
    }

    /// Time between two queries of one crawl. Defaults to 1 ms.
    pub fn set_dispatch_interval(mut self, interval: Duration) -> Self {
        self.settings.dispatch_interval = interval;
        self
    }

    /// Bind a UDP socket on all IPv4 interfaces and start the crawler on it. The port is the one
    /// given to [`CrawlerBuilder::set_port`], else `UDP_PORT`, else [`DEFAULT_PORT`].
    pub async fn bind(self) -> io::Result<Crawler> {
        let port = match self.port {
            Some(port) => port,
            None => port_from_env()?,
        };

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        self.start(socket)
    }

    /// Start a crawler with the current configuration on the provided socket.
    /// Fails only if `socket.local_addr()` fails.
    pub fn start<S: SocketTrait + Send + Sync + 'static>(self, socket: S) -> io::Result<Crawler> {
        let socket = Socket::new(socket)?;
        Ok(Crawler::with_builder(self, socket))
    }
}

fn port_from_env() -> io::Result<u16> {
    match env::var(PORT_ENV_VAR) {
        Ok(value) => value.trim().parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{PORT_ENV_VAR} is not a valid port: {value:?}"),
            )
        }),
        Err(_) => Ok(DEFAULT_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let builder = Crawler::builder();

        assert_eq!(builder.port, None);
        assert_eq!(builder.routers.len(), 3);
        assert!(builder.nodes.is_empty());
        assert_eq!(builder.settings.transaction_id_bits, 12);
        assert_eq!(builder.settings.bootstrap_copies, 5);
        assert_eq!(builder.settings.bootstrap_capacity, 100);
        assert_eq!(builder.settings.dispatch_interval, Duration::from_millis(1));
        assert_eq!(builder.settings.max_queue_len, None);
    }

    #[test]
    fn port_env_override() {
        // Only this test touches the variable.
        env::remove_var(PORT_ENV_VAR);
        assert_eq!(port_from_env().unwrap(), DEFAULT_PORT);

        env::set_var(PORT_ENV_VAR, "7000");
        assert_eq!(port_from_env().unwrap(), 7000);

        env::set_var(PORT_ENV_VAR, "seventy");
        assert!(port_from_env().is_err());

        env::remove_var(PORT_ENV_VAR);
    }

    #[tokio::test]
    async fn bind_reports_local_addr() {
        let crawler = Crawler::builder()
            .set_routers(Vec::<String>::new())
            .set_port(0)
            .bind()
            .await
            .unwrap();

        let addr = crawler.local_addr().await.unwrap();
        assert!(addr.is_ipv4());
        assert_ne!(addr.port(), 0);
    }
}
