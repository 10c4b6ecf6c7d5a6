use super::{
    bootstrap::BootstrapRing,
    identity::NodeIdentity,
    job::Job,
    resolve,
    timer::Timer,
    CrawlError, OneshotTask, ScheduledTaskCheck, Settings, StartCrawl, WorkerError,
};
use crate::{
    id::{InfoHash, NodeId},
    message::{Inbound, Message},
    socket::Socket,
    transaction::{TransactionId, TransactionTable},
};
use futures_util::StreamExt;
use std::{collections::HashMap, net::SocketAddr};
use tokio::{
    select,
    sync::{mpsc, oneshot},
};

/// Owns all the state of one crawler and drives it from a single task.
pub(crate) struct CrawlHandler {
    running: bool,
    settings: Settings,
    command_rx: mpsc::UnboundedReceiver<OneshotTask>,
    timer: Timer<ScheduledTaskCheck>,
    socket: Socket,
    identity: NodeIdentity,
    routers: Vec<String>,
    bootstrap: BootstrapRing,
    transactions: TransactionTable,
    jobs: HashMap<InfoHash, Job>,
    shutdown_txs: Vec<oneshot::Sender<()>>,
}

impl CrawlHandler {
    pub fn new(
        settings: Settings,
        node_id: NodeId,
        socket: Socket,
        routers: Vec<String>,
        nodes: Vec<SocketAddr>,
        command_rx: mpsc::UnboundedReceiver<OneshotTask>,
    ) -> Self {
        let bootstrap = BootstrapRing::new(settings.bootstrap_capacity, nodes);
        let transactions =
            TransactionTable::new(settings.transaction_id_bits, settings.transaction_timeout);

        Self {
            running: true,
            settings,
            command_rx,
            timer: Timer::new(),
            socket,
            identity: NodeIdentity::new(node_id),
            routers,
            bootstrap,
            transactions,
            jobs: HashMap::new(),
            shutdown_txs: Vec::new(),
        }
    }

    pub async fn run(mut self) {
        // Commands sent in the meantime wait in the channel, so no crawl starts with an empty
        // ring just because DNS was slow.
        for addr in resolve(&self.routers).await {
            self.bootstrap.observe(addr);
        }

        log::debug!(
            "Crawler listening on {} with {} bootstrap nodes",
            self.socket.local_addr(),
            self.bootstrap.len()
        );

        self.timer.schedule_in(
            self.settings.rotation_interval,
            ScheduledTaskCheck::RotateNodeId,
        );

        while self.running {
            self.run_once().await
        }

        self.finish_all_jobs();

        for tx in self.shutdown_txs.drain(..) {
            tx.send(()).unwrap_or(())
        }
    }

    async fn run_once(&mut self) {
        select! {
            token = self.timer.next(), if !self.timer.is_empty() => {
                if let Some(token) = token {
                    self.handle_timeout(token).await
                }
            }
            id = self.transactions.expired() => {
                log::trace!("Transaction {:?} expired", id);
            }
            command = self.command_rx.recv() => {
                if let Some(command) = command {
                    self.handle_command(command)
                } else {
                    self.shutdown()
                }
            }
            message = self.socket.recv() => {
                match message {
                    Ok((bytes, addr)) => if let Err(error) = self.handle_incoming(&bytes, addr) {
                        log::trace!("Dropped message from {addr}: {error}");
                    }
                    Err(error) => log::warn!("Failed to receive incoming message: {error}"),
                }
            }
        }
    }

    fn handle_command(&mut self, task: OneshotTask) {
        match task {
            OneshotTask::StartCrawl(start) => self.handle_start_crawl(start),
            OneshotTask::GetLocalAddr(tx) => tx.send(self.socket.local_addr()).unwrap_or(()),
            OneshotTask::GetBootstrapNodes(tx) => tx.send(self.bootstrap.snapshot()).unwrap_or(()),
            OneshotTask::GetActiveJobs(tx) => {
                tx.send(self.jobs.keys().copied().collect()).unwrap_or(())
            }
            OneshotTask::Shutdown(tx) => {
                self.shutdown_txs.push(tx);
                self.shutdown();
            }
        }
    }

    async fn handle_timeout(&mut self, token: ScheduledTaskCheck) {
        match token {
            ScheduledTaskCheck::Dispatch(info_hash) => {
                // Nothing is retried. A lost query only means fewer results.
                if let Err(error) = self.handle_dispatch(info_hash).await {
                    log::debug!("{info_hash}: Failed to send get_peers: {error}");
                }
            }
            ScheduledTaskCheck::JobExpired(info_hash) => self.finish_job(info_hash),
            ScheduledTaskCheck::Report(info_hash) => self.handle_report(info_hash),
            ScheduledTaskCheck::RotateNodeId => {
                let id = self.identity.rotate();
                log::trace!("Rotated node id to {id}");

                self.timer.schedule_in(
                    self.settings.rotation_interval,
                    ScheduledTaskCheck::RotateNodeId,
                );
            }
        }
    }

    fn handle_start_crawl(&mut self, start: StartCrawl) {
        let StartCrawl {
            info_hash,
            ttl,
            benchmark,
            tx,
        } = start;

        if self.jobs.contains_key(&info_hash) {
            log::info!("{info_hash}: Crawl already in progress");
            tx.send(Err(CrawlError::DuplicateJob(info_hash)))
                .unwrap_or(());
            return;
        }

        let seed = self.bootstrap.snapshot();
        let mut job = Job::new(
            info_hash,
            ttl,
            &seed,
            self.settings.bootstrap_copies,
            self.settings.max_queue_len,
            tx,
        );

        log::info!(
            "[START] Crawling {info_hash} for {:?} from {} bootstrap nodes",
            job.ttl(),
            seed.len()
        );

        job.expiry = Some(
            self.timer
                .schedule_in(ttl, ScheduledTaskCheck::JobExpired(info_hash)),
        );
        job.dispatch = Some(self.timer.schedule_in(
            self.settings.dispatch_interval,
            ScheduledTaskCheck::Dispatch(info_hash),
        ));

        if benchmark {
            job.report = Some(self.timer.schedule_in(
                self.settings.report_interval,
                ScheduledTaskCheck::Report(info_hash),
            ));
        }

        self.jobs.insert(info_hash, job);
    }

    /// Send at most one query for the job and schedule the next tick.
    async fn handle_dispatch(&mut self, info_hash: InfoHash) -> Result<(), WorkerError> {
        let job = if let Some(job) = self.jobs.get_mut(&info_hash) {
            job
        } else {
            return Ok(());
        };

        job.dispatch = Some(self.timer.schedule_in(
            self.settings.dispatch_interval,
            ScheduledTaskCheck::Dispatch(info_hash),
        ));

        let addr = if let Some(addr) = job.next_target() {
            addr
        } else {
            return Ok(());
        };

        if addr.port() == 0 {
            log::trace!("{info_hash}: Skipping {addr}, invalid port");
            return Ok(());
        }

        let transaction_id = self.transactions.generate();
        self.transactions.register(transaction_id, info_hash);

        let message = Message::get_peers(transaction_id, self.identity.current(), info_hash);

        self.socket.send(&message.encode(), addr).await?;

        Ok(())
    }

    fn handle_report(&mut self, info_hash: InfoHash) {
        let job = if let Some(job) = self.jobs.get_mut(&info_hash) {
            job
        } else {
            return;
        };

        log::info!(
            "{info_hash}: {} peers, {} nodes, {} queued",
            job.peer_count(),
            job.node_count(),
            job.queue_len()
        );

        job.report = Some(self.timer.schedule_in(
            self.settings.report_interval,
            ScheduledTaskCheck::Report(info_hash),
        ));
    }

    fn handle_incoming(&mut self, bytes: &[u8], addr: SocketAddr) -> Result<(), WorkerError> {
        // Anyone who talks to us is a candidate entry point for future crawls.
        self.bootstrap.observe(addr);

        let message = Inbound::decode(bytes).map_err(WorkerError::InvalidBencode)?;

        log::trace!("Received {message:?} from {addr}");

        let transaction_id = message
            .transaction_id
            .as_deref()
            .and_then(TransactionId::from_bytes)
            .ok_or(WorkerError::InvalidTransactionId)?;
        let info_hash = self
            .transactions
            .resolve(transaction_id)
            .ok_or(WorkerError::UnknownTransaction)?;

        let job = if let Some(job) = self.jobs.get_mut(&info_hash) {
            job
        } else {
            return Ok(());
        };

        if let Some(response) = message.response {
            let new_peers = job.add_peers(response.values);
            let new_nodes = job.add_nodes(response.nodes);

            log::trace!("{info_hash}: {addr} sent {new_peers} new peers, {new_nodes} new nodes");
        }

        Ok(())
    }

    fn finish_job(&mut self, info_hash: InfoHash) {
        let job = if let Some(job) = self.jobs.remove(&info_hash) {
            job
        } else {
            return;
        };

        for timeout in [job.dispatch, job.expiry, job.report].into_iter().flatten() {
            self.timer.cancel(timeout);
        }

        job.finish();
    }

    fn finish_all_jobs(&mut self) {
        let info_hashes: Vec<_> = self.jobs.keys().copied().collect();

        for info_hash in info_hashes {
            self.finish_job(info_hash);
        }
    }

    fn shutdown(&mut self) {
        self.running = false;
    }
}
