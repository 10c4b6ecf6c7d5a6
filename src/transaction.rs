use crate::{
    id::InfoHash,
    worker::timer::{Timeout, Timer},
};
use futures_util::{future, StreamExt};
use rand::Rng;
use std::{collections::HashMap, convert::TryInto, time::Duration};
use tokio::time::Instant;

/// How long an unanswered query is remembered.
pub(crate) const TRANSACTION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default width of the transaction id space, in bits.
pub(crate) const DEFAULT_TRANSACTION_ID_BITS: u8 = 12;

/// Identifier of one outstanding query. Travels as 2 bytes, big endian.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TransactionId(u16);

impl TransactionId {
    /// Only exactly 2 bytes make a valid id.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 2] = bytes.try_into().ok()?;
        Some(Self(u16::from_be_bytes(bytes)))
    }

    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl From<u16> for TransactionId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

struct Entry {
    info_hash: InfoHash,
    expiry: Timeout,
}

/// Maps outstanding `get_peers` queries to the crawl they belong to.
///
/// Ids are random within a small space and are not checked for collisions: registering an id that
/// is still pending replaces the older mapping, so a late response to the older query is
/// attributed to the newer one's info hash.
pub(crate) struct TransactionTable {
    timeout: Duration,
    id_space: u32,
    entries: HashMap<TransactionId, Entry>,
    timer: Timer<TransactionId>,
}

impl TransactionTable {
    pub fn new(id_bits: u8, timeout: Duration) -> Self {
        let id_bits = id_bits.clamp(1, 16);

        Self {
            timeout,
            id_space: 1 << id_bits,
            entries: HashMap::new(),
            timer: Timer::new(),
        }
    }

    /// Pick a random id. It may well be in use already.
    pub fn generate(&self) -> TransactionId {
        let id = rand::thread_rng().gen_range(0..self.id_space);
        // `id_space` is at most 2^16 so this never truncates.
        TransactionId(id as u16)
    }

    pub fn register(&mut self, id: TransactionId, info_hash: InfoHash) {
        let expiry = self.timer.schedule_in(self.timeout, id);

        if let Some(old) = self.entries.insert(id, Entry { info_hash, expiry }) {
            log::trace!(
                "Transaction {:?} reassigned from {} to {}",
                id,
                old.info_hash,
                info_hash
            );
            self.timer.cancel(old.expiry);
        }
    }

    /// Consume the mapping for `id`. Returns `None` for unknown, expired or already resolved ids.
    pub fn resolve(&mut self, id: TransactionId) -> Option<InfoHash> {
        let entry = self.entries.remove(&id)?;
        self.timer.cancel(entry.expiry);

        // The event loop may not have processed the expiry yet.
        if entry.expiry.deadline() <= Instant::now() {
            return None;
        }

        Some(entry.info_hash)
    }

    /// Wait for the next registration to time out, remove it and return its id. Never completes
    /// while nothing is registered.
    ///
    /// Cancel safe.
    pub async fn expired(&mut self) -> TransactionId {
        match self.timer.next().await {
            Some(id) => {
                self.entries.remove(&id);
                id
            }
            None => future::pending().await,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
