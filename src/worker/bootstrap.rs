use std::{collections::VecDeque, net::SocketAddr};

/// Default number of endpoints kept in the ring.
pub(crate) const BOOTSTRAP_CAPACITY: usize = 100;

/// Entry points used to seed new crawls.
///
/// Starts out with the resolved routers and then keeps the most recent senders of anything we
/// received, useful or not. The oldest entry goes first once the ring is full.
pub(crate) struct BootstrapRing {
    capacity: usize,
    nodes: VecDeque<SocketAddr>,
}

impl BootstrapRing {
    pub fn new<I>(capacity: usize, seed: I) -> Self
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        let mut ring = Self {
            capacity: capacity.max(1),
            nodes: VecDeque::with_capacity(capacity),
        };

        for addr in seed {
            ring.observe(addr);
        }

        ring
    }

    pub fn observe(&mut self, addr: SocketAddr) {
        self.nodes.push_back(addr);

        while self.nodes.len() > self.capacity {
            self.nodes.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<SocketAddr> {
        self.nodes.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(n: u16) -> SocketAddr {
        (Ipv4Addr::new(10, 0, 0, 1), n).into()
    }

    #[test]
    fn seed_is_kept_in_order() {
        let ring = BootstrapRing::new(BOOTSTRAP_CAPACITY, vec![addr(3), addr(1), addr(2)]);
        assert_eq!(ring.snapshot(), vec![addr(3), addr(1), addr(2)]);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut ring = BootstrapRing::new(BOOTSTRAP_CAPACITY, vec![addr(1)]);
        ring.observe(addr(1));
        ring.observe(addr(1));

        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn oldest_is_evicted_past_capacity() {
        let mut ring = BootstrapRing::new(BOOTSTRAP_CAPACITY, None);

        for n in 1..=100 {
            ring.observe(addr(n));
        }

        assert_eq!(ring.len(), 100);
        assert_eq!(ring.snapshot().first(), Some(&addr(1)));

        ring.observe(addr(101));

        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 100);
        assert_eq!(snapshot.first(), Some(&addr(2)));
        assert_eq!(snapshot.last(), Some(&addr(101)));
    }

    #[test]
    fn oversized_seed_is_trimmed() {
        let ring = BootstrapRing::new(2, (1..=5).map(addr));
        assert_eq!(ring.snapshot(), vec![addr(4), addr(5)]);
    }
}
