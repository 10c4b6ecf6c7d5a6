use crate::id::NodeId;
use std::time::Duration;

/// How often the crawler picks a new node id.
pub(crate) const ROTATION_INTERVAL: Duration = Duration::from_secs(10);

/// The node id put in every outgoing query.
///
/// The crawler sends a lot of queries, so it keeps changing its id to make it less likely that
/// remote nodes throttle or ban it.
pub(crate) struct NodeIdentity {
    current: NodeId,
}

impl NodeIdentity {
    pub fn new(initial: NodeId) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn rotate(&mut self) -> NodeId {
        self.current = rand::random();
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_replaces_id() {
        let initial = NodeId::from(*b"abcdefghij0123456789");
        let mut identity = NodeIdentity::new(initial);
        assert_eq!(identity.current(), initial);

        let rotated = identity.rotate();
        assert_ne!(rotated, initial);
        assert_eq!(identity.current(), rotated);
    }
}
