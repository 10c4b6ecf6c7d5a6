//! Time-boxed `get_peers` crawler for the Bittorrent Mainline Distributed Hash Table.
//!
//! A [`Crawler`] owns one UDP socket. Every crawl floods `get_peers` queries for an info hash,
//! starting from a small set of bootstrap nodes and fanning out to every node the responses
//! mention, until its time to live runs out. It then resolves to all peers and nodes it found.
//! Several crawls may run on the same crawler as long as their info hashes differ.
//!
//! The crawler does not answer queries, keeps no routing table and never announces.

pub mod router;

mod builder;
mod compact;
mod id;
mod message;
mod socket;
#[cfg(test)]
mod test;
mod transaction;
mod worker;

pub use crate::builder::{
    Crawl, Crawler, CrawlerBuilder, DEFAULT_CRAWL_TTL, DEFAULT_PORT, PORT_ENV_VAR,
};
pub use crate::id::{InfoHash, LengthError, NodeId, ParseInfoHashError, INFO_HASH_LEN};
pub use crate::socket::SocketTrait;
pub use crate::worker::{CrawlError, CrawlResult};
