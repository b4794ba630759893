//! The upstream market-data feed: wire messages, ingest statistics, and the
//! long-lived ingestor task.

pub mod ingestor;
pub mod messages;
pub mod statistics;

pub use ingestor::{Ingestor, IngestorSettings};
pub use messages::SubscribeFrame;
pub use statistics::IngestStats;
