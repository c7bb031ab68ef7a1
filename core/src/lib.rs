//! # RelayMQ Core Library
//!
//! RelayMQ is a TCP-based publish/subscribe message bus with at-least-once
//! delivery guarantees. This crate provides the broker: per-topic ring
//! buffers, range-based acknowledgement tracking with a consensus release
//! rule, timer-driven redelivery, and the compact binary wire protocol.
//!
//! ## Delivery model
//!
//! Every message published to a topic is fanned out to all current
//! subscribers of that topic. A ring-buffer slot is reclaimed only once
//! *every* subscriber has acknowledged the sequence id it holds (consensus
//! release). Ranges that stay unacknowledged for a full timeout window are
//! moved into a per-subscriber redelivery set and re-sent until acknowledged.
//!
//! ## Architecture Overview
//!
//! - [`topic`] - Per-topic ring buffers and the topic manager
//! - [`ack`] - Interval bookkeeping, epoch buckets and the consensus rule
//! - [`protocol`] - Wire framing (9-byte header + delimiter-terminated frames)
//! - [`broker`] - TCP server, per-connection sessions and fan-out scheduling
//! - [`metrics`] - Lock-free atomic counters for operational visibility
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relaymq::{BusConfig, BusServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BusConfig {
//!         port: 6380,
//!         topics: vec![1, 2],
//!         ..Default::default()
//!     };
//!
//!     let server = BusServer::new(config)?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod ack;
pub mod broker;
pub mod config;
pub mod metrics;
pub mod protocol;
pub mod topic;

pub use ack::{AckRange, AckTracker, IntervalSet};
pub use broker::BusServer;
pub use config::BusConfig;
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use protocol::{BusFrameCodec, Epoch, Frame, FrameKind, SeqId, SubscriberId, TopicId};
pub use topic::{FlushBatch, TopicManager, TopicRingBuffer};

use thiserror::Error;

/// RelayMQ error types.
///
/// # Error Categories
///
/// - **Overflow**: a publisher found no free ring-buffer slot within the
///   bounded wait. Visible backpressure, never a silent drop.
/// - **Unknown ids**: an operation referenced a topic or subscriber that is
///   not registered. Protocol/programming error, surfaced immediately.
/// - **MalformedFrame**: header or ack-range parse failure. Terminates the
///   offending connection, not the process.
#[derive(Debug, Error)]
pub enum BusError {
    /// Ring buffer had no free capacity within the bounded publish wait
    #[error("topic {0} ring buffer overflow")]
    Overflow(TopicId),

    /// Operation referenced a topic id that was never registered
    #[error("unknown topic {0}")]
    UnknownTopic(TopicId),

    /// Operation referenced a subscriber that is not registered for the topic
    #[error("unknown subscriber {subscriber} for topic {topic}")]
    UnknownSubscriber {
        topic: TopicId,
        subscriber: SubscriberId,
    },

    /// Header, delimiter or ack-range body could not be parsed
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Socket and listener errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration validation and parsing errors
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias used throughout the RelayMQ codebase.
pub type Result<T> = std::result::Result<T, BusError>;
