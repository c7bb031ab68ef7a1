//! # RelayMQ Client Library
//!
//! An async Rust client for the RelayMQ message bus.
//!
//! ## Features
//!
//! - **Async/Await**: Built on tokio for non-blocking I/O
//! - **Zero-Copy Payloads**: Message bodies are `bytes::Bytes` end to end
//! - **Ack Coalescing**: Per-message acks are merged into range acks in the
//!   background, one frame per contiguous run
//! - **At-Least-Once**: Unacked deliveries come back via bus redelivery
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relaymq_client::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = BusClient::connect(
//!         ClientConfig::builder().addr("localhost:9155").build(),
//!     )
//!     .await?;
//!
//!     let mut subscription = client.subscribe(1).await?;
//!     client.publish(1, "hello relaymq").await?;
//!
//!     while let Some(delivery) = subscription.recv().await {
//!         println!("received seq {}: {:?}", delivery.seq, delivery.payload);
//!         delivery.ack().await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod coalescer;
pub mod config;
pub mod connection;
pub mod error;

pub use client::{BusClient, Delivery, Subscription};
pub use coalescer::AckBatcher;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::BusClientError;

// Wire-level types shared with the bus.
pub use relaymq::{AckRange, Epoch, Frame, FrameKind, SeqId, TopicId};

/// Client library result type
pub type Result<T> = std::result::Result<T, BusClientError>;

/// Client library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
