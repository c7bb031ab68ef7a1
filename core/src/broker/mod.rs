//! # RelayMQ Broker Module
//!
//! TCP server, per-connection sessions and the fan-out scheduler.
//!
//! ## Architecture
//!
//! - [`server`] - [`BusServer`]: the accept loop, the process-wide timeout
//!   timer, and one fan-out pump task per registered topic
//! - [`session`] - [`Session`]: one task per client connection, reading
//!   frames off a [`Framed`](tokio_util::codec::Framed) transport and
//!   dispatching them to the [`TopicManager`](crate::topic::TopicManager)
//!
//! ## Connection lifecycle
//!
//! Every accepted connection gets a process-unique session id, used as the
//! subscriber id for every topic the client joins. Outbound frames for the
//! connection (deliveries, redeliveries, heartbeats) flow through a bounded
//! mpsc queue into a dedicated writer task, so the fan-out pumps never block
//! on a slow socket. When the connection drops, the session unsubscribes
//! itself from every topic; its outstanding state is discarded, not requeued
//! for the remaining subscribers.
//!
//! ## Fan-out
//!
//! Each topic runs one pump task. The pump waits for the topic's ring buffer
//! to signal ready data, lingers briefly so a burst of publishes coalesces
//! into one batch, then flushes: the batch is registered as unacknowledged
//! for every subscriber and sent as one data frame per message. On the
//! redelivery cadence the pump also re-sends every range that has exhausted
//! its timeout window.

pub mod server;
pub mod session;

pub use server::BusServer;
pub use session::Session;
