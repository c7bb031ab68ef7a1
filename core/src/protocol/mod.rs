//! # RelayMQ Wire Protocol
//!
//! Compact binary framing shared by the broker and the client library.
//!
//! Every frame starts with a fixed 9-byte big-endian header and ends with a
//! 4-byte delimiter:
//!
//! ```text
//! byte 0      frame kind ('0' heartbeat, '1' data, '2' subscribe, '3' ack, '4' connect)
//! bytes 1-2   topic id (u16)
//! bytes 3-6   sequence id (u32)
//! bytes 7-8   epoch index (u16)
//! bytes 9..   body (opaque payload, or ASCII "first-last" for ack frames)
//! trailing    delimiter "<\r\n>"
//! ```
//!
//! Header bytes are free-form and may coincidentally contain delimiter
//! bytes, so decoders skip exactly [`HEADER_LEN`] bytes before scanning for
//! the delimiter.
//!
//! ## Modules
//!
//! - [`frame`] - Frame types and the [`BusFrameCodec`] codec

pub mod frame;

pub use frame::*;

/// Identifies a topic (message class) on the wire.
pub type TopicId = u16;
/// Sequence id assigned by the ring buffer at publish time.
pub type SeqId = u32;
/// Rotating timeout-bucket index stamped on outgoing data frames.
pub type Epoch = u16;
/// Session id assigned by the broker at accept time.
pub type SubscriberId = u64;
