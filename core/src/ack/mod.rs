//! # Acknowledgement Bookkeeping
//!
//! This module implements the delivery-guarantee side of the bus: which
//! sequence ids each subscriber still owes an acknowledgement for, when an
//! outstanding range has exceeded the timeout window, and which portions of
//! an acknowledged range *every* subscriber has confirmed (the consensus
//! needed before ring-buffer slots can be reclaimed).
//!
//! ## Epoch buckets
//!
//! Instead of per-message wall-clock timestamps, outstanding ranges are filed
//! under a rotating epoch index. A process-wide timer advances the epoch once
//! per tick; the bucket about to be reused is by construction a full timeout
//! window old, so anything still in it migrates to the subscriber's
//! redelivery set.
//!
//! ## Modules
//!
//! - [`interval`] - [`IntervalSet`], ordered half-open interval arithmetic
//! - [`tracker`] - [`AckTracker`], per-topic epoch buckets and consensus

pub mod interval;
pub mod tests;
pub mod tracker;

pub use interval::{AckRange, IntervalSet};
pub use tracker::AckTracker;
