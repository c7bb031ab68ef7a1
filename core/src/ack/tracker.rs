use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::protocol::{Epoch, SubscriberId};
use crate::{BusError, Result, TopicId};

use super::{AckRange, IntervalSet};

/// Per-subscriber acknowledgement state: one interval set per epoch bucket
/// plus the redelivery set holding everything that timed out.
#[derive(Debug)]
struct SubscriberState {
    buckets: Vec<IntervalSet>,
    redelivery: IntervalSet,
}

impl SubscriberState {
    fn new(timeout_buckets: u16) -> Self {
        Self {
            buckets: (0..timeout_buckets).map(|_| IntervalSet::new()).collect(),
            redelivery: IntervalSet::new(),
        }
    }
}

#[derive(Debug)]
struct TrackerState {
    epoch: Epoch,
    // BTreeMap keeps consensus iteration in ascending subscriber order. The
    // order does not affect the result (set intersection), but determinism
    // keeps failures reproducible.
    subscribers: BTreeMap<SubscriberId, SubscriberState>,
}

/// Range-based acknowledgement tracker for one topic.
///
/// Tracks, per subscriber, which sequence ranges were sent in which epoch
/// window, migrates expired buckets into the redelivery set on every timer
/// tick, and computes the consensus portion of an acknowledged range that is
/// safe to release back to the ring buffer.
///
/// All operations run under one short-held mutex: acknowledgements and the
/// timer tick touch the same per-subscriber buckets and must not interleave.
#[derive(Debug)]
pub struct AckTracker {
    topic: TopicId,
    timeout_buckets: u16,
    state: Mutex<TrackerState>,
}

impl AckTracker {
    pub fn new(topic: TopicId, timeout_buckets: u16) -> Self {
        assert!(timeout_buckets > 0, "timeout_buckets must be >= 1");
        Self {
            topic,
            timeout_buckets,
            state: Mutex::new(TrackerState {
                epoch: 0,
                subscribers: BTreeMap::new(),
            }),
        }
    }

    /// Current epoch index, as stamped on outgoing data frames.
    pub fn current_epoch(&self) -> Epoch {
        self.state.lock().epoch
    }

    pub fn register_subscriber(&self, id: SubscriberId) {
        let mut state = self.state.lock();
        state
            .subscribers
            .entry(id)
            .or_insert_with(|| SubscriberState::new(self.timeout_buckets));
    }

    /// Drop all bookkeeping for a departed subscriber. Its outstanding and
    /// redelivery ranges are abandoned, not redistributed.
    pub fn remove_subscriber(&self, id: SubscriberId) {
        self.state.lock().subscribers.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Register a freshly flushed batch as outstanding for every listed
    /// subscriber, filed under the current epoch. Returns that epoch so the
    /// caller can stamp the outgoing frames with it; subscribers echo it back
    /// in their acks.
    pub fn mark_unacked(&self, range: AckRange, subscribers: &[SubscriberId]) -> Epoch {
        let mut state = self.state.lock();
        let epoch = state.epoch;

        for id in subscribers {
            if let Some(sub) = state.subscribers.get_mut(id) {
                sub.buckets[epoch as usize].add_unacked(range.first, range.last);
            }
        }

        epoch
    }

    /// Apply an acknowledgement from `subscriber` for a range sent in
    /// `epoch`. The range may live in that epoch's bucket or, if a tick
    /// migrated it between send and ack, in the redelivery set; both are
    /// tried. A miss in both is a duplicate or stale ack and is ignored;
    /// the return value says whether the ack changed any state.
    pub fn acknowledge(
        &self,
        range: AckRange,
        subscriber: SubscriberId,
        epoch: Epoch,
    ) -> Result<bool> {
        if epoch >= self.timeout_buckets {
            return Err(BusError::MalformedFrame(format!(
                "epoch {} out of range (buckets: {})",
                epoch, self.timeout_buckets
            )));
        }

        let mut state = self.state.lock();
        let sub = state
            .subscribers
            .get_mut(&subscriber)
            .ok_or(BusError::UnknownSubscriber {
                topic: self.topic,
                subscriber,
            })?;

        let in_bucket = sub.buckets[epoch as usize].acknowledge(range.first, range.last);
        let in_redelivery = sub.redelivery.acknowledge(range.first, range.last);

        if !in_bucket && !in_redelivery {
            debug!(
                topic = self.topic,
                subscriber,
                %range,
                epoch,
                "duplicate or stale ack ignored"
            );
        }

        Ok(in_bucket || in_redelivery)
    }

    /// Advance the epoch by one tick. The bucket the new epoch is about to
    /// reuse is exactly `timeout_buckets` ticks old: anything still in it has
    /// been outstanding for a full timeout window, so it migrates into the
    /// subscriber's redelivery set and the bucket is cleared for reuse.
    pub fn tick(&self) {
        let mut state = self.state.lock();
        state.epoch = (state.epoch + 1) % self.timeout_buckets;
        let expired = state.epoch as usize;

        for (id, sub) in state.subscribers.iter_mut() {
            for range in sub.buckets[expired].take_all() {
                info!(
                    topic = self.topic,
                    subscriber = *id,
                    %range,
                    "ack timeout, range queued for redelivery"
                );
                sub.redelivery.add_unacked(range.first, range.last);
            }
        }
    }

    /// Compute the sub-ranges of `range` that every *other* subscriber has
    /// also acknowledged and that are therefore safe to release back to the
    /// ring buffer.
    ///
    /// Starting from `[range]` as the sole candidate, each other subscriber's
    /// outstanding state (every epoch bucket plus the redelivery set; an
    /// unacked range lives in exactly one of them) subtracts whatever it
    /// still owes. An early empty candidate list short-circuits: some
    /// subscriber has acknowledged none of the range yet.
    ///
    /// With a single subscriber there is no consensus to reach and the whole
    /// range is releasable immediately.
    pub fn compute_releasable(&self, range: AckRange, source: SubscriberId) -> Vec<AckRange> {
        let state = self.state.lock();
        let mut candidates = vec![range];

        for (id, sub) in state.subscribers.iter() {
            if *id == source {
                continue;
            }

            for bucket in &sub.buckets {
                bucket.difference(&mut candidates);
                if candidates.is_empty() {
                    return candidates;
                }
            }

            sub.redelivery.difference(&mut candidates);
            if candidates.is_empty() {
                return candidates;
            }
        }

        candidates
    }

    /// Snapshot of a subscriber's redelivery ranges. Entries stay in the set
    /// until acknowledged (or the subscriber disconnects); the fan-out
    /// scheduler re-sends them each cycle.
    pub fn redelivery_ranges(&self, subscriber: SubscriberId) -> Vec<AckRange> {
        self.state
            .lock()
            .subscribers
            .get(&subscriber)
            .map(|sub| sub.redelivery.snapshot())
            .unwrap_or_default()
    }
}
