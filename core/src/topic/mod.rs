//! # RelayMQ Topic Management
//!
//! One [`TopicRingBuffer`] plus one [`AckTracker`](crate::ack::AckTracker)
//! plus a subscriber roster per registered topic, coordinated by the
//! [`TopicManager`].
//!
//! Topics are registered explicitly by the composition root at startup; any
//! operation against an unregistered topic id fails with
//! [`UnknownTopic`](crate::BusError::UnknownTopic) rather than auto-creating
//! state.
//!
//! ## Publish / flush / acknowledge flow
//!
//! 1. Publishers call [`TopicManager::publish`], which delegates to the
//!    topic's ring buffer (bounded wait, `Overflow` on expiry).
//! 2. The fan-out scheduler calls [`TopicManager::flush`]: the claimed batch
//!    is registered as unacknowledged for every current subscriber and
//!    stamped with the tracker's current epoch.
//! 3. Subscribers ack ranges; [`TopicManager::acknowledge`] applies the ack,
//!    computes the consensus-released sub-ranges and hands them back to the
//!    ring buffer, all under one per-topic exclusion scope so concurrent
//!    acks never act on a stale consensus computation.

pub mod ring;

pub use ring::TopicRingBuffer;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;

use crate::ack::{AckRange, AckTracker};
use crate::config::BusConfig;
use crate::metrics::MetricsRegistry;
use crate::protocol::{Epoch, SeqId, SubscriberId, TopicId};
use crate::{BusError, Result};

/// A batch claimed from the ring buffer, ready for fan-out.
#[derive(Debug)]
pub struct FlushBatch {
    pub payloads: Vec<Bytes>,
    pub range: AckRange,
    /// Epoch the batch was registered under; stamped on every outgoing data
    /// frame so subscribers echo it back in their acks.
    pub epoch: Epoch,
}

/// Everything the bus owns for one topic id.
pub struct Topic {
    pub ring: TopicRingBuffer,
    pub tracker: AckTracker,
    roster: Mutex<Vec<SubscriberId>>,
    /// Serializes the acknowledge -> compute-releasable -> release sequence.
    /// Always taken before the tracker lock; the ring buffer lock comes last.
    ack_scope: Mutex<()>,
}

/// Binds topic ids to their ring buffers and acknowledgement trackers.
///
/// Constructed once by the server's composition root and shared behind an
/// `Arc`; holds no global state of its own.
pub struct TopicManager {
    topics: DashMap<TopicId, Arc<Topic>>,
    ring_capacity: usize,
    publish_timeout: Duration,
    timeout_buckets: u16,
    metrics: Arc<MetricsRegistry>,
}

impl TopicManager {
    pub fn new(config: &BusConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            topics: DashMap::new(),
            ring_capacity: config.ring_capacity,
            publish_timeout: Duration::from_millis(config.publish_timeout_ms),
            timeout_buckets: config.timeout_buckets,
            metrics,
        }
    }

    /// Register a topic id. Idempotent; returns whether the topic was new.
    pub fn register_topic(&self, topic: TopicId) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.topics.entry(topic) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Topic {
                    ring: TopicRingBuffer::new(topic, self.ring_capacity, self.publish_timeout),
                    tracker: AckTracker::new(topic, self.timeout_buckets),
                    roster: Mutex::new(Vec::new()),
                    ack_scope: Mutex::new(()),
                }));
                info!(topic, capacity = self.ring_capacity, "registered topic");
                true
            }
        }
    }

    pub fn topic(&self, topic: TopicId) -> Result<Arc<Topic>> {
        self.topics
            .get(&topic)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(BusError::UnknownTopic(topic))
    }

    pub fn topic_ids(&self) -> Vec<TopicId> {
        self.topics.iter().map(|entry| *entry.key()).collect()
    }

    /// Append a payload to the topic's ring buffer.
    pub async fn publish(&self, topic: TopicId, payload: Bytes) -> Result<SeqId> {
        let topic_state = self.topic(topic)?;
        let seq = topic_state.ring.publish(payload).await?;
        self.metrics.record_published(1);
        Ok(seq)
    }

    /// Claim the ready batch and register it as outstanding for every
    /// current subscriber.
    ///
    /// Returns `None` when nothing is ready or nobody is subscribed; with an
    /// empty roster the batch stays in the ring so it is delivered to the
    /// first subscriber that appears instead of being claimed by no one.
    pub fn flush(&self, topic: TopicId) -> Result<Option<FlushBatch>> {
        let topic_state = self.topic(topic)?;
        let subscribers = topic_state.roster.lock().clone();

        if subscribers.is_empty() {
            return Ok(None);
        }

        let (payloads, range) = topic_state.ring.take_ready();
        let range = match range {
            Some(range) => range,
            None => return Ok(None),
        };

        let epoch = topic_state.tracker.mark_unacked(range, &subscribers);

        Ok(Some(FlushBatch {
            payloads,
            range,
            epoch,
        }))
    }

    /// Apply a subscriber's acknowledgement and release whatever portion of
    /// the range every subscriber has now confirmed.
    ///
    /// Runs under the topic's ack scope so that two concurrent acks for the
    /// same topic cannot interleave between the consensus computation and the
    /// ring release. Lock order is fixed: ack scope, then tracker, then ring.
    pub fn acknowledge(
        &self,
        topic: TopicId,
        range: AckRange,
        subscriber: SubscriberId,
        epoch: Epoch,
    ) -> Result<()> {
        let topic_state = self.topic(topic)?;
        let _scope = topic_state.ack_scope.lock();

        if !topic_state.tracker.acknowledge(range, subscriber, epoch)? {
            // Duplicate or stale; no state changed, nothing can have become
            // releasable.
            self.metrics.record_stale_ack();
            return Ok(());
        }
        self.metrics.record_ack(range.len() as u64);

        for releasable in topic_state.tracker.compute_releasable(range, subscriber) {
            topic_state.ring.release(releasable);
        }

        Ok(())
    }

    pub fn subscribe(&self, topic: TopicId, subscriber: SubscriberId) -> Result<()> {
        let topic_state = self.topic(topic)?;

        {
            let mut roster = topic_state.roster.lock();
            if !roster.contains(&subscriber) {
                roster.push(subscriber);
            }
        }

        topic_state.tracker.register_subscriber(subscriber);
        info!(topic, subscriber, "subscribed");
        Ok(())
    }

    pub fn unsubscribe(&self, topic: TopicId, subscriber: SubscriberId) -> Result<()> {
        let topic_state = self.topic(topic)?;
        topic_state.roster.lock().retain(|id| *id != subscriber);
        topic_state.tracker.remove_subscriber(subscriber);
        info!(topic, subscriber, "unsubscribed");
        Ok(())
    }

    /// Disconnect path: drop the subscriber from every topic it joined.
    /// Its outstanding and redelivery state is discarded, not requeued.
    pub fn unsubscribe_all(&self, subscriber: SubscriberId) {
        for entry in self.topics.iter() {
            entry.value().roster.lock().retain(|id| *id != subscriber);
            entry.value().tracker.remove_subscriber(subscriber);
        }
    }

    pub fn subscribers(&self, topic: TopicId) -> Result<Vec<SubscriberId>> {
        Ok(self.topic(topic)?.roster.lock().clone())
    }

    /// Redelivery ranges for one subscriber paired with the payloads still
    /// present in the ring at those sequence ids.
    pub fn redelivery(
        &self,
        topic: TopicId,
        subscriber: SubscriberId,
    ) -> Result<Vec<(AckRange, Vec<Bytes>)>> {
        let topic_state = self.topic(topic)?;
        let mut batches = Vec::new();

        for range in topic_state.tracker.redelivery_ranges(subscriber) {
            let payloads = topic_state.ring.fetch(range);
            if !payloads.is_empty() {
                self.metrics.record_redelivered(payloads.len() as u64);
                batches.push((range, payloads));
            }
        }

        Ok(batches)
    }

    /// Drive the timeout epoch for every registered topic. Called by the
    /// process-wide timer task once per tick interval.
    pub fn tick_all(&self) {
        for entry in self.topics.iter() {
            entry.value().tracker.tick();
        }
    }
}
