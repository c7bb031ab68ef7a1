use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::ack::AckRange;
use crate::protocol::SeqId;
use crate::{BusError, Result, TopicId};

/// One ring-buffer slot.
///
/// Lifecycle: `empty -> has_data -> claimed -> releasable -> empty`. A slot
/// is never `claimed` and `releasable` at the same time: it is either
/// awaiting acknowledgement consensus or ready to be overwritten.
#[derive(Debug, Default)]
struct Slot {
    payload: Bytes,
    seq: SeqId,
    has_data: bool,
    claimed: bool,
    releasable: bool,
}

impl Slot {
    fn ready(&self) -> bool {
        self.has_data && !self.claimed && !self.releasable
    }

    fn reset(&mut self) {
        self.payload = Bytes::new();
        self.has_data = false;
        self.claimed = false;
        self.releasable = false;
    }
}

#[derive(Debug)]
struct RingState {
    slots: Vec<Slot>,
    /// Next sequence id to assign on publish.
    head: SeqId,
    /// Next sequence id the consumer will claim.
    tail: SeqId,
    /// Next sequence id whose slot has not been reclaimed yet. Slots are
    /// reclaimed strictly in sequence order even when acknowledgement
    /// consensus completes out of order, because slot reuse is positional.
    collect_tail: SeqId,
}

/// Fixed-capacity circular payload buffer for one topic.
///
/// N concurrent publishers, one consumer (the fan-out scheduler). Sequence
/// ids are assigned in strict publish order; slot index is `seq % capacity`.
/// Publishers wait on a [`Notify`] with a deadline instead of spinning, and
/// fail with [`BusError::Overflow`] when no slot frees up in time.
///
/// Sequence ids are never reused, so a topic carries at most `u32::MAX`
/// messages over its lifetime. The terminal id is reserved: claimed ranges
/// are half-open and must end at or below `u32::MAX`, so a publish that
/// would assign it fails with `Overflow` instead of wrapping the id space.
#[derive(Debug)]
pub struct TopicRingBuffer {
    topic: TopicId,
    capacity: usize,
    publish_timeout: Duration,
    state: Mutex<RingState>,
    /// Signalled whenever reclaiming frees capacity for blocked publishers.
    space_free: Notify,
    /// Signalled whenever a publish makes a new slot ready for the consumer.
    ready: Notify,
}

impl TopicRingBuffer {
    pub fn new(topic: TopicId, capacity: usize, publish_timeout: Duration) -> Self {
        assert!(capacity > 0, "ring capacity must be >= 1");
        Self {
            topic,
            capacity,
            publish_timeout,
            state: Mutex::new(RingState {
                slots: (0..capacity).map(|_| Slot::default()).collect(),
                head: 0,
                tail: 0,
                collect_tail: 0,
            }),
            space_free: Notify::new(),
            ready: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store a payload and return its assigned sequence id.
    ///
    /// Waits (bounded by the configured publish timeout) for a free slot when
    /// the ring is full; an expired wait surfaces as `Overflow` so the
    /// publisher backs off visibly instead of losing the message.
    pub async fn publish(&self, payload: Bytes) -> Result<SeqId> {
        let deadline = tokio::time::Instant::now() + self.publish_timeout;

        loop {
            // Arm the permit before checking so a release between the check
            // and the await cannot be missed.
            let notified = self.space_free.notified();

            {
                let mut state = self.state.lock();
                let occupied = state.head.wrapping_sub(state.collect_tail) as usize;

                if state.head != SeqId::MAX && occupied < self.capacity {
                    let seq = state.head;
                    let index = seq as usize % self.capacity;
                    let slot = &mut state.slots[index];
                    slot.payload = payload;
                    slot.seq = seq;
                    slot.has_data = true;
                    slot.claimed = false;
                    slot.releasable = false;
                    state.head = state.head.wrapping_add(1);
                    drop(state);

                    self.ready.notify_waiters();
                    return Ok(seq);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(BusError::Overflow(self.topic));
            }
        }
    }

    /// Number of contiguous ready-and-unclaimed slots at the tail. The
    /// fan-out scheduler uses this to decide whether enough has accumulated
    /// to flush a batch.
    pub fn ready_len(&self) -> usize {
        let state = self.state.lock();
        let mut count = 0;
        let mut seq = state.tail;

        while seq != state.head {
            if !state.slots[seq as usize % self.capacity].ready() {
                break;
            }
            count += 1;
            seq = seq.wrapping_add(1);
        }

        count
    }

    /// Claim the longest contiguous run of ready slots at the tail.
    ///
    /// Also advances the collect tail past any slots whose consensus already
    /// completed, so capacity owed to publishers is reclaimed at the first
    /// opportunity. Returns `(vec![], None)` when nothing is ready; the
    /// caller waits on [`Self::wait_ready`] and retries.
    pub fn take_ready(&self) -> (Vec<Bytes>, Option<AckRange>) {
        let mut state = self.state.lock();
        let first = state.tail;
        let mut payloads = Vec::new();

        while state.tail != state.head {
            let index = state.tail as usize % self.capacity;
            if !state.slots[index].ready() {
                break;
            }
            state.slots[index].claimed = true;
            payloads.push(state.slots[index].payload.clone());
            state.tail = state.tail.wrapping_add(1);
        }

        if payloads.is_empty() {
            return (payloads, None);
        }

        let range = AckRange::new(first, state.tail);
        let freed = Self::collect(&mut state, self.capacity);
        drop(state);

        if freed > 0 {
            self.space_free.notify_waiters();
        }

        trace!(topic = self.topic, %range, "claimed batch");
        (payloads, Some(range))
    }

    /// Mark every slot in `range` as releasable.
    ///
    /// Capacity is reclaimed only when the release begins exactly at the
    /// collect tail; an out-of-order release is recorded and picked up once
    /// the hole before it closes.
    pub fn release(&self, range: AckRange) {
        let mut state = self.state.lock();

        for seq in range.first..range.last {
            let index = seq as usize % self.capacity;
            let slot = &mut state.slots[index];

            // A slot already recycled for a newer sequence id must not be
            // touched by a late release of the old one.
            if slot.seq != seq || (!slot.claimed && !slot.has_data && !slot.releasable) {
                continue;
            }

            slot.payload = Bytes::new();
            slot.has_data = false;
            slot.claimed = false;
            slot.releasable = true;
        }

        let freed = if range.first == state.collect_tail {
            Self::collect(&mut state, self.capacity)
        } else {
            0
        };
        drop(state);

        if freed > 0 {
            self.space_free.notify_waiters();
        }
    }

    /// Payload snapshot for redelivery. Slots that were recycled since the
    /// range was recorded are skipped.
    pub fn fetch(&self, range: AckRange) -> Vec<Bytes> {
        let state = self.state.lock();
        let mut payloads = Vec::with_capacity(range.len());

        for seq in range.first..range.last {
            let slot = &state.slots[seq as usize % self.capacity];
            if slot.seq == seq && (slot.has_data || slot.claimed) {
                payloads.push(slot.payload.clone());
            }
        }

        payloads
    }

    /// Suspend until at least one slot is ready for the consumer.
    pub async fn wait_ready(&self) {
        loop {
            let notified = self.ready.notified();
            if self.ready_len() > 0 {
                return;
            }
            notified.await;
        }
    }

    /// Advance the collect tail through the releasable run starting at it,
    /// resetting slots to empty. Returns how many slots were freed.
    fn collect(state: &mut RingState, capacity: usize) -> usize {
        let mut freed = 0;

        while state.collect_tail != state.tail {
            let index = state.collect_tail as usize % capacity;
            if !state.slots[index].releasable {
                break;
            }
            state.slots[index].reset();
            state.collect_tail = state.collect_tail.wrapping_add(1);
            freed += 1;
        }

        freed
    }
}
