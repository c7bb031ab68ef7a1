//! Ack coalescing.
//!
//! Subscribers ack individual messages, but the wire protocol acknowledges
//! ranges. The coalescer collects acked sequence ids per `(topic, epoch)`
//! and merges contiguous ids into ranges, so a burst of per-message acks
//! becomes a handful of ack frames. Batches flush on a timer or as soon as
//! the pending count crosses the configured threshold.
//!
//! Ids for the same range can arrive out of order (concurrent handlers,
//! redeliveries), so merging is insertion-order independent.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use relaymq::{AckRange, Epoch, Frame, SeqId, TopicId};
use tokio::sync::mpsc;
use tracing::debug;

/// One acked message, queued for coalescing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AckEntry {
    pub topic: TopicId,
    pub seq: SeqId,
    pub epoch: Epoch,
}

/// Merges acked sequence ids into ranges per `(topic, epoch)`.
///
/// Ids are kept in a sorted set until drain, so contiguous runs merge no
/// matter what order the acks arrived in, and duplicates collapse.
#[derive(Debug, Default)]
pub struct AckBatcher {
    pending: BTreeMap<(TopicId, Epoch), BTreeSet<SeqId>>,
    count: usize,
}

impl AckBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, topic: TopicId, seq: SeqId, epoch: Epoch) {
        self.pending.entry((topic, epoch)).or_default().insert(seq);
        self.count += 1;
    }

    /// Number of ids pushed since the last drain. Counts duplicates; the
    /// threshold check only needs a rough size.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Take all pending acks as contiguous ranges, one entry per
    /// `(topic, epoch, range)`.
    pub fn drain(&mut self) -> Vec<(TopicId, Epoch, AckRange)> {
        let mut out = Vec::new();

        for ((topic, epoch), ids) in self.pending.iter() {
            let mut run: Option<AckRange> = None;
            for &seq in ids {
                match run {
                    Some(ref mut range) if range.last == seq => range.last = seq + 1,
                    Some(range) => {
                        out.push((*topic, *epoch, range));
                        run = Some(AckRange::new(seq, seq + 1));
                    }
                    None => run = Some(AckRange::new(seq, seq + 1)),
                }
            }
            if let Some(range) = run {
                out.push((*topic, *epoch, range));
            }
        }

        self.pending.clear();
        self.count = 0;
        out
    }
}

/// The coalescer task: drains the ack queue into the connection's outbound
/// frame queue on a flush cadence.
pub(crate) async fn run_coalescer(
    mut entries: mpsc::Receiver<AckEntry>,
    outbound: mpsc::Sender<Frame>,
    flush_interval: Duration,
    flush_threshold: usize,
) {
    let mut batcher = AckBatcher::new();
    let mut interval = tokio::time::interval(flush_interval);
    interval.tick().await;

    loop {
        tokio::select! {
            entry = entries.recv() => {
                match entry {
                    Some(entry) => {
                        batcher.push(entry.topic, entry.seq, entry.epoch);
                        if batcher.len() >= flush_threshold
                            && !flush(&mut batcher, &outbound).await
                        {
                            return;
                        }
                    }
                    None => break,
                }
            }
            _ = interval.tick() => {
                if !flush(&mut batcher, &outbound).await {
                    return;
                }
            }
        }
    }

    // Client is dropping; push out whatever is still pending.
    flush(&mut batcher, &outbound).await;
}

async fn flush(batcher: &mut AckBatcher, outbound: &mpsc::Sender<Frame>) -> bool {
    if batcher.is_empty() {
        return true;
    }

    let ranges = batcher.drain();
    debug!("flushing {} coalesced ack range(s)", ranges.len());

    for (topic, epoch, range) in ranges {
        if outbound.send(Frame::ack(topic, range, epoch)).await.is_err() {
            return false;
        }
    }
    true
}
