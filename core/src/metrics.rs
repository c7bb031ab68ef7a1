//! Lock-free runtime metrics.
//!
//! Counters sit on the publish/deliver/ack hot paths, so everything here is
//! an atomic with relaxed-to-release orderings and no locking. Structures are
//! cache-line aligned to keep concurrently-updated counters from false
//! sharing. A background task logs a periodic report through `tracing`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::interval;
use tracing::info;

/// Ensure counter groups are cache-line aligned to prevent false sharing.
#[repr(align(64))]
#[derive(Debug)]
struct CacheLineAligned<T>(T);

/// Registry of all broker counters. One instance per process, shared by
/// `Arc` across sessions, fan-out tasks, and the reporting loop.
#[derive(Debug)]
pub struct MetricsRegistry {
    published: CacheLineAligned<AtomicU64>,
    delivered: CacheLineAligned<AtomicU64>,
    acked: CacheLineAligned<AtomicU64>,
    redelivered: CacheLineAligned<AtomicU64>,
    overflows: AtomicU64,
    stale_acks: AtomicU64,
    active_connections: AtomicUsize,
    started_at: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            published: CacheLineAligned(AtomicU64::new(0)),
            delivered: CacheLineAligned(AtomicU64::new(0)),
            acked: CacheLineAligned(AtomicU64::new(0)),
            redelivered: CacheLineAligned(AtomicU64::new(0)),
            overflows: AtomicU64::new(0),
            stale_acks: AtomicU64::new(0),
            active_connections: AtomicUsize::new(0),
            started_at: Instant::now(),
        }
    }

    /// Spawn the periodic reporting task. Logs a summary once a minute.
    pub fn start_background_tasks(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(60));
            // First tick fires immediately, skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                self.report();
            }
        });
    }

    fn report(&self) {
        let snapshot = self.snapshot();
        info!(
            published = snapshot.published,
            delivered = snapshot.delivered,
            acked = snapshot.acked,
            redelivered = snapshot.redelivered,
            overflows = snapshot.overflows,
            stale_acks = snapshot.stale_acks,
            connections = snapshot.active_connections,
            uptime_secs = snapshot.uptime_seconds,
            "metrics report"
        );
    }

    #[inline(always)]
    pub fn record_published(&self, count: u64) {
        self.published.0.fetch_add(count, Ordering::Release);
    }

    #[inline(always)]
    pub fn record_delivered(&self, count: u64) {
        self.delivered.0.fetch_add(count, Ordering::Release);
    }

    #[inline(always)]
    pub fn record_ack(&self, count: u64) {
        self.acked.0.fetch_add(count, Ordering::Release);
    }

    #[inline(always)]
    pub fn record_redelivered(&self, count: u64) {
        self.redelivered.0.fetch_add(count, Ordering::Release);
    }

    pub fn record_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Release);
    }

    pub fn record_stale_ack(&self) {
        self.stale_acks.fetch_add(1, Ordering::Release);
    }

    #[inline(always)]
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
    }

    #[inline(always)]
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.published.0.load(Ordering::Acquire),
            delivered: self.delivered.0.load(Ordering::Acquire),
            acked: self.acked.0.load(Ordering::Acquire),
            redelivered: self.redelivered.0.load(Ordering::Acquire),
            overflows: self.overflows.load(Ordering::Acquire),
            stale_acks: self.stale_acks.load(Ordering::Acquire),
            active_connections: self.active_connections.load(Ordering::Acquire),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of every counter, safe to hand to reporting code.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub published: u64,
    pub delivered: u64,
    pub acked: u64,
    pub redelivered: u64,
    pub overflows: u64,
    pub stale_acks: u64,
    pub active_connections: usize,
    pub uptime_seconds: u64,
}
