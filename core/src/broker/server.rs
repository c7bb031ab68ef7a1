use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::broker::session::Session;
use crate::config::BusConfig;
use crate::metrics::MetricsRegistry;
use crate::protocol::{Frame, FrameKind, SubscriberId, TopicId};
use crate::topic::{FlushBatch, Topic, TopicManager};
use crate::Result;

/// Outbound frame queue depth per session. A subscriber that falls further
/// behind than this starts losing deliveries to the redelivery path.
pub(crate) const SESSION_QUEUE_DEPTH: usize = 1024;

/// Maps live session ids to their outbound frame queues.
pub(crate) type SessionRegistry = DashMap<SubscriberId, mpsc::Sender<Frame>>;

/// The RelayMQ TCP server.
///
/// Owns the shared [`TopicManager`] and session registry, and runs three
/// kinds of background tasks next to the accept loop: the metrics reporter,
/// the timeout timer driving ack epochs, and one fan-out pump per topic.
pub struct BusServer {
    config: BusConfig,
    manager: Arc<TopicManager>,
    metrics: Arc<MetricsRegistry>,
    registry: Arc<SessionRegistry>,
    next_session_id: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl BusServer {
    pub fn new(config: BusConfig) -> Result<Self> {
        config.validate().map_err(crate::BusError::Config)?;

        let metrics = Arc::new(MetricsRegistry::new());
        let manager = Arc::new(TopicManager::new(&config, Arc::clone(&metrics)));
        for topic in &config.topics {
            manager.register_topic(*topic);
        }

        let (shutdown_tx, _) = broadcast::channel(16);

        Ok(Self {
            config,
            manager,
            metrics,
            registry: Arc::new(DashMap::new()),
            next_session_id: AtomicU64::new(1),
            shutdown_tx,
        })
    }

    pub fn manager(&self) -> Arc<TopicManager> {
        Arc::clone(&self.manager)
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }

    /// Initiate graceful shutdown: the accept loop, the timer, every pump
    /// and every session observe the broadcast and wind down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the server until shutdown is requested.
    pub async fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("relaymq bus listening on {}", addr);

        Arc::clone(&self.metrics).start_background_tasks();
        self.spawn_timer();
        for topic in self.manager.topic_ids() {
            self.spawn_topic_pump(topic);
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            if self.metrics.active_connections() >= self.config.max_connections {
                                warn!("connection limit reached, dropping {}", peer_addr);
                                continue;
                            }

                            if let Err(e) = Self::tune_socket(&stream) {
                                warn!("failed to tune socket for {}: {}", peer_addr, e);
                            }

                            let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                            let session = Session::new(
                                session_id,
                                peer_addr,
                                Arc::clone(&self.manager),
                                Arc::clone(&self.metrics),
                                Arc::clone(&self.registry),
                                Duration::from_millis(self.config.heartbeat_interval_ms),
                            );
                            let shutdown_rx = self.shutdown_tx.subscribe();

                            tokio::spawn(async move {
                                if let Err(e) = session.run(stream, shutdown_rx).await {
                                    warn!("session {} ({}) closed with error: {}", session_id, peer_addr, e);
                                } else {
                                    info!("session {} ({}) disconnected", session_id, peer_addr);
                                }
                            });
                        }
                        Err(e) => {
                            error!("failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Low-latency socket defaults for bus traffic: small frames, latency
    /// over throughput.
    fn tune_socket(stream: &TcpStream) -> Result<()> {
        use socket2::SockRef;

        let socket = SockRef::from(stream);
        socket.set_tcp_nodelay(true)?;
        socket.set_keepalive(true)?;
        Ok(())
    }

    /// The process-wide timeout timer. One tick advances every topic's ack
    /// epoch; ranges that survive a full window migrate to redelivery.
    fn spawn_timer(&self) {
        let manager = Arc::clone(&self.manager);
        let tick_interval = Duration::from_millis(self.config.tick_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => manager.tick_all(),
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    /// One pump task per topic: batches ready messages into flushes and
    /// drives redelivery on the tick cadence.
    fn spawn_topic_pump(&self, topic: TopicId) {
        let manager = Arc::clone(&self.manager);
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);
        let linger = Duration::from_millis(self.config.flush_linger_ms);
        let redelivery_interval = Duration::from_millis(self.config.tick_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let topic_state = match manager.topic(topic) {
                Ok(state) => state,
                Err(e) => {
                    error!("fan-out pump for topic {} failed to start: {}", topic, e);
                    return;
                }
            };

            let mut redelivery_tick = tokio::time::interval(redelivery_interval);
            // Set when data is ready but nobody is subscribed; the ready
            // signal would otherwise fire immediately again and spin.
            let mut parked = false;

            loop {
                tokio::select! {
                    _ = topic_state.ring.wait_ready(), if !parked => {
                        tokio::time::sleep(linger).await;
                        parked = !flush_topic(topic, &manager, &topic_state, &registry, &metrics);
                    }
                    _ = redelivery_tick.tick() => {
                        redeliver_topic(topic, &manager, &topic_state, &registry, &metrics);
                        // A subscriber may have arrived since we parked.
                        if parked {
                            parked = !flush_topic(topic, &manager, &topic_state, &registry, &metrics);
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }
}

/// Flush the topic's ready batch and fan it out to the roster. Returns false
/// when messages are ready but the roster is empty, so the caller can park
/// the ready signal until a subscriber arrives.
fn flush_topic(
    topic: TopicId,
    manager: &TopicManager,
    topic_state: &Topic,
    registry: &SessionRegistry,
    metrics: &MetricsRegistry,
) -> bool {
    let batch = match manager.flush(topic) {
        Ok(Some(batch)) => batch,
        Ok(None) => return topic_state.ring.ready_len() == 0,
        Err(e) => {
            error!("flush failed for topic {}: {}", topic, e);
            return true;
        }
    };

    debug!(
        topic,
        range = %batch.range,
        epoch = batch.epoch,
        "flushing batch"
    );

    let subscribers = match manager.subscribers(topic) {
        Ok(subscribers) => subscribers,
        Err(_) => return true,
    };

    for subscriber in subscribers {
        send_batch(topic, &batch, subscriber, registry, metrics);
    }
    true
}

fn send_batch(
    topic: TopicId,
    batch: &FlushBatch,
    subscriber: SubscriberId,
    registry: &SessionRegistry,
    metrics: &MetricsRegistry,
) {
    let sender = match registry.get(&subscriber) {
        Some(entry) => entry.value().clone(),
        // Session already gone; its tracker state goes with it on
        // disconnect, nothing to do here.
        None => return,
    };

    for (offset, payload) in batch.payloads.iter().enumerate() {
        let seq = batch.range.first.wrapping_add(offset as u32);
        let frame = Frame::new(FrameKind::Data, topic, seq, batch.epoch, payload.clone());

        // A full queue means the subscriber is behind; the dropped frame
        // stays unacked and comes back through redelivery.
        match sender.try_send(frame) {
            Ok(()) => metrics.record_delivered(1),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(topic, subscriber, seq, "session queue full, deferring to redelivery");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return,
        }
    }
}

/// Re-send every range that timed out for each subscriber of the topic.
fn redeliver_topic(
    topic: TopicId,
    manager: &TopicManager,
    topic_state: &Topic,
    registry: &SessionRegistry,
    metrics: &MetricsRegistry,
) {
    let subscribers = match manager.subscribers(topic) {
        Ok(subscribers) => subscribers,
        Err(_) => return,
    };

    let epoch = topic_state.tracker.current_epoch();

    for subscriber in subscribers {
        let sender = match registry.get(&subscriber) {
            Some(entry) => entry.value().clone(),
            None => continue,
        };

        let batches = match manager.redelivery(topic, subscriber) {
            Ok(batches) => batches,
            Err(_) => continue,
        };

        for (range, payloads) in batches {
            debug!(topic, subscriber, %range, "redelivering range");
            for (offset, payload) in payloads.into_iter().enumerate() {
                let seq = range.first.wrapping_add(offset as u32);
                let frame = Frame::new(FrameKind::Data, topic, seq, epoch, payload);
                if sender.try_send(frame).is_err() {
                    // Still in the redelivery set; retried next cycle.
                    break;
                }
                metrics.record_delivered(1);
            }
        }
    }
}
