//! High-level bus client: publish, subscribe and ack.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use relaymq::{Epoch, Frame, FrameKind, SeqId, TopicId};
use tokio::sync::mpsc;
use tracing::info;

use crate::coalescer::{run_coalescer, AckEntry};
use crate::config::ClientConfig;
use crate::connection::{Connection, SubscriptionMap};
use crate::error::BusClientError;
use crate::Result;

/// Ack queue depth between deliveries and the coalescer.
const ACK_QUEUE_DEPTH: usize = 4096;

/// A client handle to one bus connection.
///
/// One [`BusClient`] multiplexes any number of topic subscriptions and
/// publishes over a single TCP connection. Acks from delivered messages are
/// coalesced into ranges in the background; callers just ack each
/// [`Delivery`].
pub struct BusClient {
    connection: Arc<Connection>,
    subscriptions: Arc<SubscriptionMap>,
    queue_depth: usize,
    coalescer: tokio::task::JoinHandle<()>,
    heartbeat: tokio::task::JoinHandle<()>,
}

impl BusClient {
    /// Connect to the bus and start the background tasks.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let subscriptions: Arc<SubscriptionMap> = Arc::new(DashMap::new());
        let (ack_tx, ack_rx) = mpsc::channel(ACK_QUEUE_DEPTH);

        let connection = Arc::new(
            Connection::connect(
                &config.addr,
                config.connection_timeout,
                Arc::clone(&subscriptions),
                ack_tx,
            )
            .await?,
        );

        connection
            .send(Frame::new(FrameKind::Connect, 0, 0, 0, Bytes::new()))
            .await?;

        let coalescer = tokio::spawn(run_coalescer(
            ack_rx,
            connection.sender(),
            config.ack_flush_interval,
            config.ack_flush_threshold,
        ));

        let heartbeat = {
            let sender = connection.sender();
            let interval = config.heartbeat_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(interval);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if sender.send(Frame::heartbeat()).await.is_err() {
                        break;
                    }
                }
            })
        };

        info!("connected to bus at {}", config.addr);

        Ok(Self {
            connection,
            subscriptions,
            queue_depth: config.subscription_queue_depth,
            coalescer,
            heartbeat,
        })
    }

    /// Publish a payload to a topic. Resolves once the frame is queued for
    /// the socket; delivery is the bus's responsibility from there.
    pub async fn publish(&self, topic: TopicId, payload: impl Into<Bytes>) -> Result<()> {
        self.connection
            .send(Frame::new(FrameKind::Data, topic, 0, 0, payload.into()))
            .await
    }

    /// Subscribe to a topic. At most one live subscription per topic per
    /// client; deliveries for the topic flow into the returned handle.
    pub async fn subscribe(&self, topic: TopicId) -> Result<Subscription> {
        if self.subscriptions.contains_key(&topic) {
            return Err(BusClientError::AlreadySubscribed { topic });
        }

        let (tx, rx) = mpsc::channel(self.queue_depth);
        self.subscriptions.insert(topic, tx);

        if let Err(e) = self
            .connection
            .send(Frame::new(FrameKind::Subscribe, topic, 0, 0, Bytes::new()))
            .await
        {
            self.subscriptions.remove(&topic);
            return Err(e);
        }

        Ok(Subscription { topic, rx })
    }

    pub fn is_healthy(&self) -> bool {
        self.connection.is_healthy()
    }

    /// Tear down the background tasks. Pending coalesced acks are dropped;
    /// the bus redelivers anything unacked.
    pub fn close(&self) {
        self.coalescer.abort();
        self.heartbeat.abort();
        self.subscriptions.clear();
    }
}

impl Drop for BusClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// A live topic subscription. Dropping it stops local delivery; the bus
/// keeps redelivering unacked ranges until the connection closes.
pub struct Subscription {
    topic: TopicId,
    rx: mpsc::Receiver<Delivery>,
}

impl Subscription {
    pub fn topic(&self) -> TopicId {
        self.topic
    }

    /// Receive the next delivery. `None` means the connection is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// One delivered message. Call [`ack`](Delivery::ack) after processing;
/// unacked deliveries are redelivered by the bus after its timeout window.
#[derive(Debug)]
pub struct Delivery {
    pub topic: TopicId,
    pub seq: SeqId,
    pub epoch: Epoch,
    pub payload: Bytes,
    pub(crate) ack_tx: mpsc::Sender<AckEntry>,
}

impl Delivery {
    /// Acknowledge this message. The ack is coalesced with neighbouring
    /// acks and sent to the bus on the next flush.
    pub async fn ack(self) -> Result<()> {
        self.ack_tx
            .send(AckEntry {
                topic: self.topic,
                seq: self.seq,
                epoch: self.epoch,
            })
            .await
            .map_err(|_| BusClientError::closed("ack queue closed"))
    }
}
