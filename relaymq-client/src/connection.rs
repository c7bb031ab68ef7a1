//! Connection management for the RelayMQ client

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use relaymq::{BusFrameCodec, Frame, FrameKind, TopicId};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::client::Delivery;
use crate::coalescer::AckEntry;
use crate::error::BusClientError;

/// Outbound frame queue depth.
const OUTBOUND_QUEUE_DEPTH: usize = 1024;

pub(crate) type SubscriptionMap = DashMap<TopicId, mpsc::Sender<Delivery>>;

/// A single connection to the bus.
///
/// Owns the I/O task: outbound frames flow through a bounded queue into the
/// socket, inbound frames are routed to per-topic subscription queues. Every
/// delivered message carries a clone of the ack queue sender so handlers can
/// ack without touching the connection.
#[derive(Debug)]
pub(crate) struct Connection {
    outbound: mpsc::Sender<Frame>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub(crate) async fn connect(
        addr: &str,
        connection_timeout: Duration,
        subscriptions: Arc<SubscriptionMap>,
        ack_tx: mpsc::Sender<AckEntry>,
    ) -> Result<Self, BusClientError> {
        debug!("connecting to bus at {}", addr);

        let stream = timeout(connection_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| BusClientError::timeout(connection_timeout.as_millis() as u64))?
            .map_err(|e| {
                BusClientError::connection(format!("failed to connect to {}: {}", addr, e))
            })?;
        stream.set_nodelay(true)?;

        let framed = Framed::new(stream, BusFrameCodec);
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

        let addr = addr.to_string();
        let handle = tokio::spawn(async move {
            io_loop(addr, framed, outbound_rx, subscriptions, ack_tx).await;
        });

        Ok(Self {
            outbound,
            _handle: handle,
        })
    }

    /// Clone of the outbound frame queue, for background tasks that write
    /// frames (coalescer, heartbeat).
    pub(crate) fn sender(&self) -> mpsc::Sender<Frame> {
        self.outbound.clone()
    }

    pub(crate) async fn send(&self, frame: Frame) -> Result<(), BusClientError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| BusClientError::closed("connection closed"))
    }

    pub(crate) fn is_healthy(&self) -> bool {
        !self.outbound.is_closed()
    }
}

async fn io_loop(
    addr: String,
    framed: Framed<TcpStream, BusFrameCodec>,
    mut outbound_rx: mpsc::Receiver<Frame>,
    subscriptions: Arc<SubscriptionMap>,
    ack_tx: mpsc::Sender<AckEntry>,
) {
    let (mut sink, mut stream) = framed.split();

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = sink.send(frame).await {
                            error!("failed to send frame to {}: {}", addr, e);
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(frame)) => route(frame, &subscriptions, &ack_tx),
                    Some(Err(e)) => {
                        error!("error reading from {}: {}", addr, e);
                        break;
                    }
                    None => {
                        debug!("bus at {} closed the connection", addr);
                        break;
                    }
                }
            }
        }
    }

    info!("connection to {} closed", addr);
}

/// Route one inbound frame. Must never block: this runs on the io task,
/// which is also the sole drain of the outbound queue, so waiting on a full
/// subscription queue here would stall every publish, ack and heartbeat on
/// the connection.
fn route(frame: Frame, subscriptions: &SubscriptionMap, ack_tx: &mpsc::Sender<AckEntry>) {
    match frame.kind {
        FrameKind::Data => {
            let sender = match subscriptions.get(&frame.topic) {
                Some(entry) => entry.value().clone(),
                None => {
                    debug!("delivery for topic {} with no local subscription", frame.topic);
                    return;
                }
            };

            let delivery = Delivery {
                topic: frame.topic,
                seq: frame.seq,
                epoch: frame.epoch,
                payload: frame.body,
                ack_tx: ack_tx.clone(),
            };

            // An unacked delivery comes back through server redelivery, so
            // dropping on a full or closed subscription loses nothing.
            match sender.try_send(delivery) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(
                        "subscription queue for topic {} full, dropping delivery seq {}",
                        frame.topic, frame.seq
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    subscriptions.remove(&frame.topic);
                }
            }
        }
        FrameKind::Heartbeat | FrameKind::Connect => {}
        other => {
            warn!("unexpected {:?} frame from the bus, ignoring", other);
        }
    }
}
