use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::broker::server::{SessionRegistry, SESSION_QUEUE_DEPTH};
use crate::metrics::MetricsRegistry;
use crate::protocol::{parse_ack_range, BusFrameCodec, Frame, FrameKind, SubscriberId};
use crate::topic::TopicManager;
use crate::{BusError, Result};

/// One client connection.
///
/// The session id doubles as the subscriber id for every topic the client
/// joins. Reading happens on the session task itself; writing goes through a
/// bounded queue into a separate writer task so a stalled socket never backs
/// up into frame dispatch.
pub struct Session {
    id: SubscriberId,
    peer: SocketAddr,
    manager: Arc<TopicManager>,
    metrics: Arc<MetricsRegistry>,
    registry: Arc<SessionRegistry>,
    heartbeat_interval: Duration,
}

impl Session {
    pub(crate) fn new(
        id: SubscriberId,
        peer: SocketAddr,
        manager: Arc<TopicManager>,
        metrics: Arc<MetricsRegistry>,
        registry: Arc<SessionRegistry>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            id,
            peer,
            manager,
            metrics,
            registry,
            heartbeat_interval,
        }
    }

    /// Serve the connection until the peer disconnects, a protocol error
    /// occurs, or shutdown is requested. Cleanup always runs: the session
    /// leaves the registry and every topic roster it joined.
    pub async fn run(
        self,
        stream: TcpStream,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        self.metrics.connection_opened();
        info!("session {} connected from {}", self.id, self.peer);

        let result = self.serve(stream, &mut shutdown_rx).await;

        self.registry.remove(&self.id);
        self.manager.unsubscribe_all(self.id);
        self.metrics.connection_closed();

        result
    }

    async fn serve(
        &self,
        stream: TcpStream,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<()> {
        let framed = Framed::new(stream, BusFrameCodec);
        let (mut sink, mut frames) = framed.split();

        let (tx, mut rx) = mpsc::channel::<Frame>(SESSION_QUEUE_DEPTH);
        self.registry.insert(self.id, tx.clone());

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.tick().await;

        let result = loop {
            tokio::select! {
                frame = frames.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            if let Err(e) = self.dispatch(frame, &tx).await {
                                break Err(e);
                            }
                        }
                        Some(Err(e)) => break Err(e),
                        None => break Ok(()),
                    }
                }
                _ = heartbeat.tick() => {
                    // Best effort; a full queue means real traffic is
                    // already keeping the connection alive.
                    let _ = tx.try_send(Frame::heartbeat());
                }
                _ = shutdown_rx.recv() => break Ok(()),
            }
        };

        // Dropping the registry entry and our own sender lets the writer
        // task drain and exit. The pumps may still hold a clone briefly;
        // their sends fail harmlessly once the receiver is gone.
        self.registry.remove(&self.id);
        drop(tx);
        let _ = writer.await;

        result
    }

    async fn dispatch(&self, frame: Frame, tx: &mpsc::Sender<Frame>) -> Result<()> {
        match frame.kind {
            FrameKind::Connect => {
                debug!("session {} sent connect", self.id);
                let _ = tx.try_send(Frame::new(
                    FrameKind::Connect,
                    0,
                    0,
                    0,
                    Bytes::new(),
                ));
            }
            FrameKind::Heartbeat => {}
            FrameKind::Subscribe => {
                if let Err(e) = self.manager.subscribe(frame.topic, self.id) {
                    warn!(
                        "session {} subscribe to topic {} failed: {}",
                        self.id, frame.topic, e
                    );
                }
            }
            FrameKind::Data => match self.manager.publish(frame.topic, frame.body).await {
                Ok(_) => {}
                Err(BusError::Overflow(topic)) => {
                    self.metrics.record_overflow();
                    warn!("session {} publish to topic {} overflowed", self.id, topic);
                }
                Err(e) => {
                    warn!("session {} publish failed: {}", self.id, e);
                }
            },
            FrameKind::Ack => {
                let range = parse_ack_range(&frame.body)?;
                match self
                    .manager
                    .acknowledge(frame.topic, range, self.id, frame.epoch)
                {
                    Ok(()) => {}
                    // An out-of-range epoch is a protocol violation and
                    // terminates the session.
                    Err(e @ BusError::MalformedFrame(_)) => return Err(e),
                    Err(e) => {
                        warn!("session {} ack for topic {} failed: {}", self.id, frame.topic, e);
                    }
                }
            }
        }

        Ok(())
    }
}
