//! Connection supervisor owning the link lifecycle.
//!
//! The supervisor runs a reconnect loop: ask discovery for a candidate link,
//! drive one connection attempt to completion, wait the settle delay, and
//! start over with the subsystem rebuilt from scratch. Within an attempt a
//! single `tokio::select!` loop multiplexes inbound frames, the identify
//! delay, the handshake reply deadline, heartbeat ticks, queued outbound
//! messages, and shutdown. All timers belong to the attempt and die with it;
//! the heartbeat acknowledgement timestamp is the only state carried across
//! attempts.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::{
    sync::mpsc,
    time::{Duration, Instant, sleep},
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use crate::{
    bus::{PortDiscovery, RecordPublisher},
    codec::{LinkDecoder, LinkEncoder},
    config::LinkConfig,
    error::LinkError,
    handshake::{ControlAction, LinkController},
    outbound::{OutboundEncoder, OutboundMessage},
    pipeline::{DecodePipeline, FrameDecode},
};

const OUTBOUND_QUEUE_DEPTH: usize = 32;

/// Why a connection attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CloseReason {
    /// Shutdown was requested.
    Shutdown,
    /// The peer closed the link.
    PeerClosed,
    /// A read or write failed.
    IoError,
    /// The handshake reply never arrived; the candidate was excluded.
    HandshakeTimeout,
}

/// Mutable state carried across connection attempts.
///
/// Everything else about a connection is rebuilt per attempt.
#[derive(Clone, Copy, Debug, Default)]
struct ConnectionContext {
    last_ack: Option<Instant>,
}

/// Cloneable handle for queueing outbound messages onto the link.
#[derive(Clone, Debug)]
pub struct LinkHandle {
    tx: mpsc::Sender<OutboundMessage>,
}

impl LinkHandle {
    /// Queue a message for transmission.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Closed`] if the supervisor has shut down.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), LinkError> {
        self.tx.send(message).await.map_err(|_| LinkError::Closed)
    }

    /// Queue plain outbound text for the broadcast address.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Closed`] if the supervisor has shut down.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), LinkError> {
        self.send(OutboundMessage::text(text)).await
    }
}

/// Owns the physical link, the frame source, and the protocol state machine.
pub struct ConnectionSupervisor<P, D>
where
    P: RecordPublisher,
    D: PortDiscovery,
{
    config: LinkConfig,
    pipeline: DecodePipeline,
    encoder: OutboundEncoder,
    publisher: Arc<P>,
    discovery: Arc<D>,
    outbound_rx: mpsc::Receiver<OutboundMessage>,
    shutdown: CancellationToken,
    ctx: ConnectionContext,
}

impl<P, D> ConnectionSupervisor<P, D>
where
    P: RecordPublisher,
    D: PortDiscovery,
{
    /// Build a supervisor and the handle used to queue outbound traffic.
    ///
    /// Cancelling `shutdown` ends the reconnect loop; the current attempt is
    /// torn down and in-flight publishes finish on a best-effort basis.
    #[must_use]
    pub fn new(
        config: LinkConfig,
        pipeline: DecodePipeline,
        publisher: Arc<P>,
        discovery: Arc<D>,
        shutdown: CancellationToken,
    ) -> (Self, LinkHandle) {
        let (tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let encoder = OutboundEncoder::new(config.outbound_frame_len, config.relay);
        let supervisor = Self {
            config,
            pipeline,
            encoder,
            publisher,
            discovery,
            outbound_rx,
            shutdown,
            ctx: ConnectionContext::default(),
        };
        (supervisor, LinkHandle { tx })
    }

    /// Run the reconnect loop until shutdown.
    pub async fn run(mut self) {
        loop {
            let link = tokio::select! {
                () = self.shutdown.cancelled() => break,
                link = self.discovery.next_link() => link,
            };
            match link {
                Ok(link) => {
                    let reason = self.run_attempt(link).await;
                    tracing::info!(?reason, "link attempt ended");
                    if reason == CloseReason::Shutdown {
                        break;
                    }
                }
                Err(error) => {
                    tracing::error!(%error, "failed to open link candidate");
                }
            }
            self.drop_pending_outbound();
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = sleep(self.config.settle_delay) => {}
            }
        }
        tracing::debug!("connection supervisor stopped");
    }

    /// Drive one connection attempt to completion.
    #[allow(clippy::too_many_lines)]
    async fn run_attempt(&mut self, link: D::Link) -> CloseReason {
        let (read_half, write_half) = tokio::io::split(link);
        let mut frames = FramedRead::new(read_half, LinkDecoder::new(self.config.frame_mode.clone()));
        let mut sink = FramedWrite::new(write_half, LinkEncoder);
        let mut controller = LinkController::new(&self.config, self.ctx.last_ack);
        controller.on_open();

        let mut identify_armed = controller.identify_pending();
        let identify_delay = sleep(self.config.identify_delay);
        tokio::pin!(identify_delay);

        let mut handshake_armed = false;
        let handshake_deadline = sleep(Duration::ZERO);
        tokio::pin!(handshake_deadline);

        let mut outbound_open = true;
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );

        let reason = loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break CloseReason::Shutdown,

                frame = frames.next() => match frame {
                    Some(Ok(frame)) => {
                        let routed = controller.route(frame, Instant::now());
                        if controller.handshake_satisfied() {
                            // A reply may beat the identify delay; neither the
                            // challenge nor its deadline fires once connected.
                            identify_armed = false;
                            handshake_armed = false;
                        }
                        let mut close = None;
                        for action in routed.actions {
                            match action {
                                ControlAction::ClearExclusions => {
                                    self.discovery.clear_exclusions().await;
                                }
                                ControlAction::ExcludeCandidate => {
                                    self.discovery.exclude_current_candidate().await;
                                }
                                ControlAction::CloseLink => close = Some(CloseReason::HandshakeTimeout),
                            }
                        }
                        if let Some(reason) = close {
                            break reason;
                        }
                        if let Some(payload) = routed.payload {
                            if let Err(reason) = self.consume_payload(&payload, &mut controller, &mut sink).await {
                                break reason;
                            }
                        }
                    }
                    Some(Err(error)) => {
                        tracing::error!(%error, "link read failed");
                        break CloseReason::IoError;
                    }
                    None => {
                        log::info!("link closed by peer");
                        break CloseReason::PeerClosed;
                    }
                },

                () = &mut identify_delay, if identify_armed => {
                    identify_armed = false;
                    let challenge = controller.take_identify();
                    if let Err(error) = self.write(&mut sink, &challenge).await {
                        tracing::error!(%error, "failed to send identify challenge");
                        break CloseReason::IoError;
                    }
                    handshake_deadline
                        .as_mut()
                        .reset(Instant::now() + self.config.handshake_timeout);
                    handshake_armed = true;
                },

                () = &mut handshake_deadline, if handshake_armed => {
                    handshake_armed = false;
                    let mut close = false;
                    for action in controller.handshake_timed_out() {
                        match action {
                            ControlAction::ExcludeCandidate => {
                                self.discovery.exclude_current_candidate().await;
                            }
                            ControlAction::CloseLink => close = true,
                            ControlAction::ClearExclusions => {}
                        }
                    }
                    if close {
                        break CloseReason::HandshakeTimeout;
                    }
                },

                _ = heartbeat.tick(), if self.config.initiator => {
                    let probe = controller.heartbeat_probe(Instant::now());
                    if let Err(error) = self.write(&mut sink, &probe).await {
                        tracing::error!(%error, "failed to send heartbeat probe");
                        break CloseReason::IoError;
                    }
                },

                message = self.outbound_rx.recv(), if outbound_open => {
                    match message {
                        Some(message) => {
                            if let Err(error) = self.write(&mut sink, &message).await {
                                tracing::error!(%error, "link write failed");
                                break CloseReason::IoError;
                            }
                        }
                        // Every handle is gone; stop polling the queue.
                        None => outbound_open = false,
                    }
                },
            }
        };

        // Dropping the frame source and pinned timers tears the attempt down;
        // nothing of the framing or timer state survives into the next one.
        self.ctx.last_ack = controller.last_ack();
        reason
    }

    /// Decode one payload frame and dispatch its results.
    async fn consume_payload<W>(
        &mut self,
        payload: &[u8],
        controller: &mut LinkController,
        sink: &mut FramedWrite<W, LinkEncoder>,
    ) -> Result<(), CloseReason>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        match self.pipeline.decode_frame(payload).await {
            Ok(FrameDecode::HeartbeatAck) => controller.record_ack(Instant::now()),
            Ok(FrameDecode::Records(decoded)) => {
                for response in decoded.responses {
                    if let Err(error) = self.write(sink, &response).await {
                        tracing::error!(%error, "write-back failed");
                        return Err(CloseReason::IoError);
                    }
                }
                let publisher = Arc::clone(&self.publisher);
                // Fire-and-forget: frame N+1 may start decoding before this
                // publish completes.
                tokio::spawn(async move {
                    publisher.publish(decoded.records).await;
                });
            }
            Err(error) => {
                // One bad frame is dropped; the link and later frames are fine.
                tracing::warn!(%error, "dropping undecodable payload frame");
            }
        }
        Ok(())
    }

    async fn write<W>(
        &self,
        sink: &mut FramedWrite<W, LinkEncoder>,
        message: &OutboundMessage,
    ) -> std::io::Result<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        sink.send(self.encoder.encode(message)).await
    }

    /// Report and discard outbound messages queued while no link is open.
    fn drop_pending_outbound(&mut self) {
        while let Ok(message) = self.outbound_rx.try_recv() {
            tracing::warn!(len = message.payload().len(), "no link open; dropping outbound message");
        }
    }
}
