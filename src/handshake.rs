//! Handshake and heartbeat control for one link.
//!
//! On a fixed-length link the byte alignment of a freshly plugged device is
//! untrusted: the challenge-response handshake both validates the peer's
//! identity and resynchronises framing before payload frames are decoded.
//! Delimiter-framed links self-synchronise, so the handshake is skipped and
//! the link counts as connected on open.
//!
//! The controller is sans-I/O: the supervisor owns the timers and the write
//! path, and drives this state machine with frames and deadline events. Each
//! method returns the [`ControlAction`]s the supervisor must carry out.

use bytes::BytesMut;
use tokio::time::Instant;

use crate::{
    config::LinkConfig,
    control::{self, FrameKind},
    outbound::OutboundMessage,
};

/// Lifecycle state of the device link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link open.
    Disconnected,
    /// Link opening; no frame seen yet.
    Opening,
    /// Identify challenge pending or sent; payload frames are not trusted.
    AwaitingHandshake,
    /// Handshake satisfied; payload frames flow to the decode pipeline.
    Connected,
}

/// Side effects the supervisor must perform for the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
    /// The peer identified itself; clear any discovery exclusions.
    ClearExclusions,
    /// The candidate did not answer the challenge; exclude it from future
    /// discovery attempts.
    ExcludeCandidate,
    /// Force-close the link, triggering the reconnect path.
    CloseLink,
}

/// Frame routing decision plus any control side effects.
#[derive(Debug, Default)]
pub struct Routed {
    /// Actions for the supervisor, in order.
    pub actions: Vec<ControlAction>,
    /// The frame, if it is payload the pipeline should decode. Control
    /// frames are fully consumed here and never reach the pipeline.
    pub payload: Option<BytesMut>,
}

/// Challenge-response and heartbeat state machine for one connection attempt.
#[derive(Debug)]
pub struct LinkController {
    state: ConnectionState,
    handshake_required: bool,
    identify_sent: bool,
    heartbeat_interval: std::time::Duration,
    last_ack: Option<Instant>,
}

impl LinkController {
    /// Create a controller for a new connection attempt.
    ///
    /// `last_ack` carries the heartbeat acknowledgement timestamp across
    /// attempts; it is the only state that survives a reconnect.
    #[must_use]
    pub fn new(config: &LinkConfig, last_ack: Option<Instant>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            handshake_required: config.requires_handshake(),
            identify_sent: false,
            heartbeat_interval: config.heartbeat_interval,
            last_ack,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.state }

    /// Whether payload frames are trusted yet.
    #[must_use]
    pub fn handshake_satisfied(&self) -> bool { self.state == ConnectionState::Connected }

    /// Timestamp of the last heartbeat acknowledgement, for carrying into
    /// the next attempt.
    #[must_use]
    pub fn last_ack(&self) -> Option<Instant> { self.last_ack }

    /// The link opened. Fixed-length initiators await the handshake;
    /// everyone else is connected immediately.
    pub fn on_open(&mut self) {
        self.state = if self.handshake_required {
            ConnectionState::AwaitingHandshake
        } else {
            ConnectionState::Connected
        };
        tracing::debug!(state = ?self.state, "link open");
    }

    /// Whether the supervisor should arm the identify-delay timer.
    #[must_use]
    pub fn identify_pending(&self) -> bool {
        self.state == ConnectionState::AwaitingHandshake && !self.identify_sent
    }

    /// The identify delay elapsed: produce the challenge to send. The caller
    /// must arm the handshake reply timeout once the write completes.
    #[must_use]
    pub fn take_identify(&mut self) -> OutboundMessage {
        self.identify_sent = true;
        tracing::debug!("sending identify challenge");
        control::identify_message()
    }

    /// The handshake reply timeout fired.
    ///
    /// Returns the exclusion and close actions if the handshake is still
    /// outstanding, and nothing on a late fire after the reply arrived.
    #[must_use]
    pub fn handshake_timed_out(&mut self) -> Vec<ControlAction> {
        if self.state != ConnectionState::AwaitingHandshake {
            return Vec::new();
        }
        tracing::warn!("no handshake reply; excluding candidate and closing link");
        self.state = ConnectionState::Disconnected;
        vec![ControlAction::ExcludeCandidate, ControlAction::CloseLink]
    }

    /// Route one inbound frame.
    ///
    /// Exactly one consumer sees the frame: control traffic is absorbed by
    /// the state machine, payload is handed back for the pipeline, and
    /// payload arriving before the handshake is satisfied is dropped with a
    /// warning.
    #[must_use]
    pub fn route(&mut self, frame: BytesMut, now: Instant) -> Routed {
        match control::classify(&frame) {
            FrameKind::HandshakeReply { identity } => {
                if self.state == ConnectionState::AwaitingHandshake {
                    tracing::info!(identity, "peer identified; handshake satisfied");
                    self.state = ConnectionState::Connected;
                    Routed {
                        actions: vec![ControlAction::ClearExclusions],
                        payload: None,
                    }
                } else {
                    tracing::debug!(identity, "ignoring handshake reply outside handshake");
                    Routed::default()
                }
            }
            FrameKind::HeartbeatAck => {
                self.record_ack(now);
                Routed::default()
            }
            FrameKind::Payload => {
                if self.handshake_satisfied() {
                    Routed {
                        actions: Vec::new(),
                        payload: Some(frame),
                    }
                } else {
                    tracing::warn!(len = frame.len(), "dropping payload frame before handshake");
                    Routed::default()
                }
            }
        }
    }

    /// The heartbeat interval elapsed: produce the probe to send.
    ///
    /// Probes go out regardless of handshake state. If the time since the
    /// last acknowledgement sits strictly inside the advisory window
    /// (1.5x to 2.5x the interval), a liveness warning is logged; the
    /// connection state is not touched.
    #[must_use]
    pub fn heartbeat_probe(&mut self, now: Instant) -> OutboundMessage {
        if let Some(last) = self.last_ack {
            let gap = now.saturating_duration_since(last);
            let lower = self.heartbeat_interval.mul_f64(1.5);
            let upper = self.heartbeat_interval.mul_f64(2.5);
            if gap > lower && gap < upper {
                tracing::warn!(
                    gap_ms = gap.as_millis(),
                    "no heartbeat acknowledgement recently; peer may have crashed"
                );
            }
        }
        control::heartbeat_message()
    }

    /// Record a heartbeat acknowledgement, logging a reconnection notice if
    /// the peer had gone silent past 1.5x the interval.
    pub fn record_ack(&mut self, now: Instant) {
        if let Some(last) = self.last_ack {
            let gap = now.saturating_duration_since(last);
            if gap > self.heartbeat_interval.mul_f64(1.5) {
                tracing::info!(gap_ms = gap.as_millis(), "peer heartbeat resumed after silence");
            }
        }
        self.last_ack = Some(now);
    }
}
