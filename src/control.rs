//! Reserved control traffic shared by the handshake and heartbeat paths.
//!
//! Control frames sent to the device carry a three-byte reserved prefix that
//! distinguishes them from payload text. Replies from the device are
//! recognised by the reserved `0xFE 0xFE` marker in their first two bytes:
//! a third byte of `0x01` marks a handshake reply whose remainder is the
//! peer's identity string, while an ASCII `HB` marks a heartbeat
//! acknowledgement.

use crate::outbound::OutboundMessage;

/// Prefix on every outbound control frame.
pub const CONTROL_PREFIX: [u8; 3] = [0x00, 0x00, 0x01];

/// Marker bytes opening every inbound control reply.
pub const REPLY_MARKER: [u8; 2] = [0xFE, 0xFE];

/// Third byte of a handshake reply.
pub const HANDSHAKE_REPLY_TAG: u8 = 0x01;

/// Challenge text sent to a freshly opened link.
pub const IDENTIFY: &str = "Identify";

/// Heartbeat probe and acknowledgement text.
pub const HEARTBEAT: &str = "HB";

/// Classification of an inbound link frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Handshake reply; carries the peer's NUL-trimmed identity string.
    HandshakeReply {
        /// Identification string reported by the peer.
        identity: String,
    },
    /// Heartbeat acknowledgement.
    HeartbeatAck,
    /// Anything else: a key-value payload frame.
    Payload,
}

/// Classify a raw inbound frame.
///
/// Only frames opening with the reserved marker are control traffic; all
/// other byte sequences, including empty frames, are payload.
#[must_use]
pub fn classify(frame: &[u8]) -> FrameKind {
    let Some(rest) = frame.strip_prefix(&REPLY_MARKER[..]) else {
        return FrameKind::Payload;
    };
    if rest.first() == Some(&HANDSHAKE_REPLY_TAG) {
        let identity = String::from_utf8_lossy(trim_nul(&rest[1..])).into_owned();
        return FrameKind::HandshakeReply { identity };
    }
    if trim_nul(rest) == HEARTBEAT.as_bytes() {
        return FrameKind::HeartbeatAck;
    }
    FrameKind::Payload
}

/// Build the outbound identify challenge.
#[must_use]
pub fn identify_message() -> OutboundMessage { control_message(IDENTIFY) }

/// Build the outbound heartbeat probe.
#[must_use]
pub fn heartbeat_message() -> OutboundMessage { control_message(HEARTBEAT) }

fn control_message(text: &str) -> OutboundMessage {
    let mut payload = Vec::with_capacity(CONTROL_PREFIX.len() + text.len());
    payload.extend_from_slice(&CONTROL_PREFIX);
    payload.extend_from_slice(text.as_bytes());
    OutboundMessage::internal(payload)
}

/// Strip trailing NUL padding from a frame slice.
#[must_use]
pub fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}
