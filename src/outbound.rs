//! Outbound frame construction.
//!
//! Outbound traffic is always written as a fixed-length buffer of the
//! configured outbound length: an optional two-byte device address, the
//! message text, and NUL padding to the end of the buffer. Control traffic
//! (handshake and heartbeat probes) is marked `internal` and bypasses
//! address framing entirely.

use bytes::Bytes;
use thiserror::Error;

/// Errors raised while building an outbound frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// The address string was not exactly four hexadecimal digits.
    #[error("invalid device address `{0}`: expected 4 hex digits")]
    InvalidAddress(String),
}

/// Two-byte device address used in relay mode.
///
/// Rendered as four lowercase hex digits on the wire-text side and as a
/// little-endian `u16` in the binary frame prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceAddress(u16);

impl DeviceAddress {
    /// Broadcast address (`ffff`), the default destination.
    pub const BROADCAST: Self = Self(0xffff);

    /// Reserved marker address used by control acknowledgements.
    pub const RESERVED: Self = Self(0xfefe);

    /// Create an address from its raw value.
    #[must_use]
    pub const fn new(value: u16) -> Self { Self(value) }

    /// Parse a four-hex-digit address string.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidAddress`] if the string is not exactly
    /// four hexadecimal digits.
    pub fn parse(text: &str) -> Result<Self, EncodeError> {
        // from_str_radix tolerates a leading sign, which is not a hex digit.
        if text.len() != 4 || !text.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(EncodeError::InvalidAddress(text.to_owned()));
        }
        u16::from_str_radix(text, 16)
            .map(Self)
            .map_err(|_| EncodeError::InvalidAddress(text.to_owned()))
    }

    /// Read an address from its two-byte little-endian wire form.
    #[must_use]
    pub fn from_wire(bytes: [u8; 2]) -> Self { Self(u16::from_le_bytes(bytes)) }

    /// Two-byte little-endian wire form.
    #[must_use]
    pub fn to_wire(self) -> [u8; 2] { self.0.to_le_bytes() }

    /// Raw address value.
    #[must_use]
    pub fn as_u16(self) -> u16 { self.0 }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl Default for DeviceAddress {
    fn default() -> Self { Self::BROADCAST }
}

/// A logical message queued for transmission over the link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    payload: Bytes,
    address: DeviceAddress,
    internal: bool,
}

impl OutboundMessage {
    /// User text destined for the broadcast address.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: Bytes::from(text.into()),
            address: DeviceAddress::BROADCAST,
            internal: false,
        }
    }

    /// User text destined for a specific device.
    #[must_use]
    pub fn addressed(text: impl Into<String>, address: DeviceAddress) -> Self {
        Self {
            payload: Bytes::from(text.into()),
            address,
            internal: false,
        }
    }

    /// Internal control traffic; never address-framed.
    #[must_use]
    pub fn internal(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            address: DeviceAddress::BROADCAST,
            internal: true,
        }
    }

    /// Raw message payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] { &self.payload }

    /// Destination address; meaningful only in relay mode.
    #[must_use]
    pub fn address(&self) -> DeviceAddress { self.address }

    /// Whether this message bypasses address framing.
    #[must_use]
    pub fn is_internal(&self) -> bool { self.internal }
}

/// Builds fixed-length outbound frames.
#[derive(Clone, Debug)]
pub struct OutboundEncoder {
    frame_len: usize,
    relay: bool,
}

impl OutboundEncoder {
    /// Create an encoder producing frames of `frame_len` bytes.
    ///
    /// `relay` selects address framing for non-internal messages.
    #[must_use]
    pub fn new(frame_len: usize, relay: bool) -> Self {
        Self {
            frame_len: crate::codec::clamp_frame_length(frame_len),
            relay,
        }
    }

    /// Encode a message into a NUL-padded frame of the configured length.
    ///
    /// Text longer than the remaining capacity is truncated.
    #[must_use]
    pub fn encode(&self, message: &OutboundMessage) -> Bytes {
        let mut frame = vec![0_u8; self.frame_len];
        let offset = if self.relay && !message.is_internal() {
            let wire = message.address().to_wire();
            let n = wire.len().min(self.frame_len);
            frame[..n].copy_from_slice(&wire[..n]);
            n
        } else {
            0
        };
        let payload = message.payload();
        let n = payload.len().min(self.frame_len - offset);
        if n < payload.len() {
            tracing::warn!(
                capacity = self.frame_len - offset,
                len = payload.len(),
                "outbound text truncated to frame capacity"
            );
        }
        frame[offset..offset + n].copy_from_slice(&payload[..n]);
        Bytes::from(frame)
    }
}
