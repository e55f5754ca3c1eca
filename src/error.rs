//! Canonical error types for the link engine.
//!
//! The taxonomy separates link errors (open/write/close failures, recovered
//! by reconnecting), protocol errors (a silent or wrong device behind the
//! link), and decode errors (one malformed payload frame, dropped without
//! affecting the connection). Nothing here terminates the process.

use std::{io, time::Duration};

use thiserror::Error;

use crate::{outbound::EncodeError, registry::RegistryError};

/// Errors raised while decoding one payload frame.
///
/// A decode error drops the offending frame; the connection and subsequent
/// frames are unaffected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload named a wire key absent from the field table.
    ///
    /// The suggestion is the closest known key by edit distance, offered as
    /// a hint for the operator, never applied automatically.
    #[error("{}", unknown_field_message(.token, .suggestion))]
    UnknownField {
        /// The unrecognised wire key as it appeared on the wire.
        token: String,
        /// Closest known wire key, if the table is non-empty.
        suggestion: Option<String>,
    },

    /// A relay-mode frame was too short to carry its address prefix.
    #[error("frame too short for address prefix ({len} bytes)")]
    MissingAddress {
        /// Length of the truncated frame.
        len: usize,
    },

    /// A field decoder rejected its raw value.
    #[error("field `{field}`: {reason}")]
    Field {
        /// Wire key of the rejecting field.
        field: String,
        /// Decoder-provided reason.
        reason: String,
    },
}

fn unknown_field_message(token: &str, suggestion: &Option<String>) -> String {
    match suggestion {
        Some(known) => format!("unknown field `{token}` (closest known field: `{known}`)"),
        None => format!("unknown field `{token}`"),
    }
}

impl DecodeError {
    /// Convenience constructor for decoder-side rejections.
    #[must_use]
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Top-level error type exposed by the link engine.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Transport failure: open, read, or write.
    #[error("link I/O error: {0}")]
    Io(#[from] io::Error),

    /// No handshake reply arrived before the deadline; the candidate device
    /// is treated as wrong or unresponsive.
    #[error("no handshake reply within {waited:?}")]
    HandshakeTimeout {
        /// How long the engine waited after sending the challenge.
        waited: Duration,
    },

    /// A payload frame failed to decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// An outbound frame could not be built.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The field table was malformed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The link is not open; the outbound message was dropped.
    #[error("link closed")]
    Closed,
}
