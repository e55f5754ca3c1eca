//! Framing codecs for the device link.
//!
//! The link carries either fixed-length frames (the accumulator emits one
//! frame per N bytes, no scanning) or delimiter-terminated frames (bytes up
//! to, but not including, a configured delimiter sequence). A fresh decoder
//! is constructed per connection attempt; no accumulator state survives a
//! reconnect, so a resynchronising handshake always starts from a clean
//! buffer.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use serde::Deserialize;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum fixed frame length accepted by [`FrameMode::fixed`].
///
/// Device frames are small; the clamp prevents a misconfigured length from
/// reserving unbounded buffer space.
pub const MAX_FRAME_LENGTH: usize = 4096;

pub(crate) fn clamp_frame_length(value: usize) -> usize { value.clamp(1, MAX_FRAME_LENGTH) }

/// Framing strategy used to cut the raw byte stream into link frames.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameMode {
    /// Every frame is exactly this many bytes.
    FixedLength(usize),
    /// Frames are terminated by this byte sequence; the delimiter itself is
    /// never part of an emitted frame.
    Delimiter(Vec<u8>),
}

impl FrameMode {
    /// Fixed-length framing, clamped to `1..=`[`MAX_FRAME_LENGTH`].
    #[must_use]
    pub fn fixed(len: usize) -> Self { Self::FixedLength(clamp_frame_length(len)) }

    /// Delimiter framing. An empty delimiter is replaced by a single newline,
    /// the conventional terminator for line-oriented device links.
    #[must_use]
    pub fn delimited(delimiter: impl Into<Vec<u8>>) -> Self {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            Self::Delimiter(vec![b'\n'])
        } else {
            Self::Delimiter(delimiter)
        }
    }

    /// Whether this mode requires the challenge-response handshake before
    /// payload frames are trusted.
    #[must_use]
    pub fn requires_handshake(&self) -> bool { matches!(self, Self::FixedLength(_)) }
}

/// Decoder cutting the inbound byte stream into [`BytesMut`] frames.
///
/// Construct one per connection attempt via [`LinkDecoder::new`].
#[derive(Debug)]
pub struct LinkDecoder {
    mode: FrameMode,
    // Offset already scanned for a delimiter, so a delimiter split across two
    // reads is found without rescanning the whole buffer.
    scanned: usize,
}

impl LinkDecoder {
    /// Create a decoder for the given framing mode.
    #[must_use]
    pub fn new(mode: FrameMode) -> Self {
        let mode = match mode {
            FrameMode::FixedLength(len) => FrameMode::fixed(len),
            FrameMode::Delimiter(d) => FrameMode::delimited(d),
        };
        Self { mode, scanned: 0 }
    }

    fn decode_fixed(len: usize, src: &mut BytesMut) -> Option<BytesMut> {
        if src.len() < len {
            src.reserve(len - src.len());
            return None;
        }
        Some(src.split_to(len))
    }

    fn decode_delimited(&mut self, src: &mut BytesMut) -> Option<BytesMut> {
        let FrameMode::Delimiter(delimiter) = &self.mode else {
            unreachable!("caller checked the mode");
        };
        if let Some(pos) = find_delimiter(src, self.scanned, delimiter) {
            let delimiter_len = delimiter.len();
            let frame = src.split_to(pos);
            src.advance(delimiter_len);
            self.scanned = 0;
            return Some(frame);
        }
        // Keep enough unscanned tail to catch a delimiter that straddles
        // this read and the next.
        self.scanned = src.len().saturating_sub(delimiter.len() - 1);
        None
    }
}

fn find_delimiter(haystack: &[u8], from: usize, delimiter: &[u8]) -> Option<usize> {
    if haystack.len() < delimiter.len() {
        return None;
    }
    (from..=haystack.len() - delimiter.len())
        .find(|&i| &haystack[i..i + delimiter.len()] == delimiter)
}

impl Decoder for LinkDecoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame = match self.mode {
            FrameMode::FixedLength(len) => Self::decode_fixed(len, src),
            FrameMode::Delimiter(_) => self.decode_delimited(src),
        };
        Ok(frame)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            // The link died mid-frame. The residue is useless: the reconnect
            // path builds a fresh decoder and the handshake resynchronises
            // framing, so drop it rather than guess at a boundary.
            tracing::debug!(residual = src.len(), "discarding partial frame at end of stream");
            src.clear();
        }
        Ok(None)
    }
}

/// Encoder appending already-framed outbound buffers to the write stream.
///
/// Outbound frames are built by [`crate::outbound::OutboundEncoder`] and are
/// always exactly the configured outbound length, so no further framing is
/// applied here.
#[derive(Debug, Default)]
pub struct LinkEncoder;

impl Encoder<Bytes> for LinkEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
