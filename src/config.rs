//! Link engine configuration.
//!
//! `LinkConfig` collects everything the engine needs that the host loads
//! from static configuration: framing mode, outbound frame length, relay and
//! initiator roles, the handshake and heartbeat schedule, and the configured
//! topic list. Loading the configuration itself (files, flags, environment)
//! stays outside this crate.

use std::time::Duration;

use serde::Deserialize;

use crate::codec::FrameMode;

const DEFAULT_OUTBOUND_FRAME_LEN: usize = 64;
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_IDENTIFY_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Static configuration for one device link.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LinkConfig {
    /// Inbound framing mode.
    pub frame_mode: FrameMode,
    /// Length of every outbound frame, in bytes.
    pub outbound_frame_len: usize,
    /// Whether messages carry explicit device addresses (multi-device relay).
    pub relay: bool,
    /// Whether this side actively queries the remote: sends the identify
    /// challenge and heartbeat probes.
    pub initiator: bool,
    /// Interval between heartbeat probes.
    pub heartbeat_interval: Duration,
    /// Delay between link open and the identify challenge.
    pub identify_delay: Duration,
    /// How long to wait for a handshake reply after sending the challenge.
    pub handshake_timeout: Duration,
    /// Delay between a link close and handing control back to discovery.
    pub settle_delay: Duration,
    /// Topics every published record set must cover.
    pub topics: Vec<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            frame_mode: FrameMode::delimited(&b"\n"[..]),
            outbound_frame_len: DEFAULT_OUTBOUND_FRAME_LEN,
            relay: false,
            initiator: true,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            identify_delay: DEFAULT_IDENTIFY_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            topics: Vec::new(),
        }
    }
}

impl LinkConfig {
    /// Configuration with the given framing mode and library defaults for
    /// everything else.
    #[must_use]
    pub fn new(frame_mode: FrameMode) -> Self {
        Self {
            frame_mode,
            ..Self::default()
        }
    }

    /// Replace the configured topic list.
    #[must_use]
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Select relay (addressed) operation.
    #[must_use]
    pub fn relay(mut self, relay: bool) -> Self {
        self.relay = relay;
        self
    }

    /// Select whether this side initiates the handshake and heartbeats.
    #[must_use]
    pub fn initiator(mut self, initiator: bool) -> Self {
        self.initiator = initiator;
        self
    }

    /// Set the outbound frame length.
    #[must_use]
    pub fn outbound_frame_len(mut self, len: usize) -> Self {
        self.outbound_frame_len = len;
        self
    }

    /// Set the heartbeat probe interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the identify challenge delay and reply timeout.
    #[must_use]
    pub fn handshake_timing(mut self, identify_delay: Duration, timeout: Duration) -> Self {
        self.identify_delay = identify_delay;
        self.handshake_timeout = timeout;
        self
    }

    /// Set the post-close settle delay.
    #[must_use]
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Whether this link performs the challenge-response handshake.
    #[must_use]
    pub fn requires_handshake(&self) -> bool {
        self.frame_mode.requires_handshake() && self.initiator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_length_initiator_requires_handshake() {
        let config = LinkConfig::new(FrameMode::fixed(32));
        assert!(config.requires_handshake());
    }

    #[test]
    fn delimiter_mode_skips_handshake() {
        let config = LinkConfig::new(FrameMode::delimited(&b"\n"[..]));
        assert!(!config.requires_handshake());
    }

    #[test]
    fn non_initiator_never_handshakes() {
        let config = LinkConfig::new(FrameMode::fixed(32)).initiator(false);
        assert!(!config.requires_handshake());
    }
}
