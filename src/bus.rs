//! Collaborator interfaces consumed by the link engine.
//!
//! The engine deliberately knows nothing about the message bus wire protocol
//! or the physical port discovery heuristic. Hosts implement these two
//! traits; everything else the engine needs arrives as configuration.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::pipeline::TopicRecordSet;

/// Downstream publish capability.
///
/// Publishing is fire-and-forget from the pipeline's perspective: the engine
/// does not wait for one frame's publish before decoding the next, and a
/// failed publish is the implementation's concern to report.
#[async_trait]
pub trait RecordPublisher: Send + Sync + 'static {
    /// Publish one decoded record set. Keys are exactly the configured
    /// topics; a `None` record means "no update this cycle" for that topic.
    async fn publish(&self, records: TopicRecordSet);
}

/// Physical port discovery and candidate management.
///
/// The engine opens whatever link discovery hands it, and reports back when
/// a candidate turns out to be the wrong or an unresponsive device.
#[async_trait]
pub trait PortDiscovery: Send + Sync + 'static {
    /// Byte-stream link produced by discovery.
    type Link: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Select and open the next candidate link.
    ///
    /// # Errors
    ///
    /// Returns the open failure; the supervisor reports it and retries after
    /// the settle delay.
    async fn next_link(&self) -> io::Result<Self::Link>;

    /// Exclude the current candidate from future discovery attempts.
    async fn exclude_current_candidate(&self);

    /// Clear any exclusion state after a successful handshake.
    async fn clear_exclusions(&self);
}
