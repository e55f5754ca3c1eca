//! Public API for the `sensorlink` library.
//!
//! This crate implements the link protocol engine bridging a framed
//! byte-stream device link and a publish/subscribe message bus: frame
//! boundary recovery, the challenge-response handshake, heartbeat liveness
//! tracking, key-value payload decoding with per-topic dispatch, and the
//! outbound frame encoder. The bus transport, the physical port driver, and
//! the device discovery heuristic stay outside, behind the traits in
//! [`bus`].

pub mod bus;
pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod handshake;
pub mod outbound;
pub mod pipeline;
pub mod registry;
pub mod supervisor;

pub use bus::{PortDiscovery, RecordPublisher};
pub use codec::{FrameMode, LinkDecoder, LinkEncoder};
pub use config::LinkConfig;
pub use control::FrameKind;
pub use error::{DecodeError, LinkError};
pub use handshake::{ConnectionState, LinkController};
pub use outbound::{DeviceAddress, OutboundEncoder, OutboundMessage};
pub use pipeline::{DecodePipeline, TopicRecord, TopicRecordSet};
pub use registry::{FieldDescriptor, FieldOutcome, FieldRegistry, FieldValue};
pub use supervisor::{ConnectionSupervisor, LinkHandle};
