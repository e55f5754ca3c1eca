//! Payload decode and topic dispatch.
//!
//! A payload frame is ASCII text of comma-separated `key:value` tokens,
//! optionally NUL-padded and, in relay mode, preceded by a two-byte device
//! address. Each key resolves against the [`FieldRegistry`]; decoders run
//! serially in token order (a decoder may have ordering-sensitive side
//! effects such as a write-back). The result is a [`TopicRecordSet`] covering
//! every configured topic: topics that received a forced-send field carry a
//! record, all others carry an explicit `None` meaning "no update this
//! cycle".
//!
//! Decoding is fail-fast: a single unknown key rejects the whole frame so a
//! malformed payload never produces a partially-correct record set.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    control::{HEARTBEAT, trim_nul},
    error::DecodeError,
    outbound::{DeviceAddress, OutboundMessage},
    registry::{FieldOutcome, FieldRegistry, FieldValue},
};

/// One topic's decoded record: field database name to value.
pub type TopicRecord = BTreeMap<String, FieldValue>;

/// Mapping from configured topic to its record, or `None` for "no update".
pub type TopicRecordSet = BTreeMap<String, Option<TopicRecord>>;

/// Result of decoding one payload frame.
#[derive(Debug)]
pub enum FrameDecode {
    /// Decoded records plus any write-backs requested by field decoders.
    Records(Decoded),
    /// The frame was a relay-addressed heartbeat acknowledgement; nothing to
    /// publish.
    HeartbeatAck,
}

/// Decoded output for one frame.
#[derive(Debug)]
pub struct Decoded {
    /// Per-topic records, keyed by exactly the configured topic set.
    pub records: TopicRecordSet,
    /// Outbound messages requested by field decoders, in token order.
    pub responses: Vec<OutboundMessage>,
}

/// Decode pipeline bound to one field table and topic list.
#[derive(Clone, Debug)]
pub struct DecodePipeline {
    registry: FieldRegistry,
    topics: Vec<String>,
    relay: bool,
}

impl DecodePipeline {
    /// Create a pipeline over a field table and the configured topics.
    #[must_use]
    pub fn new(registry: FieldRegistry, topics: Vec<String>, relay: bool) -> Self {
        let configured: HashSet<&String> = topics.iter().collect();
        for descriptor in registry.iter() {
            for topic in descriptor.destination_topics() {
                if !configured.contains(topic) {
                    tracing::warn!(
                        field = descriptor.short_name(),
                        topic,
                        "field routes to a topic missing from the configured list; values will be dropped"
                    );
                }
            }
        }
        Self {
            registry,
            topics,
            relay,
        }
    }

    /// Decode one payload frame into a record set.
    ///
    /// In relay mode the frame's two-byte address prefix is rendered as four
    /// lowercase hex digits and spliced in as a synthetic leading `id` field;
    /// a frame addressed from the reserved marker carrying `HB` is a
    /// heartbeat acknowledgement and short-circuits with no records.
    ///
    /// # Errors
    ///
    /// Fails on the first unknown wire key (with a closest-match suggestion)
    /// or the first decoder rejection; nothing is published for a failed
    /// frame.
    pub async fn decode_frame(&self, frame: &[u8]) -> Result<FrameDecode, DecodeError> {
        let mut sender = None;
        let payload = if self.relay {
            if frame.len() < 2 {
                return Err(DecodeError::MissingAddress { len: frame.len() });
            }
            let address = DeviceAddress::from_wire([frame[0], frame[1]]);
            let payload = &frame[2..];
            if address == DeviceAddress::RESERVED && trim_nul(payload) == HEARTBEAT.as_bytes() {
                return Ok(FrameDecode::HeartbeatAck);
            }
            sender = Some(address);
            payload
        } else {
            frame
        };

        let text = String::from_utf8_lossy(payload);
        let mut tokens: Vec<(String, Option<String>)> = Vec::new();
        if let Some(address) = sender {
            tokens.push(("id".to_owned(), Some(address.to_string())));
        }
        tokens.extend(split_tokens(&text));

        let mut records: HashMap<&str, TopicRecord> = HashMap::new();
        let mut updated: HashSet<&str> = HashSet::new();
        let mut responses = Vec::new();

        for (name, raw) in tokens {
            let Some(descriptor) = self.registry.get(&name) else {
                return Err(DecodeError::UnknownField {
                    suggestion: self.registry.suggest(&name),
                    token: name,
                });
            };
            // Serialized on purpose: a decoder's side effects must land in
            // payload order before the next field is interpreted.
            match descriptor.decode(raw).await? {
                FieldOutcome::Respond(reply) => {
                    responses.push(match sender {
                        Some(address) => OutboundMessage::addressed(reply, address),
                        None => OutboundMessage::text(reply),
                    });
                }
                FieldOutcome::Value(value) => {
                    for topic in descriptor.destination_topics() {
                        records
                            .entry(topic.as_str())
                            .or_default()
                            .insert(descriptor.db_name().to_owned(), value.clone());
                        if descriptor.forces_send() {
                            updated.insert(topic.as_str());
                        }
                    }
                }
            }
        }

        let records = self
            .topics
            .iter()
            .map(|topic| {
                let record = updated
                    .contains(topic.as_str())
                    .then(|| records.remove(topic.as_str()).unwrap_or_default());
                (topic.clone(), record)
            })
            .collect();

        Ok(FrameDecode::Records(Decoded { records, responses }))
    }
}

/// Split payload text into cleaned `(key, value)` tokens.
///
/// Keys lose embedded and trailing NUL padding; values are NUL-trimmed at
/// both ends. Tokens that clean down to nothing (trailing padding after the
/// last comma, say) are skipped.
fn split_tokens(text: &str) -> Vec<(String, Option<String>)> {
    text.split(',')
        .filter_map(|token| {
            let (name, raw) = match token.split_once(':') {
                Some((name, raw)) => (name, Some(raw)),
                None => (token, None),
            };
            let name: String = name.trim().chars().filter(|&c| c != '\0').collect();
            let raw = raw.map(|r| r.trim().trim_matches('\0').to_owned());
            if name.is_empty() && raw.is_none() {
                return None;
            }
            Some((name, raw))
        })
        .collect()
}
