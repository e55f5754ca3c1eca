//! Static field descriptor table driving payload decoding.
//!
//! Each wire key (`shortName`) maps to a [`FieldDescriptor`] naming the
//! record field to populate, the destination topics, whether the field forces
//! a topic update, and the decoder itself. The table is built once from
//! configuration and immutable afterwards; lookups are exact-match with an
//! edit-distance suggestion used to annotate unknown-field errors.

use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

use crate::error::DecodeError;

/// A decoded value placed into a topic record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Free-form text.
    Text(String),
    /// Signed integer.
    Integer(i64),
    /// Floating-point number.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
}

/// Result of running a field decoder.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldOutcome {
    /// Record this value under the field's database name.
    Value(FieldValue),
    /// Record nothing; transmit this text back to the originating address.
    Respond(String),
}

/// Future returned by a field decoder.
pub type FieldDecodeFuture = BoxFuture<'static, Result<FieldOutcome, DecodeError>>;

/// Asynchronous decoder for one field's raw wire value.
///
/// Decoders are awaited serially in payload order, so a decoder performing
/// I/O (a write-back, say) observes its side effects in wire order.
pub type FieldDecoder = Arc<dyn Fn(Option<String>) -> FieldDecodeFuture + Send + Sync>;

/// Static descriptor for one wire field.
#[derive(Clone)]
pub struct FieldDescriptor {
    short_name: String,
    db_name: String,
    topics: Vec<String>,
    force_send: bool,
    decode: FieldDecoder,
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("short_name", &self.short_name)
            .field("db_name", &self.db_name)
            .field("topics", &self.topics)
            .field("force_send", &self.force_send)
            .finish_non_exhaustive()
    }
}

impl FieldDescriptor {
    /// Descriptor passing the raw value through as text.
    ///
    /// A bare keyword token (no value) decodes to empty text.
    #[must_use]
    pub fn text(short_name: impl Into<String>, db_name: impl Into<String>) -> Self {
        Self::with_decoder(short_name, db_name, |raw| async move {
            Ok(FieldOutcome::Value(FieldValue::Text(raw.unwrap_or_default())))
        })
    }

    /// Descriptor treating the key's presence as a boolean flag.
    #[must_use]
    pub fn flag(short_name: impl Into<String>, db_name: impl Into<String>) -> Self {
        Self::with_decoder(short_name, db_name, |_raw| async move {
            Ok(FieldOutcome::Value(FieldValue::Bool(true)))
        })
    }

    /// Descriptor parsing the raw value as a signed integer.
    #[must_use]
    pub fn integer(short_name: impl Into<String>, db_name: impl Into<String>) -> Self {
        let name: String = short_name.into();
        let field = name.clone();
        Self::with_decoder(name, db_name, move |raw| {
            let field = field.clone();
            async move {
                let raw = raw.ok_or_else(|| DecodeError::field(&field, "missing value"))?;
                let value = raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DecodeError::field(&field, e.to_string()))?;
                Ok(FieldOutcome::Value(FieldValue::Integer(value)))
            }
        })
    }

    /// Descriptor with a custom asynchronous decoder.
    #[must_use]
    pub fn with_decoder<F, Fut>(
        short_name: impl Into<String>,
        db_name: impl Into<String>,
        decode: F,
    ) -> Self
    where
        F: Fn(Option<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FieldOutcome, DecodeError>> + Send + 'static,
    {
        Self {
            short_name: short_name.into(),
            db_name: db_name.into(),
            topics: Vec::new(),
            force_send: true,
            decode: Arc::new(move |raw| -> FieldDecodeFuture { Box::pin(decode(raw)) }),
        }
    }

    /// Add a destination topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    /// Replace the destination topic list.
    #[must_use]
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Control whether this field marks its topics as updated.
    ///
    /// Defaults to `true`; a field explicitly set to `false` contributes its
    /// value only when another field forces the same topic in the same
    /// message.
    #[must_use]
    pub fn force_send(mut self, force: bool) -> Self {
        self.force_send = force;
        self
    }

    /// Wire key of this field.
    #[must_use]
    pub fn short_name(&self) -> &str { &self.short_name }

    /// Record field name used in published records.
    #[must_use]
    pub fn db_name(&self) -> &str { &self.db_name }

    /// Destination topics.
    #[must_use]
    pub fn destination_topics(&self) -> &[String] { &self.topics }

    /// Whether this field forces a topic update.
    #[must_use]
    pub fn forces_send(&self) -> bool { self.force_send }

    /// Run the decoder against a raw wire value.
    ///
    /// # Errors
    ///
    /// Propagates whatever [`DecodeError`] the decoder reports.
    pub fn decode(&self, raw: Option<String>) -> FieldDecodeFuture { (self.decode)(raw) }
}

/// Error raised while building a [`FieldRegistry`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two descriptors share the same wire key.
    #[error("duplicate field short name `{0}`")]
    DuplicateField(String),
}

/// Immutable lookup table from wire key to [`FieldDescriptor`].
#[derive(Clone, Debug, Default)]
pub struct FieldRegistry {
    fields: HashMap<String, FieldDescriptor>,
}

impl FieldRegistry {
    /// Build a registry, rejecting duplicate wire keys.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateField`] naming the first duplicated
    /// short name.
    pub fn build(descriptors: impl IntoIterator<Item = FieldDescriptor>) -> Result<Self, RegistryError> {
        let mut fields = HashMap::new();
        for descriptor in descriptors {
            let key = descriptor.short_name().to_owned();
            if fields.insert(key.clone(), descriptor).is_some() {
                return Err(RegistryError::DuplicateField(key));
            }
        }
        Ok(Self { fields })
    }

    /// Exact-match lookup by wire key.
    #[must_use]
    pub fn get(&self, short_name: &str) -> Option<&FieldDescriptor> { self.fields.get(short_name) }

    /// Closest known wire key by edit distance, used to annotate
    /// unknown-field errors. A suggestion, never a correction.
    #[must_use]
    pub fn suggest(&self, short_name: &str) -> Option<String> {
        self.fields
            .keys()
            .map(|key| (edit_distance(short_name, key), key))
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
            .map(|(_, key)| key.clone())
    }

    /// Number of registered fields.
    #[must_use]
    pub fn len(&self) -> usize { self.fields.len() }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    /// Iterate over registered descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> { self.fields.values() }
}

/// Levenshtein distance between two keys.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
