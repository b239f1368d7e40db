//! Transaction steps and their positional wire encoding.
//!
//! # Design
//! The admin API expects each mutation as a JSON array whose first element
//! names the operation:
//!
//! ```text
//! ["update", ns, id, payload]
//! ["delete", ns, id]
//! ["link",   ns, id, {other_ns: other_id}]
//! ["unlink", ns, id, {other_ns: other_id}]
//! ```
//!
//! `Step` is an owned, immutable value. Links take both endpoints at
//! construction, so a half-built link cannot be encoded.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{ClientError, Result};

/// One end of a link: a record addressed by namespace and id.
///
/// The id may be a lookup reference produced by [`crate::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub namespace: String,
    pub id: String,
}

impl Target {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

/// A single mutation inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Create or merge attributes into a record.
    Update {
        namespace: String,
        id: String,
        payload: serde_json::Value,
    },
    /// Remove a record.
    Delete { namespace: String, id: String },
    /// Associate `from` with `to`.
    Link { from: Target, to: Target },
    /// Remove the association between `from` and `to`.
    Unlink { from: Target, to: Target },
}

impl Step {
    /// Build an update step from any serializable payload.
    ///
    /// Fails with `ClientError::Serialization` if `payload` cannot be turned
    /// into JSON.
    pub fn update<P: Serialize + ?Sized>(
        namespace: impl Into<String>,
        id: impl Into<String>,
        payload: &P,
    ) -> Result<Self> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        Ok(Step::Update {
            namespace: namespace.into(),
            id: id.into(),
            payload,
        })
    }

    pub fn delete(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Step::Delete {
            namespace: namespace.into(),
            id: id.into(),
        }
    }

    pub fn link(from: Target, to: Target) -> Self {
        Step::Link { from, to }
    }

    pub fn unlink(from: Target, to: Target) -> Self {
        Step::Unlink { from, to }
    }

    /// Wire name of the operation.
    pub fn action(&self) -> &'static str {
        match self {
            Step::Update { .. } => "update",
            Step::Delete { .. } => "delete",
            Step::Link { .. } => "link",
            Step::Unlink { .. } => "unlink",
        }
    }

    /// Encode to the positional JSON array.
    pub fn encode(&self) -> serde_json::Value {
        match self {
            Step::Update {
                namespace,
                id,
                payload,
            } => serde_json::json!([self.action(), namespace, id, payload]),
            Step::Delete { namespace, id } => serde_json::json!([self.action(), namespace, id]),
            Step::Link { from, to } | Step::Unlink { from, to } => {
                let mut other = serde_json::Map::new();
                other.insert(to.namespace.clone(), serde_json::Value::String(to.id.clone()));
                serde_json::json!([self.action(), from.namespace, from.id, other])
            }
        }
    }
}

/// Serializes straight to the positional array without building a `Value`.
impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Step::Update {
                namespace,
                id,
                payload,
            } => {
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element(self.action())?;
                seq.serialize_element(namespace)?;
                seq.serialize_element(id)?;
                seq.serialize_element(payload)?;
                seq.end()
            }
            Step::Delete { namespace, id } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(self.action())?;
                seq.serialize_element(namespace)?;
                seq.serialize_element(id)?;
                seq.end()
            }
            Step::Link { from, to } | Step::Unlink { from, to } => {
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element(self.action())?;
                seq.serialize_element(&from.namespace)?;
                seq.serialize_element(&from.id)?;
                seq.serialize_element(&LinkTarget(to))?;
                seq.end()
            }
        }
    }
}

/// `{namespace: id}` object for the last element of link steps.
struct LinkTarget<'a>(&'a Target);

impl Serialize for LinkTarget<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.0.namespace, &self.0.id)?;
        map.end()
    }
}
