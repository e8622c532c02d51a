//! # Blob Format
//!
//! Encoding of a serialized group: all elements of one group instance in a
//! single column of the host row.
//!
//! Format: a JSON object mapping element ids to field maps.
//!
//! ```json
//! {"4": {"title": "Skull island", "depth": 12}, "1": {"title": null, "depth": 3}}
//! ```
//!
//! Key order of the outer object is the display order of the elements.
//!
//! ## Decoding rules
//!
//! - Blobs larger than `MAX_BLOB_SIZE` are rejected before parsing
//! - An empty column decodes to no elements
//! - Unparseable blobs and non-object roots decode to no elements (logged)
//! - Keys that are not integers, or that are reserved ids, are dropped
//! - A legacy `"-1"` key is kept, but no submission can refer to it since
//!   `-1` always means "new element"; the next reconciliation removes it
//! - Field maps are reduced to the declared fields; missing fields are `null`
//! - Element payloads that are not objects become all-`null` field maps

use crate::primitives::MAX_BLOB_SIZE;
use crate::{ElementId, GroupError, NEW_ELEMENT, Value};
use serde_json::Map;
use std::collections::BTreeSet;

/// Decoded elements in display order.
pub type BlobElements = Vec<(ElementId, Map<String, Value>)>;

/// Encode elements to blob bytes.
///
/// This is a pure transformation - no I/O.
pub fn encode_blob(elements: &BlobElements) -> Result<Vec<u8>, GroupError> {
    let object: Map<String, Value> = elements
        .iter()
        .map(|(id, values)| (id.to_string(), Value::Object(values.clone())))
        .collect();

    let bytes = serde_json::to_vec(&Value::Object(object))
        .map_err(|e| GroupError::SerializationError(e.to_string()))?;

    if bytes.len() > MAX_BLOB_SIZE {
        return Err(GroupError::SerializationError(format!(
            "Blob too large: {} bytes (max {})",
            bytes.len(),
            MAX_BLOB_SIZE
        )));
    }

    Ok(bytes)
}

/// Decode blob bytes, normalizing every element to `fields`.
///
/// This is a pure transformation - no I/O.
pub fn decode_blob(bytes: &[u8], fields: &[&str]) -> Result<BlobElements, GroupError> {
    if bytes.len() > MAX_BLOB_SIZE {
        return Err(GroupError::SerializationError(format!(
            "Blob too large: {} bytes (max {})",
            bytes.len(),
            MAX_BLOB_SIZE
        )));
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let root: Value = match serde_json::from_slice(bytes) {
        Ok(root) => root,
        Err(e) => {
            tracing::warn!(error = %e, "Discarding undecodable group blob");
            return Ok(Vec::new());
        }
    };

    let Value::Object(entries) = root else {
        tracing::warn!("Discarding group blob without an element map");
        return Ok(Vec::new());
    };

    let mut seen = BTreeSet::new();
    let mut elements = Vec::with_capacity(entries.len());

    for (key, payload) in entries {
        let Some(id) = key.trim().parse::<i64>().ok().and_then(ElementId::from_raw) else {
            tracing::debug!(key = %key, "Dropping invalid element key");
            continue;
        };
        if !seen.insert(id) {
            tracing::debug!(id = %id, "Dropping duplicate element key");
            continue;
        }
        if id.value() == NEW_ELEMENT {
            tracing::warn!(
                id = %id,
                "Element id collides with the new-element marker and cannot be kept by a submission"
            );
        }

        elements.push((id, normalize_values(&payload, fields)));
    }

    Ok(elements)
}

/// Reduce an element payload to exactly `fields`, in declaration order.
///
/// Missing fields and every field of a non-object payload become `null`.
#[must_use]
pub fn normalize_values(payload: &Value, fields: &[&str]) -> Map<String, Value> {
    let source = payload.as_object();

    fields
        .iter()
        .map(|field| {
            let value = source
                .and_then(|values| values.get(*field))
                .cloned()
                .unwrap_or(Value::Null);
            ((*field).to_string(), value)
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
