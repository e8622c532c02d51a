//! # Element Entities
//!
//! Entity-backed groups store each element as a record of a user-supplied
//! type. Element types expose their fields through `FieldAccessible`, an
//! explicit per-type adapter: every readable and writable field is listed
//! by the implementation, nothing is discovered at runtime.
//!
//! `DynamicElement` is the built-in element type. It accepts whatever
//! fields the group definition declares and is always registered under
//! the name `dynamic`.

use crate::{GroupError, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named field access on an element record.
pub trait FieldAccessible {
    /// Read field `name`.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::FieldNotFound` if the type has no such field.
    fn get_field(&self, name: &str) -> Result<Value, GroupError>;

    /// Write field `name`.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::FieldNotFound` if the type has no such field, or
    /// `GroupError::SerializationError` if `value` does not fit the field.
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), GroupError>;
}

/// An element type usable by entity storage.
///
/// New elements start from `Default`; records are stored as the type's
/// JSON encoding.
pub trait ElementEntity: FieldAccessible + Default + Serialize + DeserializeOwned + 'static {}

impl<T> ElementEntity for T where T: FieldAccessible + Default + Serialize + DeserializeOwned + 'static {}

/// Convert a field value into a typed field of an element.
///
/// Helper for `FieldAccessible::set_field` implementations.
pub fn field_value<T: DeserializeOwned>(name: &str, value: Value) -> Result<T, GroupError> {
    serde_json::from_value(value).map_err(|e| {
        GroupError::SerializationError(format!("Field '{name}' cannot hold this value: {e}"))
    })
}

/// Convert a typed field of an element into a field value.
///
/// Helper for `FieldAccessible::get_field` implementations.
pub fn to_field_value<T: Serialize>(name: &str, field: &T) -> Result<Value, GroupError> {
    serde_json::to_value(field).map_err(|e| {
        GroupError::SerializationError(format!("Field '{name}' cannot be encoded: {e}"))
    })
}

// =============================================================================
// DYNAMIC ELEMENT
// =============================================================================

/// Element type holding an open field map.
///
/// Unset fields read as `Value::Null`. Field names are checked against the
/// group definition before they reach this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicElement {
    #[serde(default)]
    values: BTreeMap<String, Value>,
}

impl DynamicElement {
    /// Number of fields with a stored value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check whether no field has a stored value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FieldAccessible for DynamicElement {
    fn get_field(&self, name: &str) -> Result<Value, GroupError> {
        Ok(self.values.get(name).cloned().unwrap_or(Value::Null))
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), GroupError> {
        self.values.insert(name.to_string(), value);
        Ok(())
    }
}
