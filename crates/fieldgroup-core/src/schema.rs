//! # Schema Catalog
//!
//! The host's schema description: tables, their fields, and the raw
//! attributes of each field. A `Catalog` is built once (usually from a
//! configuration file) and is immutable afterwards. Group definitions are
//! parsed from it.
//!
//! Field schemas keep unknown keys in `attributes`, so a group field can
//! carry its `palette`, `min`, `max`, `storage`, … without the catalog
//! knowing about groups.

use crate::primitives::GROUP_INPUT_TYPE;
use crate::{GroupError, Value};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::collections::BTreeMap;

// =============================================================================
// FIELD SCHEMA
// =============================================================================

/// Schema of one field of a host table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Field name, unique within its table.
    pub name: String,
    /// Input type the host renders for this field (`"group"` for groups).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    /// Human readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Help text shown next to the label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Every other key of the field definition.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl FieldSchema {
    /// Create a field schema with a name and an input type.
    #[must_use]
    pub fn new(name: impl Into<String>, input_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_type: Some(input_type.into()),
            label: None,
            description: None,
            attributes: Map::new(),
        }
    }

    /// Add a raw attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Set the label and description.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>, description: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self.description = Some(description.into());
        self
    }

    /// Check whether this field is a group field.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.input_type.as_deref() == Some(GROUP_INPUT_TYPE)
    }

    /// Get a raw attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Merge `overrides` over this schema.
    ///
    /// Objects merge key by key, arrays are concatenated, and everything
    /// else in `overrides` replaces the value found here.
    pub fn merged_with(&self, overrides: &FieldSchema) -> Result<FieldSchema, GroupError> {
        let base = serde_json::to_value(self)
            .map_err(|e| GroupError::SerializationError(e.to_string()))?;
        let top = serde_json::to_value(overrides)
            .map_err(|e| GroupError::SerializationError(e.to_string()))?;

        serde_json::from_value(merge_properties(&base, &top))
            .map_err(|e| GroupError::SerializationError(e.to_string()))
    }
}

/// Merge two property trees recursively.
///
/// - objects: keys of `right` overwrite those of `left`, nested containers merge
/// - arrays: combined as `[...left, ...right]`
/// - anything else: `right` wins
///
/// Key order follows `left`, with keys only present in `right` appended.
#[must_use]
pub fn merge_properties(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Array(l), Value::Array(r)) => Value::Array(l.iter().chain(r).cloned().collect()),
        (Value::Object(l), Value::Object(r)) => {
            let mut merged = l.clone();
            for (key, right_value) in r {
                let value = match l.get(key) {
                    Some(left_value) => merge_properties(left_value, right_value),
                    None => right_value.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Value::Object(merged)
        }
        _ => right.clone(),
    }
}

// =============================================================================
// TABLE SCHEMA & CATALOG
// =============================================================================

/// Schema of one host table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Fields in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl TableSchema {
    /// Create an empty table schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Find a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of all group fields, in declaration order.
    #[must_use]
    pub fn group_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.is_group())
            .map(|f| f.name.clone())
            .collect()
    }
}

/// The set of table schemas known to the host.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableSchema>,
}

impl Catalog {
    /// Build a catalog from table schemas. Later duplicates replace earlier ones.
    #[must_use]
    pub fn new(tables: impl IntoIterator<Item = TableSchema>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|table| (table.name.clone(), table))
                .collect(),
        }
    }

    /// Find a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Names of all group fields of `table`; empty for unknown tables.
    #[must_use]
    pub fn group_fields(&self, table: &str) -> Vec<String> {
        self.table(table)
            .map(TableSchema::group_fields)
            .unwrap_or_default()
    }

    /// All tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }
}

// =============================================================================
// TESTS
// =============================================================================
