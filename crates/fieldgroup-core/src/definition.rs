//! # Group Definitions
//!
//! A `Definition` is the parsed, validated schema of one group field. It is
//! built once per `(table, field)` pair from the field's attributes in the
//! `Catalog` and never changes afterwards.
//!
//! Recognized attributes of a group field:
//!
//! | Key | Meaning | Default |
//! |-----|---------|---------|
//! | `palette` | ordered list of child field names | keys of `fields` |
//! | `fields` | map of inline child field schemas (merged over table fields) | none |
//! | `min` / `max` | element cardinality, `0` = unbounded | `0` |
//! | `storage` | `serialized`, `entity` or `null` | `serialized` |
//! | `sortable` | whether submitted orderings are applied | `true` |
//! | `entity` | referenced group entity (entity storage only) | local mode |
//! | `element` | registered element type (entity storage only) | `dynamic` |
//! | `association` | association name (entity storage only) | see [`EntityMapping`] |
//! | `relation` | `one_to_many` or `one_to_one` | `one_to_many` |
//! | `positions` | `ascending` or `descending` position column | `ascending` |

use crate::primitives::{DEFAULT_ASSOCIATION, DYNAMIC_ELEMENT, MAX_ELEMENTS};
use crate::schema::{FieldSchema, TableSchema};
use crate::{GroupError, Value};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// ENUMS
// =============================================================================

/// Storage backend selected by a group definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// All elements in one blob column of the host row.
    Serialized,
    /// One durable record per element, associated with an owner record.
    Entity,
    /// Transient, never persisted.
    Null,
}

impl StorageKind {
    /// The attribute value naming this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Serialized => "serialized",
            Self::Entity => "entity",
            Self::Null => "null",
        }
    }
}

impl FromStr for StorageKind {
    type Err = GroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serialized" => Ok(Self::Serialized),
            "entity" => Ok(Self::Entity),
            "null" => Ok(Self::Null),
            other => Err(GroupError::InvalidArgument(format!(
                "Unknown storage type '{other}'."
            ))),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cardinality of the owner → elements association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Any number of elements.
    OneToMany,
    /// At most one element.
    OneToOne,
}

/// Direction of the `position` column of entity elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionOrder {
    /// Lower position = earlier element.
    Ascending,
    /// Higher position = earlier element (legacy schemas).
    Descending,
}

/// How an entity-backed group finds its owner and element records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMapping {
    /// Referenced group entity, or `None` for local mode (owner = host row).
    pub entity: Option<String>,
    /// Registered element type name.
    pub element: String,
    /// Association holding the elements. Defaults to the group name in
    /// local mode and to `elements` in referenced mode.
    pub association: String,
    /// Association cardinality.
    pub relation: Relation,
    /// Direction of the stored positions.
    pub positions: PositionOrder,
}

/// One declared child field of a group, with its resolved schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    /// Child field name.
    pub name: String,
    /// Table schema merged with the inline override, if any.
    pub schema: FieldSchema,
}

// =============================================================================
// DEFINITION
// =============================================================================

/// Parsed and validated schema of a group field.
#[derive(Debug, Clone)]
pub struct Definition {
    name: String,
    label: String,
    description: String,
    fields: Vec<FieldRef>,
    min: usize,
    max: usize,
    storage: StorageKind,
    sortable: bool,
    mapping: EntityMapping,
    attributes: Map<String, Value>,
}

impl Definition {
    /// Parse the definition of group field `name` on `table`.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::InvalidDefinition` if the field is missing, or if
    /// any attribute is malformed or out of range.
    pub fn parse(table: &TableSchema, name: &str) -> Result<Self, GroupError> {
        let invalid =
            |msg: String| GroupError::InvalidDefinition(format!("Invalid definition for group '{name}': {msg}"));

        let schema = table
            .field(name)
            .ok_or_else(|| invalid(format!("Field '{name}' does not exist.")))?;

        let palette = match schema.attribute("palette") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid("Key 'palette' must be an array.".to_string()))?,
            Some(_) => return Err(invalid("Key 'palette' must be an array.".to_string())),
        };

        let inline = match schema.attribute("fields") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(invalid("Key 'fields' must be a map.".to_string())),
        };

        let names: Vec<String> = if palette.is_empty() {
            inline.keys().cloned().collect()
        } else {
            palette
        };

        if names.is_empty() {
            return Err(invalid(
                "Keys 'palette' and 'fields' cannot both be empty.".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        let mut fields = Vec::with_capacity(names.len());
        for field in names {
            if field == name {
                return Err(invalid(format!("Field '{field}' cannot contain itself.")));
            }
            if !seen.insert(field.clone()) {
                return Err(invalid(format!("Field '{field}' is listed twice.")));
            }

            let override_schema = inline
                .get(&field)
                .map(|raw| inline_schema(&field, raw))
                .transpose()
                .map_err(invalid)?;

            let resolved = match (table.field(&field), override_schema) {
                (Some(base), Some(over)) => base.merged_with(&over)?,
                (Some(base), None) => base.clone(),
                (None, Some(over)) => over,
                (None, None) => return Err(invalid(format!("Field '{field}' does not exist."))),
            };

            fields.push(FieldRef {
                name: field,
                schema: resolved,
            });
        }

        let min = integer(schema.attribute("min"), "min").map_err(invalid)?;
        if min < 0 {
            return Err(invalid("Key 'min' cannot be less than 0.".to_string()));
        }
        let mut max = integer(schema.attribute("max"), "max").map_err(invalid)?;
        if max < 0 {
            return Err(invalid("Key 'max' cannot be less than 0.".to_string()));
        }
        if max != 0 && max < min {
            return Err(invalid("Key 'max' cannot be less than 'min'.".to_string()));
        }
        for (key, value) in [("min", min), ("max", max)] {
            if value > MAX_ELEMENTS as i64 {
                return Err(invalid(format!(
                    "Key '{key}' cannot be greater than {MAX_ELEMENTS}."
                )));
            }
        }

        let storage = match string(schema.attribute("storage"), "storage").map_err(invalid)? {
            None => StorageKind::Serialized,
            Some(raw) => raw
                .parse::<StorageKind>()
                .map_err(|_| invalid(format!("Unknown storage type '{raw}'.")))?,
        };

        let sortable = match schema.attribute("sortable") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(invalid("Key 'sortable' must be a boolean.".to_string())),
        };

        let entity = string(schema.attribute("entity"), "entity").map_err(invalid)?;
        let element = string(schema.attribute("element"), "element")
            .map_err(invalid)?
            .unwrap_or_else(|| DYNAMIC_ELEMENT.to_string());
        let association = string(schema.attribute("association"), "association")
            .map_err(invalid)?
            .unwrap_or_else(|| match entity {
                Some(_) => DEFAULT_ASSOCIATION.to_string(),
                None => name.to_string(),
            });
        let relation = match string(schema.attribute("relation"), "relation")
            .map_err(invalid)?
            .as_deref()
        {
            None | Some("one_to_many") => Relation::OneToMany,
            Some("one_to_one") => Relation::OneToOne,
            Some(other) => return Err(invalid(format!("Unknown relation '{other}'."))),
        };
        let positions = match string(schema.attribute("positions"), "positions")
            .map_err(invalid)?
            .as_deref()
        {
            None | Some("ascending") => PositionOrder::Ascending,
            Some("descending") => PositionOrder::Descending,
            Some(other) => return Err(invalid(format!("Unknown position order '{other}'."))),
        };

        if relation == Relation::OneToOne {
            if max > 1 {
                return Err(invalid(
                    "Key 'max' cannot be greater than 1 for a one-to-one relation.".to_string(),
                ));
            }
            if min > 1 {
                return Err(invalid(
                    "Key 'min' cannot be greater than 1 for a one-to-one relation.".to_string(),
                ));
            }
            max = 1;
        }

        Ok(Self {
            name: name.to_string(),
            label: schema.label.clone().unwrap_or_default(),
            description: schema.description.clone().unwrap_or_default(),
            fields,
            min: min as usize,
            max: max as usize,
            storage,
            sortable,
            mapping: EntityMapping {
                entity,
                element,
                association,
                relation,
                positions,
            },
            attributes: schema.attributes.clone(),
        })
    }

    /// Group field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label, empty if none was given.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Description, empty if none was given.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared child fields in display order.
    #[must_use]
    pub fn fields(&self) -> &[FieldRef] {
        &self.fields
    }

    /// Declared child field names in display order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Find a declared child field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldRef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check whether `name` is a declared child field.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Minimum number of elements, `0` = unbounded.
    #[must_use]
    pub fn min_elements(&self) -> usize {
        self.min
    }

    /// Maximum number of elements, `0` = unbounded.
    #[must_use]
    pub fn max_elements(&self) -> usize {
        self.max
    }

    /// Selected storage backend.
    #[must_use]
    pub fn storage_kind(&self) -> StorageKind {
        self.storage
    }

    /// Whether submitted orderings are applied to storage.
    #[must_use]
    pub fn is_sortable(&self) -> bool {
        self.sortable
    }

    /// Entity storage mapping.
    #[must_use]
    pub fn mapping(&self) -> &EntityMapping {
        &self.mapping
    }

    /// Raw attribute of the group field.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

// =============================================================================
// ATTRIBUTE HELPERS
// =============================================================================

fn inline_schema(name: &str, raw: &Value) -> Result<FieldSchema, String> {
    let Value::Object(map) = raw else {
        return Err(format!("Inline field '{name}' must be a map."));
    };

    let mut map = map.clone();
    map.insert("name".to_string(), Value::String(name.to_string()));

    serde_json::from_value(Value::Object(map))
        .map_err(|e| format!("Inline field '{name}' is malformed: {e}"))
}

fn integer(raw: Option<&Value>, key: &str) -> Result<i64, String> {
    match raw {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| format!("Key '{key}' must be an integer.")),
    }
}

fn string(raw: Option<&Value>, key: &str) -> Result<Option<String>, String> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("Key '{key}' must be a string.")),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(group: FieldSchema) -> TableSchema {
        TableSchema::new("tl_foo").with_field(group).with_field(
            FieldSchema::new("foo", "text")
                .with_attribute("eval", json!({"tl_class": "w50", "mandatory": true})),
        )
    }

    fn group() -> FieldSchema {
        FieldSchema::new("my_group", "group")
    }

    fn parse(group: FieldSchema) -> Result<Definition, GroupError> {
        Definition::parse(&table(group), "my_group")
    }

    fn message(group: FieldSchema) -> String {
        parse(group).expect_err("should be invalid").to_string()
    }

    #[test]
    fn parses_defaults() {
        let def = parse(group().with_attribute("palette", json!(["foo"]))).expect("parse");

        assert_eq!(def.name(), "my_group");
        assert_eq!(def.label(), "");
        assert_eq!(def.description(), "");
        assert_eq!(def.min_elements(), 0);
        assert_eq!(def.max_elements(), 0);
        assert_eq!(def.field_names(), vec!["foo"]);
        assert_eq!(def.storage_kind(), StorageKind::Serialized);
        assert!(def.is_sortable());
        assert_eq!(def.mapping().association, "my_group");
        assert_eq!(def.mapping().element, DYNAMIC_ELEMENT);
        assert_eq!(def.mapping().positions, PositionOrder::Ascending);
    }

    #[test]
    fn parses_label_and_limits() {
        let def = parse(
            group()
                .with_label("my group", "pretty nice")
                .with_attribute("palette", json!(["foo"]))
                .with_attribute("min", json!(2))
                .with_attribute("max", json!(10)),
        )
        .expect("parse");

        assert_eq!(def.label(), "my group");
        assert_eq!(def.description(), "pretty nice");
        assert_eq!(def.min_elements(), 2);
        assert_eq!(def.max_elements(), 10);
    }

    #[test]
    fn implicit_palette_from_inline_fields() {
        let def = parse(group().with_attribute("fields", json!({"bar": {"input_type": "text"}})))
            .expect("parse");

        assert_eq!(def.field_names(), vec!["bar"]);
    }

    #[test]
    fn palette_may_mix_table_and_inline_fields() {
        let def = parse(
            group()
                .with_attribute("palette", json!(["foo", "bar"]))
                .with_attribute("fields", json!({"bar": {"input_type": "text"}})),
        )
        .expect("parse");

        assert_eq!(def.field_names(), vec!["foo", "bar"]);
    }

    #[test]
    fn inline_fields_merge_over_table_fields() {
        let def = parse(
            group().with_attribute("fields", json!({"foo": {"eval": {"mandatory": false}}})),
        )
        .expect("parse");

        let foo = def.field("foo").expect("foo");
        assert_eq!(foo.schema.input_type.as_deref(), Some("text"));
        assert_eq!(
            foo.schema.attribute("eval"),
            Some(&json!({"tl_class": "w50", "mandatory": false}))
        );
    }

    #[test]
    fn exposes_raw_attributes() {
        let def = parse(
            group()
                .with_attribute("palette", json!(["foo"]))
                .with_attribute("foobar", json!({"bar": "baz"})),
        )
        .expect("parse");

        assert_eq!(def.attribute("foobar"), Some(&json!({"bar": "baz"})));
    }

    #[test]
    fn rejects_missing_fields() {
        assert_eq!(
            message(group()),
            "Invalid definition for group 'my_group': Keys 'palette' and 'fields' cannot both be empty."
        );
        assert_eq!(
            message(group().with_attribute("palette", json!([]))),
            "Invalid definition for group 'my_group': Keys 'palette' and 'fields' cannot both be empty."
        );
    }

    #[test]
    fn rejects_string_palette() {
        assert_eq!(
            message(group().with_attribute("palette", json!("foo"))),
            "Invalid definition for group 'my_group': Key 'palette' must be an array."
        );
    }

    #[test]
    fn rejects_unknown_field_reference() {
        assert_eq!(
            message(group().with_attribute("palette", json!(["foo", "bar"]))),
            "Invalid definition for group 'my_group': Field 'bar' does not exist."
        );
    }

    #[test]
    fn rejects_bad_limits() {
        assert_eq!(
            message(
                group()
                    .with_attribute("palette", json!(["foo"]))
                    .with_attribute("min", json!(-10))
            ),
            "Invalid definition for group 'my_group': Key 'min' cannot be less than 0."
        );
        assert_eq!(
            message(
                group()
                    .with_attribute("palette", json!(["foo"]))
                    .with_attribute("min", json!(4))
                    .with_attribute("max", json!(3))
            ),
            "Invalid definition for group 'my_group': Key 'max' cannot be less than 'min'."
        );
        assert_eq!(
            message(
                group()
                    .with_attribute("palette", json!(["foo"]))
                    .with_attribute("min", json!(1_000_000_000))
            ),
            "Invalid definition for group 'my_group': Key 'min' cannot be greater than 200."
        );
        assert_eq!(
            message(
                group()
                    .with_attribute("palette", json!(["foo"]))
                    .with_attribute("max", json!(MAX_ELEMENTS + 1))
            ),
            "Invalid definition for group 'my_group': Key 'max' cannot be greater than 200."
        );

        let def = Definition::parse(
            &table(
                group()
                    .with_attribute("palette", json!(["foo"]))
                    .with_attribute("min", json!(MAX_ELEMENTS))
                    .with_attribute("max", json!(MAX_ELEMENTS)),
            ),
            "my_group",
        )
        .expect("parse");
        assert_eq!(def.min_elements(), MAX_ELEMENTS);
    }

    #[test]
    fn rejects_unknown_storage() {
        assert_eq!(
            message(
                group()
                    .with_attribute("palette", json!(["foo"]))
                    .with_attribute("storage", json!("magic"))
            ),
            "Invalid definition for group 'my_group': Unknown storage type 'magic'."
        );
    }

    #[test]
    fn referenced_entity_defaults_association() {
        let def = parse(
            group()
                .with_attribute("palette", json!(["foo"]))
                .with_attribute("storage", json!("entity"))
                .with_attribute("entity", json!("treasure_map")),
        )
        .expect("parse");

        assert_eq!(def.storage_kind(), StorageKind::Entity);
        assert_eq!(def.mapping().entity.as_deref(), Some("treasure_map"));
        assert_eq!(def.mapping().association, DEFAULT_ASSOCIATION);
    }

    #[test]
    fn one_to_one_caps_max() {
        let def = parse(
            group()
                .with_attribute("palette", json!(["foo"]))
                .with_attribute("relation", json!("one_to_one")),
        )
        .expect("parse");
        assert_eq!(def.max_elements(), 1);

        assert!(
            parse(
                group()
                    .with_attribute("palette", json!(["foo"]))
                    .with_attribute("relation", json!("one_to_one"))
                    .with_attribute("max", json!(2))
            )
            .is_err()
        );
    }

    #[test]
    fn unsortable_groups() {
        let def = parse(
            group()
                .with_attribute("palette", json!(["foo"]))
                .with_attribute("sortable", json!(false)),
        )
        .expect("parse");

        assert!(!def.is_sortable());
    }
}
