//! # Expansion
//!
//! Turns a group into the flat list of virtual fields the host renders:
//!
//! ```text
//! <group>__(start)
//!   <group>__(el_start)__4, <group>__title__4, <group>__depth__4, <group>__(el_end)__4
//!   <group>__(el_start)__1, <group>__title__1, <group>__depth__1, <group>__(el_end)__1
//! <group>__(end)
//! ```
//!
//! The result is a request-scoped `Expansion` value. The host splices it
//! into its own palette; nothing global is modified.

use crate::definition::Definition;
use crate::primitives::KEY_SEPARATOR;
use crate::schema::FieldSchema;
use crate::{ElementId, GroupError};
use std::fmt;
use std::str::FromStr;

const START: &str = "(start)";
const ELEMENT_START: &str = "(el_start)";
const ELEMENT_END: &str = "(el_end)";
const END: &str = "(end)";

// =============================================================================
// VIRTUAL FIELD KEYS
// =============================================================================

/// Composite key of a virtual field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VirtualFieldKey {
    /// `<group>__(start)`
    GroupStart { group: String },
    /// `<group>__(el_start)__<id>`
    ElementStart { group: String, element: ElementId },
    /// `<group>__<field>__<id>`
    Field {
        group: String,
        field: String,
        element: ElementId,
    },
    /// `<group>__(el_end)__<id>`
    ElementEnd { group: String, element: ElementId },
    /// `<group>__(end)`
    GroupEnd { group: String },
}

impl VirtualFieldKey {
    /// Name of the group this key belongs to.
    #[must_use]
    pub fn group(&self) -> &str {
        match self {
            Self::GroupStart { group }
            | Self::ElementStart { group, .. }
            | Self::Field { group, .. }
            | Self::ElementEnd { group, .. }
            | Self::GroupEnd { group } => group,
        }
    }

    /// Element this key belongs to, if any.
    #[must_use]
    pub fn element(&self) -> Option<ElementId> {
        match self {
            Self::ElementStart { element, .. }
            | Self::Field { element, .. }
            | Self::ElementEnd { element, .. } => Some(*element),
            Self::GroupStart { .. } | Self::GroupEnd { .. } => None,
        }
    }

    /// Check whether this key is a structural marker rather than a field.
    #[must_use]
    pub fn is_marker(&self) -> bool {
        !matches!(self, Self::Field { .. })
    }
}

impl fmt::Display for VirtualFieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = KEY_SEPARATOR;
        match self {
            Self::GroupStart { group } => write!(f, "{group}{sep}{START}"),
            Self::ElementStart { group, element } => {
                write!(f, "{group}{sep}{ELEMENT_START}{sep}{element}")
            }
            Self::Field {
                group,
                field,
                element,
            } => write!(f, "{group}{sep}{field}{sep}{element}"),
            Self::ElementEnd { group, element } => {
                write!(f, "{group}{sep}{ELEMENT_END}{sep}{element}")
            }
            Self::GroupEnd { group } => write!(f, "{group}{sep}{END}"),
        }
    }
}

impl FromStr for VirtualFieldKey {
    type Err = GroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GroupError::InvalidArgument(format!("Invalid virtual field key '{s}'."));

        let (group, rest) = s.split_once(KEY_SEPARATOR).ok_or_else(invalid)?;
        if group.is_empty() {
            return Err(invalid());
        }
        let group = group.to_string();

        match rest {
            START => return Ok(Self::GroupStart { group }),
            END => return Ok(Self::GroupEnd { group }),
            _ => {}
        }

        let (middle, id) = rest.rsplit_once(KEY_SEPARATOR).ok_or_else(invalid)?;
        let element = id
            .parse::<i64>()
            .ok()
            .and_then(ElementId::from_raw)
            .ok_or_else(invalid)?;

        match middle {
            ELEMENT_START => Ok(Self::ElementStart { group, element }),
            ELEMENT_END => Ok(Self::ElementEnd { group, element }),
            "" => Err(invalid()),
            marker if marker.starts_with('(') => Err(invalid()),
            field => Ok(Self::Field {
                group,
                field: field.to_string(),
                element,
            }),
        }
    }
}

// =============================================================================
// EXPANSION
// =============================================================================

/// One virtual field of an expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualField {
    /// Composite key.
    pub key: VirtualFieldKey,
    /// Resolved child field schema; `None` for markers.
    pub schema: Option<FieldSchema>,
}

impl VirtualField {
    fn marker(key: VirtualFieldKey) -> Self {
        Self { key, schema: None }
    }

    /// The key as rendered for the host.
    #[must_use]
    pub fn name(&self) -> String {
        self.key.to_string()
    }
}

/// The expanded virtual field list of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    group: String,
    fields: Vec<VirtualField>,
}

impl Expansion {
    /// Expand `definition` over `elements` (first to last).
    #[must_use]
    pub fn build(definition: &Definition, elements: &[ElementId]) -> Self {
        let group = definition.name().to_string();
        let per_element = definition.fields().len().saturating_add(2);
        let mut fields = Vec::with_capacity(elements.len().saturating_mul(per_element).saturating_add(2));

        fields.push(VirtualField::marker(VirtualFieldKey::GroupStart {
            group: group.clone(),
        }));

        for element in elements {
            fields.push(VirtualField::marker(VirtualFieldKey::ElementStart {
                group: group.clone(),
                element: *element,
            }));

            for field in definition.fields() {
                fields.push(VirtualField {
                    key: VirtualFieldKey::Field {
                        group: group.clone(),
                        field: field.name.clone(),
                        element: *element,
                    },
                    schema: Some(field.schema.clone()),
                });
            }

            fields.push(VirtualField::marker(VirtualFieldKey::ElementEnd {
                group: group.clone(),
                element: *element,
            }));
        }

        fields.push(VirtualField::marker(VirtualFieldKey::GroupEnd {
            group: group.clone(),
        }));

        Self { group, fields }
    }

    /// Name of the expanded group.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// All virtual fields in order.
    #[must_use]
    pub fn fields(&self) -> &[VirtualField] {
        &self.fields
    }

    /// All rendered keys in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.fields.iter().map(VirtualField::name).collect()
    }

    /// Element ids in order.
    #[must_use]
    pub fn elements(&self) -> Vec<ElementId> {
        self.fields
            .iter()
            .filter_map(|f| match f.key {
                VirtualFieldKey::ElementStart { element, .. } => Some(element),
                _ => None,
            })
            .collect()
    }

    /// Find a virtual field by its rendered key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&VirtualField> {
        self.fields.iter().find(|f| f.name() == key)
    }

    /// Replace the group field in `palette` with the expanded keys.
    ///
    /// A palette that does not contain the group is returned unchanged.
    #[must_use]
    pub fn splice(&self, palette: &[String]) -> Vec<String> {
        let mut spliced = Vec::with_capacity(palette.len().saturating_add(self.fields.len()));
        for entry in palette {
            if *entry == self.group {
                spliced.extend(self.keys());
            } else {
                spliced.push(entry.clone());
            }
        }
        spliced
    }
}

// =============================================================================
// TESTS
// =============================================================================
