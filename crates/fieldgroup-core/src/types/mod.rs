//! # Core Type Definitions
//!
//! This module contains the identifiers and the error type shared by every
//! other module:
//! - Element and row identifiers (`ElementId`, `RowId`)
//! - The group identity tuple (`GroupKey`)
//! - Field values (`Value`)
//! - Error types (`GroupError`)
//!
//! ## Determinism Guarantees
//!
//! - Element ids are generated as `max + 1`, never at random
//! - All identifiers implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Id arithmetic is checked; exhausting the id space is an error, not a wrap

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque value stored in an element field.
///
/// Any scalar or structured JSON value. `Value::Null` is the fallback for
/// declared fields that have no stored data.
pub use serde_json::Value;

// =============================================================================
// ELEMENT IDENTIFIERS
// =============================================================================

/// Submitted-ordering marker meaning "create a new element here".
pub const NEW_ELEMENT: i64 = -1;

/// Identifier of one element, unique within its owning group.
///
/// Storage backends only ever hand out positive ids. Negative ids other than
/// the [`NEW_ELEMENT`] sentinel may still appear in legacy blob data and are
/// accepted there, since only `0` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub i64);

impl ElementId {
    /// Check if a raw value is a valid element id.
    ///
    /// `0` is reserved and never identifies an element.
    #[must_use]
    pub const fn validate(raw: i64) -> bool {
        raw != 0
    }

    /// Build an element id from a raw value, rejecting reserved values.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Option<Self> {
        if Self::validate(raw) {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Get the next available element id.
    ///
    /// Returns `max(existing) + 1`, or `1` if `existing` is empty. The output
    /// is a pure function of the input set. Negative maxima are clamped to
    /// zero first, so the result is always positive and never in `existing`.
    pub fn next<'a>(existing: impl IntoIterator<Item = &'a ElementId>) -> Result<Self, GroupError> {
        let max = existing.into_iter().map(|id| id.0).max().unwrap_or(0).max(0);

        max.checked_add(1).map(Self).ok_or_else(|| {
            GroupError::InvalidArgument("Element id space is exhausted.".to_string())
        })
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ROW & GROUP IDENTITY
// =============================================================================

/// Identifier of a parent row in a host table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one group instance: the group field `name` on row `row` of
/// host table `table`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    /// Host table name.
    pub table: String,
    /// Parent row id.
    pub row: RowId,
    /// Group field name.
    pub name: String,
}

impl GroupKey {
    /// Create a new group key.
    #[must_use]
    pub fn new(table: impl Into<String>, row: RowId, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row,
            name: name.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}", self.table, self.row, self.name)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while managing groups.
///
/// - No silent failures
/// - Use `Result<T, GroupError>` for fallible operations
/// - Storage failures are propagated as-is; nothing is retried
#[derive(Debug, Error)]
pub enum GroupError {
    /// A group definition could not be parsed or validated.
    #[error("{0}")]
    InvalidDefinition(String),

    /// The referenced element does not exist in the group.
    #[error("Element '{0}' does not exist.")]
    ElementNotFound(ElementId),

    /// The referenced field is not declared for the group's elements.
    #[error("Field '{0}' does not exist.")]
    FieldNotFound(String),

    /// An operation received arguments that do not match the current state.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The durable record a group must attach to does not exist.
    #[error("No group record was found for table '{table}' ID {row}.")]
    RecordNotFound {
        /// Host table name.
        table: String,
        /// Parent row id.
        row: RowId,
    },

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred in the underlying storage.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
