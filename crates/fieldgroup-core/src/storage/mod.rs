//! # Group Storage
//!
//! Every group owns exactly one `Storage`. It holds the durable truth about
//! which elements exist, their order, and their field values.
//!
//! Backends:
//! - `SerializedStorage`: all elements in one blob column of the host row
//! - `EntityStorage<E>`: one record per element, owned by an owner record
//! - `NullStorage`: transient, for rows that cannot hold elements
//!
//! Backends talk to the database through two narrow capabilities,
//! `RowStore` (host rows and their columns) and `EntityStore` (owner and
//! element records). Both are implemented by `MemoryDatabase` (volatile)
//! and `RedbDatabase` (disk-backed, ACID).
//!
//! ## Ordering
//!
//! Every backend returns elements first-to-last. Element ids handed out by
//! backends are always positive.

pub mod entity;
pub mod memory;
pub mod null;
pub mod redb_store;
pub mod serialized;

pub use entity::EntityStorage;
pub use memory::MemoryDatabase;
pub use null::NullStorage;
pub use redb_store::RedbDatabase;
pub use serialized::SerializedStorage;

use crate::definition::{Definition, StorageKind};
use crate::{ElementId, GroupError, GroupKey, RowId, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// STORAGE TRAIT
// =============================================================================

/// The storage contract shared by all backends.
///
/// Mutators stage their changes; only `persist` (and `create_element` for
/// backends that must issue ids from the database) writes durably.
pub trait Storage: fmt::Debug {
    /// Backend kind.
    fn kind(&self) -> StorageKind;

    /// Current element ids, first to last.
    fn get_elements(&mut self) -> Result<Vec<ElementId>, GroupError>;

    /// Create an element with default field values and append it.
    fn create_element(&mut self) -> Result<ElementId, GroupError>;

    /// Remove an element.
    ///
    /// Fails with `ElementNotFound` if `id` does not exist.
    fn remove_element(&mut self, id: ElementId) -> Result<(), GroupError>;

    /// Reorder elements. `order` must be a permutation of the current ids.
    ///
    /// Fails with `InvalidArgument` otherwise.
    fn order_elements(&mut self, order: &[ElementId]) -> Result<(), GroupError>;

    /// Read one field of one element.
    fn get_field(&mut self, id: ElementId, field: &str) -> Result<Value, GroupError>;

    /// Stage a new value for one field of one element.
    fn set_field(&mut self, id: ElementId, field: &str, value: Value) -> Result<(), GroupError>;

    /// Flush staged changes. Returns `true` iff a durable write happened.
    ///
    /// Calling `persist` twice without a mutation in between writes nothing
    /// the second time.
    fn persist(&mut self) -> Result<bool, GroupError>;

    /// Delete all durable data of the group.
    fn remove(&mut self) -> Result<(), GroupError>;
}

/// Check that `order` is a permutation of `current`.
pub(crate) fn check_permutation(
    current: &[ElementId],
    order: &[ElementId],
) -> Result<(), GroupError> {
    let current_set: BTreeSet<_> = current.iter().copied().collect();
    let order_set: BTreeSet<_> = order.iter().copied().collect();

    if order.len() != current.len() || order_set != current_set {
        return Err(GroupError::InvalidArgument(
            "Cannot order, provided elements do not match stored data.".to_string(),
        ));
    }

    Ok(())
}

/// Check that `field` is declared by the group.
pub(crate) fn check_field(context: &GroupContext, field: &str) -> Result<(), GroupError> {
    if context.definition.has_field(field) {
        Ok(())
    } else {
        Err(GroupError::FieldNotFound(field.to_string()))
    }
}

// =============================================================================
// GROUP CONTEXT
// =============================================================================

/// What a storage backend knows about the group it serves.
#[derive(Debug, Clone)]
pub struct GroupContext {
    /// Group identity.
    pub key: GroupKey,
    /// Shared group definition.
    pub definition: Rc<Definition>,
}

impl GroupContext {
    /// Create a context.
    #[must_use]
    pub fn new(key: GroupKey, definition: Rc<Definition>) -> Self {
        Self { key, definition }
    }

    /// Declared field names in display order.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.definition.field_names()
    }
}

// =============================================================================
// PERSISTENCE CAPABILITIES
// =============================================================================

/// Access to host rows and their columns.
pub trait RowStore: fmt::Debug {
    /// Check whether a host row exists.
    fn row_exists(&self, table: &str, row: RowId) -> Result<bool, GroupError>;

    /// Insert a new empty host row and return its id.
    fn insert_row(&self, table: &str) -> Result<RowId, GroupError>;

    /// Delete a host row with all its columns. Returns `false` if it did not exist.
    fn delete_row(&self, table: &str, row: RowId) -> Result<bool, GroupError>;

    /// Read a column of a host row. `None` if the column was never written.
    fn fetch_column(
        &self,
        table: &str,
        row: RowId,
        column: &str,
    ) -> Result<Option<Vec<u8>>, GroupError>;

    /// Write a column of an existing host row.
    ///
    /// Fails with `RecordNotFound` if the row does not exist.
    fn update_column(
        &self,
        table: &str,
        row: RowId,
        column: &str,
        bytes: &[u8],
    ) -> Result<(), GroupError>;
}

/// Identifier of an owner record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lookup key of an owner record.
///
/// In local mode `entity` equals the host table and `association` is the
/// group name. In referenced mode `entity` names the standalone group
/// entity and `table`/`row` are the source table and source id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerKey {
    /// Owner entity name.
    pub entity: String,
    /// Host (or source) table.
    pub table: String,
    /// Host (or source) row.
    pub row: RowId,
    /// Association holding the elements.
    pub association: String,
}

/// One stored element record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    /// Element id.
    pub id: ElementId,
    /// Stored position column.
    pub position: i64,
    /// JSON encoding of the element entity.
    pub payload: Vec<u8>,
}

/// Access to owner and element records.
pub trait EntityStore: fmt::Debug {
    /// Find an owner record.
    fn find_owner(&self, key: &OwnerKey) -> Result<Option<OwnerId>, GroupError>;

    /// Create an owner record. Returns the existing one if already present.
    fn create_owner(&self, key: &OwnerKey) -> Result<OwnerId, GroupError>;

    /// Delete an owner record and all its elements.
    fn remove_owner(&self, owner: OwnerId) -> Result<(), GroupError>;

    /// Load all element records of an owner, in id order.
    fn load_elements(&self, owner: OwnerId) -> Result<Vec<ElementRecord>, GroupError>;

    /// Insert an element record immediately and return its new id.
    fn insert_element(
        &self,
        owner: OwnerId,
        position: i64,
        payload: &[u8],
    ) -> Result<ElementId, GroupError>;

    /// Write changed records and delete removed ones in a single transaction.
    fn write_elements(
        &self,
        owner: OwnerId,
        changed: &[ElementRecord],
        removed: &[ElementId],
    ) -> Result<(), GroupError>;
}

// =============================================================================
// TESTS
// =============================================================================
