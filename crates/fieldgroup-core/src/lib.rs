//! # fieldgroup-core
//!
//! Ordered, bounded groups of elements nested inside one field of one
//! parent record.
//!
//! A group field declares a palette of child fields and a cardinality. Each
//! element of the group is a small record holding values for those child
//! fields. This crate:
//! - reconciles a client-submitted ordering (with `-1` for new elements)
//!   against the persisted elements,
//! - enforces min/max cardinality,
//! - persists through one `Storage` contract with serialized-blob, entity
//!   and null backends,
//! - expands a group into the flat list of virtual fields a form host
//!   renders.
//!
//! ## Constraints
//!
//! - Request-scoped and single-threaded: groups live in a `Registry` for one
//!   request, database handles are shared through `Rc`
//! - Deterministic: `BTreeMap` ordering, `max + 1` element ids
//! - No async, no network dependencies

// =============================================================================
// MODULES
// =============================================================================

pub mod definition;
pub mod entity;
pub mod expansion;
pub mod formats;
pub mod group;
pub mod hooks;
pub mod primitives;
pub mod registry;
pub mod schema;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{ElementId, GroupError, GroupKey, NEW_ELEMENT, RowId, Value};

// =============================================================================
// RE-EXPORTS: Groups
// =============================================================================

pub use definition::{Definition, EntityMapping, FieldRef, PositionOrder, Relation, StorageKind};
pub use entity::{DynamicElement, ElementEntity, FieldAccessible, field_value, to_field_value};
pub use expansion::{Expansion, VirtualField, VirtualFieldKey};
pub use group::Group;
pub use hooks::{FormHooks, LoadedForm, parse_ordering};
pub use registry::Registry;
pub use schema::{Catalog, FieldSchema, TableSchema, merge_properties};

// =============================================================================
// RE-EXPORTS: Storage (from storage module)
// =============================================================================

pub use storage::{
    ElementRecord, EntityStorage, EntityStore, GroupContext, MemoryDatabase, NullStorage, OwnerId,
    OwnerKey, RedbDatabase, RowStore, SerializedStorage, Storage,
};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{BlobElements, decode_blob, encode_blob, normalize_values};
