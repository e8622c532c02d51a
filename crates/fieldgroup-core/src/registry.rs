//! # Registry
//!
//! Request-scoped owner of all `Group` instances.
//!
//! - At most one live group per `(table, row, name)`; every caller in the
//!   request sees the same instance.
//! - Definitions are parsed once per `(table, name)` and shared.
//! - Storage is wired from the definition's `StorageKind`. Entity storage
//!   picks its element type from a map of registered factories; `dynamic`
//!   is always registered.
//!
//! Groups whose host row does not exist get a `NullStorage`, so the host can
//! still render them without creating orphaned data.

use crate::definition::{Definition, StorageKind};
use crate::entity::{DynamicElement, ElementEntity};
use crate::group::Group;
use crate::primitives::DYNAMIC_ELEMENT;
use crate::schema::Catalog;
use crate::storage::{
    EntityStorage, EntityStore, GroupContext, NullStorage, RowStore, SerializedStorage, Storage,
};
use crate::{GroupError, GroupKey, RowId};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::rc::Rc;

/// Constructor of entity storage for one element type.
type ElementFactory =
    fn(GroupContext, Rc<dyn EntityStore>, &dyn RowStore) -> Result<Box<dyn Storage>, GroupError>;

fn element_factory<E: ElementEntity>(
    context: GroupContext,
    store: Rc<dyn EntityStore>,
    rows: &dyn RowStore,
) -> Result<Box<dyn Storage>, GroupError> {
    Ok(Box::new(EntityStorage::<E>::open(context, store, rows)?))
}

// =============================================================================
// STORAGE WIRING
// =============================================================================

struct Wiring {
    rows: Rc<dyn RowStore>,
    entities: Option<Rc<dyn EntityStore>>,
    elements: BTreeMap<String, ElementFactory>,
}

impl Wiring {
    fn storage(&self, context: GroupContext) -> Result<Box<dyn Storage>, GroupError> {
        let definition = Rc::clone(&context.definition);
        let key = &context.key;

        if definition.storage_kind() == StorageKind::Null {
            return Ok(Box::new(NullStorage::new()));
        }

        if !self.rows.row_exists(&key.table, key.row)? {
            tracing::warn!(group = %key, "Host row does not exist, group is detached");
            return Ok(Box::new(NullStorage::new()));
        }

        match definition.storage_kind() {
            StorageKind::Serialized => Ok(Box::new(SerializedStorage::new(
                context,
                Rc::clone(&self.rows),
            ))),
            StorageKind::Entity => {
                let invalid = |msg: String| {
                    GroupError::InvalidDefinition(format!(
                        "Invalid definition for group '{}': {msg}",
                        definition.name()
                    ))
                };

                let store = self
                    .entities
                    .as_ref()
                    .ok_or_else(|| invalid("Entity storage is not available.".to_string()))?;
                let element = &definition.mapping().element;
                let factory = self
                    .elements
                    .get(element)
                    .ok_or_else(|| invalid(format!("Unknown element type '{element}'.")))?;

                factory(context, Rc::clone(store), self.rows.as_ref())
            }
            StorageKind::Null => Ok(Box::new(NullStorage::new())),
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Cache of groups and definitions for one request.
pub struct Registry {
    catalog: Catalog,
    definitions: BTreeMap<(String, String), Rc<Definition>>,
    wiring: Wiring,
    groups: BTreeMap<GroupKey, Group>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("definitions", &self.definitions.len())
            .field("groups", &self.groups.keys().collect::<Vec<_>>())
            .field("element_types", &self.wiring.elements.keys().collect::<Vec<_>>())
            .field("entity_store", &self.wiring.entities.is_some())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create a registry over `catalog` with host rows in `rows`.
    #[must_use]
    pub fn new(catalog: Catalog, rows: Rc<dyn RowStore>) -> Self {
        let mut elements: BTreeMap<String, ElementFactory> = BTreeMap::new();
        elements.insert(
            DYNAMIC_ELEMENT.to_string(),
            element_factory::<DynamicElement>,
        );

        Self {
            catalog,
            definitions: BTreeMap::new(),
            wiring: Wiring {
                rows,
                entities: None,
                elements,
            },
            groups: BTreeMap::new(),
        }
    }

    /// Enable entity storage.
    #[must_use]
    pub fn with_entity_store(mut self, store: Rc<dyn EntityStore>) -> Self {
        self.wiring.entities = Some(store);
        self
    }

    /// Register an element type for entity storage under `name`.
    #[must_use]
    pub fn register_element<E: ElementEntity>(mut self, name: impl Into<String>) -> Self {
        self.wiring.elements.insert(name.into(), element_factory::<E>);
        self
    }

    /// The schema catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Names of all group fields of `table`.
    #[must_use]
    pub fn group_fields(&self, table: &str) -> Vec<String> {
        self.catalog.group_fields(table)
    }

    /// Get the definition of group `name` on `table`, parsing it on first use.
    pub fn definition(&mut self, table: &str, name: &str) -> Result<Rc<Definition>, GroupError> {
        definition_for(&self.catalog, &mut self.definitions, table, name)
    }

    /// Get the group `name` on `row` of `table`, creating it on first use.
    pub fn group(&mut self, table: &str, row: RowId, name: &str) -> Result<&mut Group, GroupError> {
        match self.groups.entry(GroupKey::new(table, row, name)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let definition = definition_for(&self.catalog, &mut self.definitions, table, name)?;
                let context = GroupContext::new(entry.key().clone(), Rc::clone(&definition));
                let storage = self.wiring.storage(context)?;

                tracing::debug!(
                    group = %entry.key(),
                    storage = %storage.kind(),
                    "Initialized group"
                );

                let group = Group::new(entry.key().clone(), definition, storage);
                Ok(entry.insert(group))
            }
        }
    }

    /// The groups initialized so far for `row` of `table`, in name order.
    #[must_use]
    pub fn initialized_groups(&self, table: &str, row: RowId) -> Vec<&Group> {
        self.groups
            .iter()
            .filter(|(key, _)| key.table == table && key.row == row)
            .map(|(_, group)| group)
            .collect()
    }

    /// Mutable access to the groups initialized so far for `row` of `table`.
    pub fn initialized_groups_mut(&mut self, table: &str, row: RowId) -> Vec<&mut Group> {
        self.groups
            .iter_mut()
            .filter(|(key, _)| key.table == table && key.row == row)
            .map(|(_, group)| group)
            .collect()
    }
}

fn definition_for(
    catalog: &Catalog,
    cache: &mut BTreeMap<(String, String), Rc<Definition>>,
    table: &str,
    name: &str,
) -> Result<Rc<Definition>, GroupError> {
    let cache_key = (table.to_string(), name.to_string());
    if let Some(definition) = cache.get(&cache_key) {
        return Ok(Rc::clone(definition));
    }

    let invalid = |msg: String| {
        GroupError::InvalidDefinition(format!("Invalid definition for group '{name}': {msg}"))
    };

    let schema = catalog
        .table(table)
        .ok_or_else(|| invalid(format!("Table '{table}' does not exist.")))?;
    let field = schema
        .field(name)
        .ok_or_else(|| invalid(format!("Field '{name}' does not exist.")))?;
    if !field.is_group() {
        return Err(invalid(format!("Field '{name}' is not a group.")));
    }

    let definition = Rc::new(Definition::parse(schema, name)?);
    cache.insert(cache_key, Rc::clone(&definition));
    Ok(definition)
}

// =============================================================================
// TESTS
// =============================================================================
