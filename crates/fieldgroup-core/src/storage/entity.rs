//! # Entity Storage
//!
//! Stores each element as its own record, attached to an owner record
//! through an association.
//!
//! ## Owner modes
//!
//! - **Local**: the owner stands for the host row itself. The host row must
//!   exist; the association is named after the group unless configured.
//! - **Referenced**: the owner is a standalone group entity that records the
//!   source table and source id. It is created on first access.
//!
//! ## Positions
//!
//! Every element record carries a `position`. With ascending positions
//! (the default) the element at index `i` gets position `i`. Descending
//! positions are written as `len - 1 - i` for legacy schemas, so both read
//! back first-to-last. Ties are broken by element id.

use super::{
    EntityStore, ElementRecord, GroupContext, OwnerId, OwnerKey, RowStore, Storage, check_field,
    check_permutation,
};
use crate::definition::{PositionOrder, Relation, StorageKind};
use crate::entity::ElementEntity;
use crate::{ElementId, GroupError, Value};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// An element record loaded into memory.
struct Tracked<E> {
    entity: E,
    position: i64,
    /// Position as stored.
    stored_position: i64,
    /// Payload as stored.
    snapshot: Vec<u8>,
}

/// Record-per-element storage backend.
pub struct EntityStorage<E: ElementEntity> {
    context: GroupContext,
    store: Rc<dyn EntityStore>,
    owner: OwnerId,
    elements: BTreeMap<ElementId, Tracked<E>>,
    removed: BTreeSet<ElementId>,
}

impl<E: ElementEntity> fmt::Debug for EntityStorage<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStorage")
            .field("group", &self.context.key)
            .field("owner", &self.owner)
            .field("elements", &self.elements.len())
            .field("removed", &self.removed.len())
            .finish_non_exhaustive()
    }
}

impl<E: ElementEntity> EntityStorage<E> {
    /// Locate (or create) the owner record of the group and load its elements.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::RecordNotFound` in local mode if the host row
    /// does not exist, and `GroupError::SerializationError` if a stored
    /// element cannot be decoded as `E`.
    pub fn open(
        context: GroupContext,
        store: Rc<dyn EntityStore>,
        rows: &dyn RowStore,
    ) -> Result<Self, GroupError> {
        let key = owner_key(&context, rows)?;

        let owner = match store.find_owner(&key)? {
            Some(owner) => owner,
            None => {
                let owner = store.create_owner(&key)?;
                tracing::debug!(group = %context.key, owner = %owner, "Created group owner");
                owner
            }
        };

        let mut elements = BTreeMap::new();
        for record in store.load_elements(owner)? {
            let entity: E = serde_json::from_slice(&record.payload).map_err(|e| {
                GroupError::SerializationError(format!("Element '{}': {e}", record.id))
            })?;
            elements.insert(
                record.id,
                Tracked {
                    entity,
                    position: record.position,
                    stored_position: record.position,
                    snapshot: record.payload,
                },
            );
        }

        tracing::debug!(group = %context.key, elements = elements.len(), "Loaded entity group");

        Ok(Self {
            context,
            store,
            owner,
            elements,
            removed: BTreeSet::new(),
        })
    }

    /// The owner record of this group.
    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    fn positions(&self) -> PositionOrder {
        self.context.definition.mapping().positions
    }

    fn ordered(&self) -> Vec<ElementId> {
        let mut ids: Vec<(i64, ElementId)> = self
            .elements
            .iter()
            .map(|(id, tracked)| (tracked.position, *id))
            .collect();

        match self.positions() {
            PositionOrder::Ascending => ids.sort_unstable(),
            PositionOrder::Descending => ids.sort_unstable_by_key(|(position, id)| (Reverse(*position), *id)),
        }

        ids.into_iter().map(|(_, id)| id).collect()
    }

    fn tracked(&mut self, id: ElementId) -> Result<&mut Tracked<E>, GroupError> {
        self.elements
            .get_mut(&id)
            .ok_or(GroupError::ElementNotFound(id))
    }
}

fn owner_key(context: &GroupContext, rows: &dyn RowStore) -> Result<OwnerKey, GroupError> {
    let key = &context.key;
    let mapping = context.definition.mapping();

    match &mapping.entity {
        Some(entity) => Ok(OwnerKey {
            entity: entity.clone(),
            table: key.table.clone(),
            row: key.row,
            association: mapping.association.clone(),
        }),
        None => {
            if !rows.row_exists(&key.table, key.row)? {
                return Err(GroupError::RecordNotFound {
                    table: key.table.clone(),
                    row: key.row,
                });
            }
            Ok(OwnerKey {
                entity: key.table.clone(),
                table: key.table.clone(),
                row: key.row,
                association: mapping.association.clone(),
            })
        }
    }
}

fn encode<E: ElementEntity>(entity: &E) -> Result<Vec<u8>, GroupError> {
    serde_json::to_vec(entity).map_err(|e| GroupError::SerializationError(e.to_string()))
}

fn exhausted() -> GroupError {
    GroupError::InvalidArgument("Element position space is exhausted.".to_string())
}

impl<E: ElementEntity> Storage for EntityStorage<E> {
    fn kind(&self) -> StorageKind {
        StorageKind::Entity
    }

    fn get_elements(&mut self) -> Result<Vec<ElementId>, GroupError> {
        Ok(self.ordered())
    }

    fn create_element(&mut self) -> Result<ElementId, GroupError> {
        let positions = self.elements.values().map(|t| t.position);
        let position = match self.positions() {
            PositionOrder::Ascending => match positions.max() {
                Some(max) => max.checked_add(1).ok_or_else(exhausted)?,
                None => 0,
            },
            PositionOrder::Descending => match positions.min() {
                Some(min) => min.checked_sub(1).ok_or_else(exhausted)?,
                None => 0,
            },
        };

        let entity = E::default();
        let payload = encode(&entity)?;
        let id = self.store.insert_element(self.owner, position, &payload)?;

        self.elements.insert(
            id,
            Tracked {
                entity,
                position,
                stored_position: position,
                snapshot: payload,
            },
        );
        tracing::debug!(group = %self.context.key, id = %id, position, "Created element");

        Ok(id)
    }

    fn remove_element(&mut self, id: ElementId) -> Result<(), GroupError> {
        self.elements
            .remove(&id)
            .ok_or(GroupError::ElementNotFound(id))?;
        self.removed.insert(id);
        tracing::debug!(group = %self.context.key, id = %id, "Removed element");

        Ok(())
    }

    fn order_elements(&mut self, order: &[ElementId]) -> Result<(), GroupError> {
        check_permutation(&self.ordered(), order)?;

        let last = order.len().saturating_sub(1);
        let positions = self.positions();
        for (index, id) in order.iter().enumerate() {
            let position = match positions {
                PositionOrder::Ascending => index,
                PositionOrder::Descending => last - index,
            };
            self.tracked(*id)?.position = position as i64;
        }

        Ok(())
    }

    fn get_field(&mut self, id: ElementId, field: &str) -> Result<Value, GroupError> {
        self.tracked(id)?;
        check_field(&self.context, field)?;

        self.tracked(id)?.entity.get_field(field)
    }

    fn set_field(&mut self, id: ElementId, field: &str, value: Value) -> Result<(), GroupError> {
        self.tracked(id)?;
        check_field(&self.context, field)?;

        self.tracked(id)?.entity.set_field(field, value)
    }

    fn persist(&mut self) -> Result<bool, GroupError> {
        if self.context.definition.mapping().relation == Relation::OneToOne
            && self.elements.len() > 1
        {
            return Err(GroupError::InvalidArgument(format!(
                "Group '{}' is a one-to-one relation and cannot hold {} elements.",
                self.context.key.name,
                self.elements.len()
            )));
        }

        let mut changed = Vec::new();
        for (id, tracked) in &self.elements {
            let payload = encode(&tracked.entity)?;
            if payload != tracked.snapshot || tracked.position != tracked.stored_position {
                changed.push(ElementRecord {
                    id: *id,
                    position: tracked.position,
                    payload,
                });
            }
        }
        let removed: Vec<ElementId> = self.removed.iter().copied().collect();

        if changed.is_empty() && removed.is_empty() {
            return Ok(false);
        }

        self.store.write_elements(self.owner, &changed, &removed)?;
        tracing::debug!(
            group = %self.context.key,
            changed = changed.len(),
            removed = removed.len(),
            "Wrote entity group"
        );

        for record in changed {
            if let Some(tracked) = self.elements.get_mut(&record.id) {
                tracked.stored_position = record.position;
                tracked.snapshot = record.payload;
            }
        }
        self.removed.clear();

        Ok(true)
    }

    fn remove(&mut self) -> Result<(), GroupError> {
        self.store.remove_owner(self.owner)?;
        tracing::debug!(group = %self.context.key, owner = %self.owner, "Removed group owner");

        self.elements.clear();
        self.removed.clear();
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
