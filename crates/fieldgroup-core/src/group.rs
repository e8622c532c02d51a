//! # Group
//!
//! One group instance, bound to `(table, row, field)`. A group reconciles
//! submitted orderings against its storage, enforces the cardinality of its
//! definition, forwards field access, and builds its expansion.
//!
//! ## Reconciliation
//!
//! `set_elements` takes the client's desired ordering. `-1` entries ask for
//! new elements, known ids are kept, and unknown ("unmapped") ids are
//! dropped. If the submission holds no `-1` at all, the first unmapped id
//! is treated as a creation request instead: it is the provisional id of an
//! element whose creation did not complete in an earlier submission.
//!
//! Elements are created before absent ones are removed, so new ids never
//! reuse ids released in the same call.

use crate::definition::{Definition, StorageKind};
use crate::expansion::Expansion;
use crate::schema::FieldSchema;
use crate::storage::Storage;
use crate::{ElementId, GroupError, GroupKey, NEW_ELEMENT, RowId, Value};
use std::collections::BTreeSet;
use std::rc::Rc;

/// A submitted entry after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Create,
    Keep(ElementId),
    Unmapped(ElementId),
}

/// A group instance.
#[derive(Debug)]
pub struct Group {
    key: GroupKey,
    definition: Rc<Definition>,
    storage: Box<dyn Storage>,
    changed: bool,
    expansion: Option<Expansion>,
}

impl Group {
    /// Create a group over `storage`.
    #[must_use]
    pub fn new(key: GroupKey, definition: Rc<Definition>, storage: Box<dyn Storage>) -> Self {
        Self {
            key,
            definition,
            storage,
            changed: false,
            expansion: None,
        }
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    /// Apply a submitted ordering and return the resulting element ids.
    ///
    /// `0` and repeated ids are ignored. The result always satisfies the
    /// definition's min/max and, for sortable groups, is the new storage
    /// order.
    pub fn set_elements(&mut self, submitted: &[i64]) -> Result<Vec<ElementId>, GroupError> {
        let existing = self.storage.get_elements()?;
        let existing_set: BTreeSet<ElementId> = existing.iter().copied().collect();

        let mut seen = BTreeSet::new();
        let mut slots = Vec::with_capacity(submitted.len());
        for raw in submitted {
            if *raw == NEW_ELEMENT {
                slots.push(Slot::Create);
                continue;
            }
            let Some(id) = ElementId::from_raw(*raw) else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            slots.push(if existing_set.contains(&id) {
                Slot::Keep(id)
            } else {
                Slot::Unmapped(id)
            });
        }

        if !slots.contains(&Slot::Create) {
            if let Some(slot) = slots.iter_mut().find(|s| matches!(s, Slot::Unmapped(_))) {
                tracing::debug!(group = %self.key, slot = ?slot, "Recovering unmapped element");
                *slot = Slot::Create;
            }
        }

        let mut ids = Vec::with_capacity(slots.len());
        for slot in &slots {
            match slot {
                Slot::Create => ids.push(self.storage.create_element()?),
                Slot::Keep(id) => ids.push(*id),
                Slot::Unmapped(id) => {
                    tracing::debug!(group = %self.key, id = %id, "Dropping unmapped element");
                }
            }
        }

        let kept: BTreeSet<ElementId> = ids.iter().copied().collect();
        for id in existing.iter().filter(|id| !kept.contains(id)) {
            self.storage.remove_element(*id)?;
        }

        let ids = self.apply_min_max_constraints(ids)?;

        self.expansion = None;

        if self.definition.is_sortable() {
            self.storage.order_elements(&ids)?;
            Ok(ids)
        } else {
            self.storage.get_elements()
        }
    }

    /// Fill `ids` up to `min` with new elements, or trim it down to `max`
    /// by removing trailing elements.
    pub fn apply_min_max_constraints(
        &mut self,
        mut ids: Vec<ElementId>,
    ) -> Result<Vec<ElementId>, GroupError> {
        let min = self.definition.min_elements();
        let max = self.definition.max_elements();

        if ids.len() < min {
            while ids.len() < min {
                ids.push(self.storage.create_element()?);
            }
        } else if max > 0 && ids.len() > max {
            let trimmed = ids.split_off(max);
            for id in trimmed.iter().rev() {
                self.storage.remove_element(*id)?;
            }
        }

        Ok(ids)
    }

    // =========================================================================
    // FIELD ACCESS & PERSISTENCE
    // =========================================================================

    /// Read one field of one element.
    pub fn get_field(&mut self, id: ElementId, field: &str) -> Result<Value, GroupError> {
        self.storage.get_field(id, field)
    }

    /// Stage a new value for one field of one element.
    pub fn set_field(&mut self, id: ElementId, field: &str, value: Value) -> Result<(), GroupError> {
        self.storage.set_field(id, field, value)
    }

    /// Current element ids, first to last.
    pub fn elements(&mut self) -> Result<Vec<ElementId>, GroupError> {
        self.storage.get_elements()
    }

    /// Flush staged changes. Returns `true` iff storage wrote something.
    pub fn persist(&mut self) -> Result<bool, GroupError> {
        let wrote = self.storage.persist()?;
        if wrote {
            self.changed = true;
            tracing::debug!(group = %self.key, "Persisted group");
        }
        Ok(wrote)
    }

    /// Delete all durable data of the group.
    pub fn remove(&mut self) -> Result<(), GroupError> {
        self.storage.remove()?;
        tracing::debug!(group = %self.key, "Removed group");
        Ok(())
    }

    /// Build (once) and return the expansion of this group.
    ///
    /// The element list is brought within min/max first.
    pub fn expand(&mut self) -> Result<&Expansion, GroupError> {
        let expansion = match self.expansion.take() {
            Some(expansion) => expansion,
            None => {
                let elements = self.storage.get_elements()?;
                let elements = self.apply_min_max_constraints(elements)?;
                Expansion::build(&self.definition, &elements)
            }
        };

        Ok(&*self.expansion.insert(expansion))
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Group identity.
    #[must_use]
    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Host table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.key.table
    }

    /// Host row.
    #[must_use]
    pub fn row(&self) -> RowId {
        self.key.row
    }

    /// Group field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.key.name
    }

    #[must_use]
    pub fn label(&self) -> &str {
        self.definition.label()
    }

    #[must_use]
    pub fn description(&self) -> &str {
        self.definition.description()
    }

    /// Declared child field names.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.definition.field_names()
    }

    #[must_use]
    pub fn min_elements(&self) -> usize {
        self.definition.min_elements()
    }

    #[must_use]
    pub fn max_elements(&self) -> usize {
        self.definition.max_elements()
    }

    /// Resolved schema of a declared child field.
    #[must_use]
    pub fn field_definition(&self, name: &str) -> Option<&FieldSchema> {
        self.definition.field(name).map(|f| &f.schema)
    }

    #[must_use]
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Kind of the storage actually in use.
    #[must_use]
    pub fn storage_kind(&self) -> StorageKind {
        self.storage.kind()
    }

    /// Whether `persist` wrote anything during this request.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.changed
    }
}

// =============================================================================
// TESTS
// =============================================================================
