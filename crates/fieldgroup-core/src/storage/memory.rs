//! # In-Memory Database
//!
//! A volatile implementation of `RowStore` and `EntityStore`.
//!
//! All data structures use `BTreeMap` for deterministic ordering. State
//! lives behind a `RefCell` because the capabilities take `&self`; the
//! database is shared between the storages of one request via `Rc`.

use super::{ElementRecord, EntityStore, OwnerId, OwnerKey, RowStore};
use crate::{ElementId, GroupError, RowId};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct State {
    /// Existing host rows.
    rows: BTreeSet<(String, RowId)>,
    /// Last issued row id per table.
    row_ids: BTreeMap<String, u64>,
    /// Host row columns: (table, row, column) -> bytes
    columns: BTreeMap<(String, RowId, String), Vec<u8>>,
    /// Owner index: key -> owner
    owners: BTreeMap<OwnerKey, OwnerId>,
    /// Element records: (owner, element) -> (position, payload)
    elements: BTreeMap<(OwnerId, ElementId), (i64, Vec<u8>)>,
    next_owner: u64,
    next_element: i64,
}

impl State {
    fn issue_element_id(&mut self) -> Result<ElementId, GroupError> {
        self.next_element = self.next_element.max(0).checked_add(1).ok_or_else(|| {
            GroupError::IoError("Element id sequence is exhausted.".to_string())
        })?;
        Ok(ElementId(self.next_element))
    }
}

/// Volatile database for tests and transient hosts.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: RefCell<State>,
    column_writes: Cell<usize>,
    element_writes: Cell<usize>,
}

impl MemoryDatabase {
    /// Create an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of column writes so far.
    #[must_use]
    pub fn column_writes(&self) -> usize {
        self.column_writes.get()
    }

    /// Number of element inserts and element batch writes so far.
    #[must_use]
    pub fn element_writes(&self) -> usize {
        self.element_writes.get()
    }

    fn bump(counter: &Cell<usize>) {
        counter.set(counter.get().saturating_add(1));
    }
}

impl RowStore for MemoryDatabase {
    fn row_exists(&self, table: &str, row: RowId) -> Result<bool, GroupError> {
        Ok(self.state.borrow().rows.contains(&(table.to_string(), row)))
    }

    fn insert_row(&self, table: &str) -> Result<RowId, GroupError> {
        let mut state = self.state.borrow_mut();
        let last = state.row_ids.entry(table.to_string()).or_insert(0);
        *last = last
            .checked_add(1)
            .ok_or_else(|| GroupError::IoError(format!("Row id sequence of '{table}' is exhausted.")))?;
        let row = RowId(*last);

        state.rows.insert((table.to_string(), row));
        Ok(row)
    }

    fn delete_row(&self, table: &str, row: RowId) -> Result<bool, GroupError> {
        let mut state = self.state.borrow_mut();
        let existed = state.rows.remove(&(table.to_string(), row));
        state
            .columns
            .retain(|(t, r, _), _| !(t == table && *r == row));
        Ok(existed)
    }

    fn fetch_column(
        &self,
        table: &str,
        row: RowId,
        column: &str,
    ) -> Result<Option<Vec<u8>>, GroupError> {
        Ok(self
            .state
            .borrow()
            .columns
            .get(&(table.to_string(), row, column.to_string()))
            .cloned())
    }

    fn update_column(
        &self,
        table: &str,
        row: RowId,
        column: &str,
        bytes: &[u8],
    ) -> Result<(), GroupError> {
        let mut state = self.state.borrow_mut();
        if !state.rows.contains(&(table.to_string(), row)) {
            return Err(GroupError::RecordNotFound {
                table: table.to_string(),
                row,
            });
        }

        state
            .columns
            .insert((table.to_string(), row, column.to_string()), bytes.to_vec());
        Self::bump(&self.column_writes);
        Ok(())
    }
}

impl EntityStore for MemoryDatabase {
    fn find_owner(&self, key: &OwnerKey) -> Result<Option<OwnerId>, GroupError> {
        Ok(self.state.borrow().owners.get(key).copied())
    }

    fn create_owner(&self, key: &OwnerKey) -> Result<OwnerId, GroupError> {
        let mut state = self.state.borrow_mut();
        if let Some(owner) = state.owners.get(key) {
            return Ok(*owner);
        }

        state.next_owner = state
            .next_owner
            .checked_add(1)
            .ok_or_else(|| GroupError::IoError("Owner id sequence is exhausted.".to_string()))?;
        let owner = OwnerId(state.next_owner);
        state.owners.insert(key.clone(), owner);
        Ok(owner)
    }

    fn remove_owner(&self, owner: OwnerId) -> Result<(), GroupError> {
        let mut state = self.state.borrow_mut();
        state.owners.retain(|_, o| *o != owner);
        state.elements.retain(|(o, _), _| *o != owner);
        Ok(())
    }

    fn load_elements(&self, owner: OwnerId) -> Result<Vec<ElementRecord>, GroupError> {
        Ok(self
            .state
            .borrow()
            .elements
            .range((owner, ElementId(i64::MIN))..=(owner, ElementId(i64::MAX)))
            .map(|((_, id), (position, payload))| ElementRecord {
                id: *id,
                position: *position,
                payload: payload.clone(),
            })
            .collect())
    }

    fn insert_element(
        &self,
        owner: OwnerId,
        position: i64,
        payload: &[u8],
    ) -> Result<ElementId, GroupError> {
        let mut state = self.state.borrow_mut();
        let id = state.issue_element_id()?;
        state
            .elements
            .insert((owner, id), (position, payload.to_vec()));
        Self::bump(&self.element_writes);
        Ok(id)
    }

    fn write_elements(
        &self,
        owner: OwnerId,
        changed: &[ElementRecord],
        removed: &[ElementId],
    ) -> Result<(), GroupError> {
        let mut state = self.state.borrow_mut();
        for record in changed {
            state.next_element = state.next_element.max(record.id.value());
            state
                .elements
                .insert((owner, record.id), (record.position, record.payload.clone()));
        }
        for id in removed {
            state.elements.remove(&(owner, *id));
        }
        Self::bump(&self.element_writes);
        Ok(())
    }
}
