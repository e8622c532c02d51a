//! # redb-backed Database
//!
//! A disk-backed implementation of `RowStore` and `EntityStore` using the
//! redb embedded database, providing:
//! - ACID transactions (every mutating call is one write transaction)
//! - Crash safety (copy-on-write B-trees)
//! - Zero configuration
//!
//! Element records are `postcard`-encoded `{ position, payload }` pairs; the
//! payload is the element entity's JSON encoding.

use super::{ElementRecord, EntityStore, OwnerId, OwnerKey, RowStore};
use crate::{ElementId, GroupError, RowId};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Table for host rows: (table, row) -> row
const ROWS: TableDefinition<(&str, u64), u64> = TableDefinition::new("rows");

/// Table for row id sequences: table -> last issued row id
const ROW_IDS: TableDefinition<&str, u64> = TableDefinition::new("row_ids");

/// Table for host row columns: (table, row, column) -> bytes
const COLUMNS: TableDefinition<(&str, u64, &str), &[u8]> = TableDefinition::new("columns");

/// Table for owner lookup: (entity, table, row, association) -> owner
const OWNERS: TableDefinition<(&str, &str, u64, &str), u64> = TableDefinition::new("owners");

/// Reverse owner index: owner -> serialized OwnerKey
const OWNER_KEYS: TableDefinition<u64, &[u8]> = TableDefinition::new("owner_keys");

/// Table for element records: (owner, element) -> serialized StoredElement
const ELEMENTS: TableDefinition<(u64, i64), &[u8]> = TableDefinition::new("elements");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const LAST_OWNER_ID: &str = "last_owner_id";
const LAST_ELEMENT_ID: &str = "last_element_id";

#[derive(Serialize, Deserialize)]
struct StoredElement {
    position: i64,
    payload: Vec<u8>,
}

/// A disk-backed database using redb.
pub struct RedbDatabase {
    /// The redb database handle.
    db: Database,
}

impl std::fmt::Debug for RedbDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDatabase").finish_non_exhaustive()
    }
}

impl RedbDatabase {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GroupError> {
        let db = Database::create(path.as_ref()).map_err(|e| GroupError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(ROWS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(ROW_IDS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(COLUMNS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(OWNERS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(OWNER_KEYS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(ELEMENTS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(METADATA)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| GroupError::IoError(e.to_string()))?;
        }

        tracing::debug!(path = %path.as_ref().display(), "Opened redb database");

        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), GroupError> {
        self.db
            .compact()
            .map_err(|e| GroupError::IoError(e.to_string()))?;
        Ok(())
    }

    /// All rows of `table`, in id order.
    pub fn rows(&self, table: &str) -> Result<Vec<RowId>, GroupError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| GroupError::IoError(e.to_string()))?;
        let rows_table = read_txn
            .open_table(ROWS)
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        let mut rows = Vec::new();
        for entry in rows_table
            .range((table, 0u64)..=(table, u64::MAX))
            .map_err(|e| GroupError::IoError(e.to_string()))?
        {
            let (_, row) = entry.map_err(|e| GroupError::IoError(e.to_string()))?;
            rows.push(RowId(row.value()));
        }
        Ok(rows)
    }
}

impl RowStore for RedbDatabase {
    fn row_exists(&self, table: &str, row: RowId) -> Result<bool, GroupError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| GroupError::IoError(e.to_string()))?;
        let rows_table = read_txn
            .open_table(ROWS)
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        Ok(rows_table
            .get((table, row.0))
            .map_err(|e| GroupError::IoError(e.to_string()))?
            .is_some())
    }

    fn insert_row(&self, table: &str) -> Result<RowId, GroupError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        let row = {
            let mut ids_table = write_txn
                .open_table(ROW_IDS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let mut rows_table = write_txn
                .open_table(ROWS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;

            let last = ids_table
                .get(table)
                .map_err(|e| GroupError::IoError(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0);
            let row = last.checked_add(1).ok_or_else(|| {
                GroupError::IoError(format!("Row id sequence of '{table}' is exhausted."))
            })?;

            ids_table
                .insert(table, row)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            rows_table
                .insert((table, row), row)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            row
        };

        write_txn
            .commit()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        Ok(RowId(row))
    }

    fn delete_row(&self, table: &str, row: RowId) -> Result<bool, GroupError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        let existed = {
            let mut rows_table = write_txn
                .open_table(ROWS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let mut columns_table = write_txn
                .open_table(COLUMNS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;

            let existed = rows_table
                .remove((table, row.0))
                .map_err(|e| GroupError::IoError(e.to_string()))?
                .is_some();

            let mut columns = Vec::new();
            for entry in columns_table
                .range((table, row.0, "")..)
                .map_err(|e| GroupError::IoError(e.to_string()))?
            {
                let (key, _) = entry.map_err(|e| GroupError::IoError(e.to_string()))?;
                let (t, r, column) = key.value();
                if t != table || r != row.0 {
                    break;
                }
                columns.push(column.to_string());
            }

            for column in &columns {
                columns_table
                    .remove((table, row.0, column.as_str()))
                    .map_err(|e| GroupError::IoError(e.to_string()))?;
            }
            existed
        };

        write_txn
            .commit()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        Ok(existed)
    }

    fn fetch_column(
        &self,
        table: &str,
        row: RowId,
        column: &str,
    ) -> Result<Option<Vec<u8>>, GroupError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| GroupError::IoError(e.to_string()))?;
        let columns_table = read_txn
            .open_table(COLUMNS)
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        Ok(columns_table
            .get((table, row.0, column))
            .map_err(|e| GroupError::IoError(e.to_string()))?
            .map(|v| v.value().to_vec()))
    }

    fn update_column(
        &self,
        table: &str,
        row: RowId,
        column: &str,
        bytes: &[u8],
    ) -> Result<(), GroupError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        {
            let rows_table = write_txn
                .open_table(ROWS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            if rows_table
                .get((table, row.0))
                .map_err(|e| GroupError::IoError(e.to_string()))?
                .is_none()
            {
                return Err(GroupError::RecordNotFound {
                    table: table.to_string(),
                    row,
                });
            }

            let mut columns_table = write_txn
                .open_table(COLUMNS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            columns_table
                .insert((table, row.0, column), bytes)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
        }

        write_txn
            .commit()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        Ok(())
    }
}

impl EntityStore for RedbDatabase {
    fn find_owner(&self, key: &OwnerKey) -> Result<Option<OwnerId>, GroupError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| GroupError::IoError(e.to_string()))?;
        let owners_table = read_txn
            .open_table(OWNERS)
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        Ok(owners_table
            .get((
                key.entity.as_str(),
                key.table.as_str(),
                key.row.0,
                key.association.as_str(),
            ))
            .map_err(|e| GroupError::IoError(e.to_string()))?
            .map(|v| OwnerId(v.value())))
    }

    fn create_owner(&self, key: &OwnerKey) -> Result<OwnerId, GroupError> {
        let lookup = (
            key.entity.as_str(),
            key.table.as_str(),
            key.row.0,
            key.association.as_str(),
        );
        let key_bytes =
            postcard::to_allocvec(key).map_err(|e| GroupError::SerializationError(e.to_string()))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        let owner = {
            let mut owners_table = write_txn
                .open_table(OWNERS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let existing = owners_table
                .get(lookup)
                .map_err(|e| GroupError::IoError(e.to_string()))?
                .map(|v| v.value());

            match existing {
                Some(owner) => owner,
                None => {
                    let mut keys_table = write_txn
                        .open_table(OWNER_KEYS)
                        .map_err(|e| GroupError::IoError(e.to_string()))?;
                    let mut meta_table = write_txn
                        .open_table(METADATA)
                        .map_err(|e| GroupError::IoError(e.to_string()))?;

                    let last = meta_table
                        .get(LAST_OWNER_ID)
                        .map_err(|e| GroupError::IoError(e.to_string()))?
                        .map(|v| v.value())
                        .unwrap_or(0);
                    let owner = last.checked_add(1).ok_or_else(|| {
                        GroupError::IoError("Owner id sequence is exhausted.".to_string())
                    })?;

                    meta_table
                        .insert(LAST_OWNER_ID, owner)
                        .map_err(|e| GroupError::IoError(e.to_string()))?;
                    owners_table
                        .insert(lookup, owner)
                        .map_err(|e| GroupError::IoError(e.to_string()))?;
                    keys_table
                        .insert(owner, key_bytes.as_slice())
                        .map_err(|e| GroupError::IoError(e.to_string()))?;
                    owner
                }
            }
        };

        write_txn
            .commit()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        Ok(OwnerId(owner))
    }

    fn remove_owner(&self, owner: OwnerId) -> Result<(), GroupError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        {
            let mut keys_table = write_txn
                .open_table(OWNER_KEYS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let mut owners_table = write_txn
                .open_table(OWNERS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let mut elements_table = write_txn
                .open_table(ELEMENTS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;

            let key_bytes = keys_table
                .remove(owner.0)
                .map_err(|e| GroupError::IoError(e.to_string()))?
                .map(|v| v.value().to_vec());
            if let Some(bytes) = key_bytes {
                let key: OwnerKey = postcard::from_bytes(&bytes)
                    .map_err(|e| GroupError::SerializationError(e.to_string()))?;
                owners_table
                    .remove((
                        key.entity.as_str(),
                        key.table.as_str(),
                        key.row.0,
                        key.association.as_str(),
                    ))
                    .map_err(|e| GroupError::IoError(e.to_string()))?;
            }

            let mut ids = Vec::new();
            for entry in elements_table
                .range((owner.0, i64::MIN)..=(owner.0, i64::MAX))
                .map_err(|e| GroupError::IoError(e.to_string()))?
            {
                let (key, _) = entry.map_err(|e| GroupError::IoError(e.to_string()))?;
                ids.push(key.value().1);
            }
            for id in ids {
                elements_table
                    .remove((owner.0, id))
                    .map_err(|e| GroupError::IoError(e.to_string()))?;
            }
        }

        write_txn
            .commit()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        Ok(())
    }

    fn load_elements(&self, owner: OwnerId) -> Result<Vec<ElementRecord>, GroupError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| GroupError::IoError(e.to_string()))?;
        let elements_table = read_txn
            .open_table(ELEMENTS)
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        let mut records = Vec::new();
        for entry in elements_table
            .range((owner.0, i64::MIN)..=(owner.0, i64::MAX))
            .map_err(|e| GroupError::IoError(e.to_string()))?
        {
            let (key, data) = entry.map_err(|e| GroupError::IoError(e.to_string()))?;
            let stored: StoredElement = postcard::from_bytes(data.value())
                .map_err(|e| GroupError::SerializationError(e.to_string()))?;
            records.push(ElementRecord {
                id: ElementId(key.value().1),
                position: stored.position,
                payload: stored.payload,
            });
        }
        Ok(records)
    }

    fn insert_element(
        &self,
        owner: OwnerId,
        position: i64,
        payload: &[u8],
    ) -> Result<ElementId, GroupError> {
        let bytes = postcard::to_allocvec(&StoredElement {
            position,
            payload: payload.to_vec(),
        })
        .map_err(|e| GroupError::SerializationError(e.to_string()))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        let id = {
            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let mut elements_table = write_txn
                .open_table(ELEMENTS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;

            let last = meta_table
                .get(LAST_ELEMENT_ID)
                .map_err(|e| GroupError::IoError(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0);
            let id = last
                .checked_add(1)
                .filter(|id| i64::try_from(*id).is_ok())
                .ok_or_else(|| {
                    GroupError::IoError("Element id sequence is exhausted.".to_string())
                })?;

            meta_table
                .insert(LAST_ELEMENT_ID, id)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            elements_table
                .insert((owner.0, id as i64), bytes.as_slice())
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            id as i64
        };

        write_txn
            .commit()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        Ok(ElementId(id))
    }

    fn write_elements(
        &self,
        owner: OwnerId,
        changed: &[ElementRecord],
        removed: &[ElementId],
    ) -> Result<(), GroupError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        {
            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
            let mut elements_table = write_txn
                .open_table(ELEMENTS)
                .map_err(|e| GroupError::IoError(e.to_string()))?;

            let mut last = meta_table
                .get(LAST_ELEMENT_ID)
                .map_err(|e| GroupError::IoError(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0);

            for record in changed {
                let bytes = postcard::to_allocvec(&StoredElement {
                    position: record.position,
                    payload: record.payload.clone(),
                })
                .map_err(|e| GroupError::SerializationError(e.to_string()))?;
                elements_table
                    .insert((owner.0, record.id.value()), bytes.as_slice())
                    .map_err(|e| GroupError::IoError(e.to_string()))?;

                if let Ok(id) = u64::try_from(record.id.value()) {
                    last = last.max(id);
                }
            }

            for id in removed {
                elements_table
                    .remove((owner.0, id.value()))
                    .map_err(|e| GroupError::IoError(e.to_string()))?;
            }

            meta_table
                .insert(LAST_ELEMENT_ID, last)
                .map_err(|e| GroupError::IoError(e.to_string()))?;
        }

        write_txn
            .commit()
            .map_err(|e| GroupError::IoError(e.to_string()))?;

        Ok(())
    }
}
