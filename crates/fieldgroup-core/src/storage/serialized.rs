//! # Serialized Storage
//!
//! Stores all elements of a group as one blob in the column named after the
//! group on the host row. See `formats::blob` for the encoding.
//!
//! The blob is loaded on first access and kept as a working copy. Mutations
//! only touch the working copy; `persist` writes it back if its encoding
//! differs from the snapshot taken at load time.

use super::{GroupContext, RowStore, Storage, check_field, check_permutation};
use crate::definition::StorageKind;
use crate::formats::{BlobElements, decode_blob, encode_blob, normalize_values};
use crate::{ElementId, GroupError, Value};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Blob-column storage backend.
#[derive(Debug)]
pub struct SerializedStorage {
    context: GroupContext,
    rows: Rc<dyn RowStore>,
    /// Column bytes as loaded or last written.
    snapshot: Vec<u8>,
    /// Working copy, `None` until first access.
    data: Option<BlobElements>,
}

impl SerializedStorage {
    /// Create a storage for the group in `context`. Nothing is loaded yet.
    #[must_use]
    pub fn new(context: GroupContext, rows: Rc<dyn RowStore>) -> Self {
        Self {
            context,
            rows,
            snapshot: Vec::new(),
            data: None,
        }
    }

    fn data(&mut self) -> Result<&mut BlobElements, GroupError> {
        if self.data.is_none() {
            let key = &self.context.key;
            let bytes = self
                .rows
                .fetch_column(&key.table, key.row, &key.name)?
                .unwrap_or_default();
            let elements = decode_blob(&bytes, &self.context.fields())?;

            tracing::debug!(group = %key, elements = elements.len(), "Loaded serialized group");

            self.snapshot = bytes;
            self.data = Some(elements);
        }

        self.data
            .as_mut()
            .ok_or_else(|| GroupError::IoError("Group data was not loaded.".to_string()))
    }

    fn element(&mut self, id: ElementId) -> Result<&mut serde_json::Map<String, Value>, GroupError> {
        self.data()?
            .iter_mut()
            .find(|(element, _)| *element == id)
            .map(|(_, values)| values)
            .ok_or(GroupError::ElementNotFound(id))
    }
}

impl Storage for SerializedStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Serialized
    }

    fn get_elements(&mut self) -> Result<Vec<ElementId>, GroupError> {
        Ok(self.data()?.iter().map(|(id, _)| *id).collect())
    }

    fn create_element(&mut self) -> Result<ElementId, GroupError> {
        let values = normalize_values(&Value::Null, &self.context.fields());
        let data = self.data()?;
        let id = ElementId::next(data.iter().map(|(id, _)| id))?;

        data.push((id, values));
        tracing::debug!(group = %self.context.key, id = %id, "Created element");

        Ok(id)
    }

    fn remove_element(&mut self, id: ElementId) -> Result<(), GroupError> {
        let data = self.data()?;
        let index = data
            .iter()
            .position(|(element, _)| *element == id)
            .ok_or(GroupError::ElementNotFound(id))?;

        data.remove(index);
        tracing::debug!(group = %self.context.key, id = %id, "Removed element");

        Ok(())
    }

    fn order_elements(&mut self, order: &[ElementId]) -> Result<(), GroupError> {
        let data = self.data()?;
        let current: Vec<ElementId> = data.iter().map(|(id, _)| *id).collect();
        check_permutation(&current, order)?;

        let mut by_id: BTreeMap<ElementId, _> = data.drain(..).collect();
        for id in order {
            if let Some(values) = by_id.remove(id) {
                data.push((*id, values));
            }
        }

        Ok(())
    }

    fn get_field(&mut self, id: ElementId, field: &str) -> Result<Value, GroupError> {
        self.element(id)?;
        check_field(&self.context, field)?;

        Ok(self.element(id)?.get(field).cloned().unwrap_or(Value::Null))
    }

    fn set_field(&mut self, id: ElementId, field: &str, value: Value) -> Result<(), GroupError> {
        self.element(id)?;
        check_field(&self.context, field)?;

        self.element(id)?.insert(field.to_string(), value);
        Ok(())
    }

    fn persist(&mut self) -> Result<bool, GroupError> {
        let Some(data) = &self.data else {
            return Ok(false);
        };

        if data.is_empty() && self.snapshot.iter().all(u8::is_ascii_whitespace) {
            return Ok(false);
        }

        let bytes = encode_blob(data)?;
        if bytes == self.snapshot {
            return Ok(false);
        }

        let key = &self.context.key;
        self.rows
            .update_column(&key.table, key.row, &key.name, &bytes)?;
        tracing::debug!(group = %key, bytes = bytes.len(), "Wrote serialized group");

        self.snapshot = bytes;
        Ok(true)
    }

    fn remove(&mut self) -> Result<(), GroupError> {
        // The column goes away with the host row.
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Definition;
    use crate::schema::{FieldSchema, TableSchema};
    use crate::storage::MemoryDatabase;
    use crate::{GroupKey, RowId};
    use serde_json::json;

    fn setup(blob: Option<&str>) -> (Rc<MemoryDatabase>, SerializedStorage) {
        let table = TableSchema::new("tl_foo")
            .with_field(
                FieldSchema::new("my_group", "group").with_attribute("palette", json!(["foo", "bar"])),
            )
            .with_field(FieldSchema::new("foo", "text"))
            .with_field(FieldSchema::new("bar", "text"));
        let definition = Rc::new(Definition::parse(&table, "my_group").expect("definition"));

        let db = Rc::new(MemoryDatabase::new());
        let row = db.insert_row("tl_foo").expect("row");
        if let Some(blob) = blob {
            db.update_column("tl_foo", row, "my_group", blob.as_bytes())
                .expect("seed");
        }

        let context = GroupContext::new(GroupKey::new("tl_foo", row, "my_group"), definition);
        let storage = SerializedStorage::new(context, db.clone());
        (db, storage)
    }

    fn stored(db: &MemoryDatabase) -> String {
        let bytes = db
            .fetch_column("tl_foo", RowId(1), "my_group")
            .expect("fetch")
            .unwrap_or_default();
        String::from_utf8(bytes).expect("utf8")
    }

    const SEEDED: &str = r#"{"1":{"foo":"a","bar":"b"},"2":{"foo":"c","bar":"d"},"3":{"foo":"e","bar":"f"}}"#;

    #[test]
    fn lists_elements_in_blob_order() {
        let (_, mut storage) = setup(Some(SEEDED));
        assert_eq!(
            storage.get_elements().expect("elements"),
            vec![ElementId(1), ElementId(2), ElementId(3)]
        );
    }

    #[test]
    fn creates_element_with_next_id() {
        let (_, mut storage) = setup(Some(SEEDED));

        assert_eq!(storage.create_element().expect("create"), ElementId(4));
        assert_eq!(storage.get_field(ElementId(4), "foo").expect("get"), Value::Null);
    }

    #[test]
    fn persists_once() {
        let (db, mut storage) = setup(Some(SEEDED));
        storage.create_element().expect("create");

        assert!(storage.persist().expect("persist"));
        assert!(!storage.persist().expect("persist"));
        assert_eq!(db.column_writes(), 2);
        assert!(stored(&db).contains(r#""4":{"foo":null,"bar":null}"#));
    }

    #[test]
    fn unchanged_blob_is_not_written() {
        let (db, mut storage) = setup(Some(SEEDED));
        storage.get_elements().expect("elements");

        assert!(!storage.persist().expect("persist"));
        assert_eq!(db.column_writes(), 1);
    }

    #[test]
    fn empty_group_is_not_written() {
        let (db, mut storage) = setup(None);
        storage.get_elements().expect("elements");

        assert!(!storage.persist().expect("persist"));
        assert_eq!(db.column_writes(), 0);
    }

    #[test]
    fn persist_before_load_is_noop() {
        let (db, mut storage) = setup(Some(SEEDED));
        assert!(!storage.persist().expect("persist"));
        assert_eq!(db.column_writes(), 1);
    }

    #[test]
    fn orders_elements() {
        let (db, mut storage) = setup(Some(SEEDED));
        storage
            .order_elements(&[ElementId(2), ElementId(1), ElementId(3)])
            .expect("order");

        assert_eq!(
            storage.get_elements().expect("elements"),
            vec![ElementId(2), ElementId(1), ElementId(3)]
        );
        assert!(storage.persist().expect("persist"));
        assert!(stored(&db).starts_with(r#"{"2":"#));
    }

    #[test]
    fn rejects_mismatched_order() {
        let (db, mut storage) = setup(Some(SEEDED));
        let original = vec![ElementId(1), ElementId(2), ElementId(3)];

        for order in [
            vec![ElementId(1), ElementId(2), ElementId(3), ElementId(4)],
            vec![ElementId(2), ElementId(1)],
            vec![ElementId(3), ElementId(2), ElementId(2), ElementId(1)],
        ] {
            assert!(matches!(
                storage.order_elements(&order),
                Err(GroupError::InvalidArgument(_))
            ));
            assert_eq!(storage.get_elements().expect("elements"), original);
        }

        assert!(!storage.persist().expect("persist"));
        assert_eq!(db.column_writes(), 1);
    }

    #[test]
    fn removes_element() {
        let (_, mut storage) = setup(Some(SEEDED));
        storage.remove_element(ElementId(2)).expect("remove");

        assert_eq!(
            storage.get_elements().expect("elements"),
            vec![ElementId(1), ElementId(3)]
        );
        assert!(matches!(
            storage.remove_element(ElementId(2)),
            Err(GroupError::ElementNotFound(ElementId(2)))
        ));
    }

    #[test]
    fn gets_and_sets_fields() {
        let (db, mut storage) = setup(Some(SEEDED));

        assert_eq!(storage.get_field(ElementId(2), "bar").expect("get"), json!("d"));
        storage
            .set_field(ElementId(2), "bar", json!("changed"))
            .expect("set");
        assert_eq!(
            storage.get_field(ElementId(2), "bar").expect("get"),
            json!("changed")
        );

        assert!(matches!(
            storage.get_field(ElementId(2), "other"),
            Err(GroupError::FieldNotFound(_))
        ));
        assert!(matches!(
            storage.set_field(ElementId(9), "foo", json!(1)),
            Err(GroupError::ElementNotFound(ElementId(9)))
        ));

        storage.persist().expect("persist");
        assert!(stored(&db).contains(r#""bar":"changed""#));
    }

    #[test]
    fn normalizes_loaded_data() {
        let (_, mut storage) = setup(Some(r#"{"1":{"foo":"a","zzz":1},"x":{"foo":"b"}}"#));

        assert_eq!(storage.get_elements().expect("elements"), vec![ElementId(1)]);
        assert_eq!(storage.get_field(ElementId(1), "bar").expect("get"), Value::Null);
        assert!(matches!(
            storage.get_field(ElementId(1), "zzz"),
            Err(GroupError::FieldNotFound(_))
        ));
    }
}
