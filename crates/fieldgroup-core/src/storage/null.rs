//! # Null Storage
//!
//! Storage for groups that have nowhere to put their elements, e.g. a host
//! row that does not exist yet or a group declared with `storage = "null"`.
//! The group can still be expanded and rendered, but nothing is kept.

use super::Storage;
use crate::definition::StorageKind;
use crate::{ElementId, GroupError, Value};

/// Transient storage backend.
///
/// Hands out sequential ids starting at 1, always reports no elements, and
/// never writes.
#[derive(Debug, Default)]
pub struct NullStorage {
    last_id: i64,
}

impl NullStorage {
    /// Create a null storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for NullStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Null
    }

    fn get_elements(&mut self) -> Result<Vec<ElementId>, GroupError> {
        Ok(Vec::new())
    }

    fn create_element(&mut self) -> Result<ElementId, GroupError> {
        self.last_id = self.last_id.checked_add(1).ok_or_else(|| {
            GroupError::InvalidArgument("Element id space is exhausted.".to_string())
        })?;

        Ok(ElementId(self.last_id))
    }

    fn remove_element(&mut self, _id: ElementId) -> Result<(), GroupError> {
        Ok(())
    }

    fn order_elements(&mut self, _order: &[ElementId]) -> Result<(), GroupError> {
        Ok(())
    }

    fn get_field(&mut self, _id: ElementId, _field: &str) -> Result<Value, GroupError> {
        Ok(Value::Null)
    }

    fn set_field(&mut self, _id: ElementId, _field: &str, _value: Value) -> Result<(), GroupError> {
        Ok(())
    }

    fn persist(&mut self) -> Result<bool, GroupError> {
        Ok(false)
    }

    fn remove(&mut self) -> Result<(), GroupError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hands_out_sequential_ids() {
        let mut storage = NullStorage::new();
        assert_eq!(storage.create_element().expect("create"), ElementId(1));
        assert_eq!(storage.create_element().expect("create"), ElementId(2));
        assert!(storage.get_elements().expect("elements").is_empty());
    }

    #[test]
    fn ignores_mutations() {
        let mut storage = NullStorage::new();
        storage.set_field(ElementId(1), "foo", json!("x")).expect("set");
        storage.remove_element(ElementId(7)).expect("remove");
        storage.order_elements(&[ElementId(3)]).expect("order");

        assert_eq!(storage.get_field(ElementId(1), "foo").expect("get"), Value::Null);
        assert!(!storage.persist().expect("persist"));
        storage.remove().expect("remove");
    }
}
