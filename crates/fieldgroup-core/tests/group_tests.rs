//! # Group Reconciliation Tests
//!
//! Drives `Group` against a recording storage double and checks the exact
//! storage calls each reconciliation makes.

#![allow(clippy::unwrap_used, clippy::panic)]

use fieldgroup_core::{
    Definition, ElementId, FieldSchema, Group, GroupError, GroupKey, RowId, Storage, StorageKind,
    TableSchema, Value,
};
use serde_json::json;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

// =============================================================================
// RECORDING STORAGE
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Create(ElementId),
    Remove(ElementId),
    Order(Vec<ElementId>),
    GetField(ElementId, String),
    SetField(ElementId, String, Value),
    Persist,
    Discard,
}

#[derive(Debug)]
struct RecordingStorage {
    elements: Vec<ElementId>,
    scripted_ids: VecDeque<i64>,
    calls: Rc<RefCell<Vec<Call>>>,
}

impl RecordingStorage {
    fn new(elements: &[i64], calls: Rc<RefCell<Vec<Call>>>) -> Self {
        Self {
            elements: elements.iter().map(|id| ElementId(*id)).collect(),
            scripted_ids: VecDeque::new(),
            calls,
        }
    }

    fn with_ids(mut self, ids: &[i64]) -> Self {
        self.scripted_ids = ids.iter().copied().collect();
        self
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Storage for RecordingStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Null
    }

    fn get_elements(&mut self) -> Result<Vec<ElementId>, GroupError> {
        Ok(self.elements.clone())
    }

    fn create_element(&mut self) -> Result<ElementId, GroupError> {
        let id = match self.scripted_ids.pop_front() {
            Some(id) => ElementId(id),
            None => ElementId::next(&self.elements)?,
        };
        self.elements.push(id);
        self.record(Call::Create(id));
        Ok(id)
    }

    fn remove_element(&mut self, id: ElementId) -> Result<(), GroupError> {
        let index = self
            .elements
            .iter()
            .position(|e| *e == id)
            .ok_or(GroupError::ElementNotFound(id))?;
        self.elements.remove(index);
        self.record(Call::Remove(id));
        Ok(())
    }

    fn order_elements(&mut self, order: &[ElementId]) -> Result<(), GroupError> {
        self.elements = order.to_vec();
        self.record(Call::Order(order.to_vec()));
        Ok(())
    }

    fn get_field(&mut self, id: ElementId, field: &str) -> Result<Value, GroupError> {
        self.record(Call::GetField(id, field.to_string()));
        Ok(json!("data"))
    }

    fn set_field(&mut self, id: ElementId, field: &str, value: Value) -> Result<(), GroupError> {
        self.record(Call::SetField(id, field.to_string(), value));
        Ok(())
    }

    fn persist(&mut self) -> Result<bool, GroupError> {
        self.record(Call::Persist);
        Ok(true)
    }

    fn remove(&mut self) -> Result<(), GroupError> {
        self.record(Call::Discard);
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn definition(extra: &[(&str, Value)]) -> Rc<Definition> {
    let mut group = FieldSchema::new("my_group", "group").with_attribute("palette", json!(["foo"]));
    for (key, value) in extra {
        group = group.with_attribute(*key, value.clone());
    }
    let table = TableSchema::new("tl_foo")
        .with_field(group)
        .with_field(FieldSchema::new("foo", "text"));
    Rc::new(Definition::parse(&table, "my_group").expect("definition"))
}

fn group(extra: &[(&str, Value)], storage: RecordingStorage) -> Group {
    Group::new(
        GroupKey::new("tl_foo", RowId(123), "my_group"),
        definition(extra),
        Box::new(storage),
    )
}

fn ids(raw: &[i64]) -> Vec<ElementId> {
    raw.iter().map(|id| ElementId(*id)).collect()
}

// =============================================================================
// RECONCILIATION
// =============================================================================

mod reconciliation {
    use super::*;

    /// [1, 5, 3] with [2, 5, 1, -1]: create 6, remove 3, drop 2, order [5, 1, 6].
    #[test]
    fn creates_removes_and_orders() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let storage = RecordingStorage::new(&[1, 5, 3], calls.clone()).with_ids(&[6]);
        let mut group = group(&[], storage);

        let result = group.set_elements(&[2, 5, 1, -1]).expect("set");

        assert_eq!(result, ids(&[5, 1, 6]));
        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Create(ElementId(6)),
                Call::Remove(ElementId(3)),
                Call::Order(ids(&[5, 1, 6])),
            ]
        );
    }

    #[test]
    fn min_constraint_creates_missing_elements() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let storage = RecordingStorage::new(&[1], calls.clone()).with_ids(&[2, 3]);
        let mut group = group(&[("min", json!(3))], storage);

        let result = group.set_elements(&[1]).expect("set");

        assert_eq!(result, ids(&[1, 2, 3]));
        let creates = calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count();
        assert_eq!(creates, 2);
    }

    #[test]
    fn max_constraint_removes_trailing_elements() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let storage = RecordingStorage::new(&[1, 2, 3, 4, 5], calls.clone());
        let mut group = group(&[("max", json!(3))], storage);

        let result = group.set_elements(&[1, 2, 3, 4, 5]).expect("set");

        assert_eq!(result, ids(&[1, 2, 3]));
        let mut removed: Vec<_> = calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Remove(id) => Some(*id),
                _ => None,
            })
            .collect();
        removed.sort();
        assert_eq!(removed, ids(&[4, 5]));
    }

    #[test]
    fn unmapped_entry_is_recovered_as_creation() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let storage = RecordingStorage::new(&[1, 2], calls.clone());
        let mut group = group(&[], storage);

        let result = group.set_elements(&[1, 7]).expect("set");

        assert_eq!(result, ids(&[1, 3]));
        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Create(ElementId(3)),
                Call::Remove(ElementId(2)),
                Call::Order(ids(&[1, 3])),
            ]
        );
    }

    #[test]
    fn only_first_unmapped_entry_is_recovered() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let storage = RecordingStorage::new(&[1], calls.clone());
        let mut group = group(&[], storage);

        let result = group.set_elements(&[8, 1, 9]).expect("set");

        assert_eq!(result, ids(&[2, 1]));
    }

    #[test]
    fn explicit_creation_disables_recovery() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let storage = RecordingStorage::new(&[1], calls.clone());
        let mut group = group(&[], storage);

        let result = group.set_elements(&[7, -1, 1]).expect("set");

        assert_eq!(result, ids(&[2, 1]));
    }

    #[test]
    fn empty_submission_removes_everything() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let storage = RecordingStorage::new(&[1, 2], calls.clone());
        let mut group = group(&[], storage);

        let result = group.set_elements(&[]).expect("set");

        assert!(result.is_empty());
        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Remove(ElementId(1)),
                Call::Remove(ElementId(2)),
                Call::Order(Vec::new()),
            ]
        );
    }

    #[test]
    fn zero_and_duplicate_ids_are_ignored() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let storage = RecordingStorage::new(&[1, 2], calls.clone());
        let mut group = group(&[], storage);

        let result = group.set_elements(&[2, 0, 2, 1, 1]).expect("set");

        assert_eq!(result, ids(&[2, 1]));
        assert!(
            !calls
                .borrow()
                .iter()
                .any(|c| matches!(c, Call::Create(_) | Call::Remove(_)))
        );
    }

    #[test]
    fn unsortable_groups_skip_ordering() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let storage = RecordingStorage::new(&[1, 2], calls.clone());
        let mut group = group(&[("sortable", json!(false))], storage);

        let result = group.set_elements(&[2, 1, -1]).expect("set");

        assert_eq!(result, ids(&[1, 2, 3]));
        assert!(!calls.borrow().iter().any(|c| matches!(c, Call::Order(_))));
    }
}

// =============================================================================
// PASS-THROUGH
// =============================================================================

mod pass_through {
    use super::*;

    #[test]
    fn get_field() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut group = group(&[], RecordingStorage::new(&[123], calls.clone()));

        assert_eq!(group.get_field(ElementId(123), "bar").expect("get"), json!("data"));
        assert_eq!(
            *calls.borrow(),
            vec![Call::GetField(ElementId(123), "bar".to_string())]
        );
    }

    #[test]
    fn set_field() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut group = group(&[], RecordingStorage::new(&[123], calls.clone()));

        group
            .set_field(ElementId(123), "bar", json!("data"))
            .expect("set");
        assert_eq!(
            *calls.borrow(),
            vec![Call::SetField(ElementId(123), "bar".to_string(), json!("data"))]
        );
    }

    #[test]
    fn persist_and_remove() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut group = group(&[], RecordingStorage::new(&[], calls.clone()));

        assert!(!group.is_changed());
        assert!(group.persist().expect("persist"));
        assert!(group.is_changed());
        group.remove().expect("remove");

        assert_eq!(*calls.borrow(), vec![Call::Persist, Call::Discard]);
    }
}

// =============================================================================
// DEFINITION DETAILS
// =============================================================================

mod details {
    use super::*;

    #[test]
    fn defaults() {
        let group = group(&[], RecordingStorage::new(&[], Rc::default()));

        assert_eq!(group.name(), "my_group");
        assert_eq!(group.table(), "tl_foo");
        assert_eq!(group.row(), RowId(123));
        assert_eq!(group.label(), "");
        assert_eq!(group.description(), "");
        assert_eq!(group.min_elements(), 0);
        assert_eq!(group.max_elements(), 0);
        assert_eq!(group.fields(), vec!["foo"]);
    }

    #[test]
    fn label_and_cardinality() {
        let table = TableSchema::new("tl_foo")
            .with_field(
                FieldSchema::new("my_group", "group")
                    .with_label("my group", "pretty nice")
                    .with_attribute("palette", json!(["foo"]))
                    .with_attribute("min", json!(2))
                    .with_attribute("max", json!(10)),
            )
            .with_field(FieldSchema::new("foo", "text"));
        let definition = Rc::new(Definition::parse(&table, "my_group").expect("definition"));
        let group = Group::new(
            GroupKey::new("tl_foo", RowId(1), "my_group"),
            definition,
            Box::new(RecordingStorage::new(&[], Rc::default())),
        );

        assert_eq!(group.label(), "my group");
        assert_eq!(group.description(), "pretty nice");
        assert_eq!(group.min_elements(), 2);
        assert_eq!(group.max_elements(), 10);
    }

    #[test]
    fn merged_field_definition() {
        let table = TableSchema::new("tl_foo")
            .with_field(
                FieldSchema::new("my_group", "group")
                    .with_attribute("fields", json!({"foo": {"eval": {"mandatory": false}}})),
            )
            .with_field(
                FieldSchema::new("foo", "text").with_attribute("eval", json!({"tl_class": "w50"})),
            );
        let definition = Rc::new(Definition::parse(&table, "my_group").expect("definition"));
        let group = Group::new(
            GroupKey::new("tl_foo", RowId(1), "my_group"),
            definition,
            Box::new(RecordingStorage::new(&[], Rc::default())),
        );

        let foo = group.field_definition("foo").expect("foo");
        assert_eq!(foo.input_type.as_deref(), Some("text"));
        assert_eq!(
            foo.attribute("eval"),
            Some(&json!({"tl_class": "w50", "mandatory": false}))
        );
    }

    #[test]
    fn raw_attributes() {
        let group = group(
            &[("foobar", json!({"bar": "baz"}))],
            RecordingStorage::new(&[], Rc::default()),
        );
        assert_eq!(
            group.definition().attribute("foobar"),
            Some(&json!({"bar": "baz"}))
        );
    }
}
