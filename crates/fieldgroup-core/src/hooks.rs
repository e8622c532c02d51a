//! # Form Hooks
//!
//! The adapter a host form engine calls during one edit request:
//!
//! 1. `on_load` applies submitted orderings and splices expansions into the
//!    host palette.
//! 2. `load_field` / `store_field` serve the virtual fields by composite key.
//! 3. `on_submit` persists every group touched in the request.
//! 4. `on_delete` removes the group data of a row that is about to go away.

use crate::expansion::{Expansion, VirtualFieldKey};
use crate::primitives::MAX_SUBMITTED_IDS;
use crate::registry::Registry;
use crate::{ElementId, GroupError, RowId, Value};
use std::collections::BTreeMap;

/// Parse a submitted ordering such as `"12,-1,4"`.
///
/// Blank, zero and non-numeric tokens are dropped. At most
/// `MAX_SUBMITTED_IDS` entries are kept.
#[must_use]
pub fn parse_ordering(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|token| token.trim().parse::<i64>().ok())
        .filter(|id| *id != 0)
        .take(MAX_SUBMITTED_IDS)
        .collect()
}

/// Result of `FormHooks::on_load`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedForm {
    /// The host palette with every visible group replaced by its expansion.
    pub palette: Vec<String>,
    /// Expansions of the visible groups, in palette order.
    pub expansions: Vec<Expansion>,
}

/// Request-scoped host adapter.
#[derive(Debug)]
pub struct FormHooks {
    registry: Registry,
}

impl FormHooks {
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Names of the group fields of `table`.
    #[must_use]
    pub fn group_fields(&self, table: &str) -> Vec<String> {
        self.registry.group_fields(table)
    }

    /// Apply submitted orderings and expand every group shown in `palette`.
    ///
    /// `submissions` maps a group name to its raw ordering string.
    pub fn on_load(
        &mut self,
        table: &str,
        row: RowId,
        palette: &[String],
        submissions: &BTreeMap<String, String>,
    ) -> Result<LoadedForm, GroupError> {
        let groups = self.registry.group_fields(table);
        let mut spliced = palette.to_vec();
        let mut expansions = Vec::new();

        for name in palette.iter().filter(|entry| groups.contains(entry)) {
            let group = self.registry.group(table, row, name)?;

            if let Some(raw) = submissions.get(name) {
                let ids = group.set_elements(&parse_ordering(raw))?;
                tracing::debug!(group = %group.key(), elements = ids.len(), "Applied ordering");
            }

            let expansion = group.expand()?.clone();
            spliced = expansion.splice(&spliced);
            expansions.push(expansion);
        }

        Ok(LoadedForm {
            palette: spliced,
            expansions,
        })
    }

    /// Persist every group initialized for `row`. Returns how many wrote.
    pub fn on_submit(&mut self, table: &str, row: RowId) -> Result<usize, GroupError> {
        let mut written = 0usize;
        for group in self.registry.initialized_groups_mut(table, row) {
            if group.persist()? {
                written = written.saturating_add(1);
            }
        }

        tracing::info!(table, row = %row, written, "Submitted groups");
        Ok(written)
    }

    /// Remove the data of every group of `row`.
    ///
    /// All group fields of the table are initialized first, so groups the
    /// request never touched are removed as well.
    pub fn on_delete(&mut self, table: &str, row: RowId) -> Result<(), GroupError> {
        for name in self.registry.group_fields(table) {
            self.registry.group(table, row, &name)?;
        }

        for group in self.registry.initialized_groups_mut(table, row) {
            group.remove()?;
        }

        tracing::info!(table, row = %row, "Removed groups");
        Ok(())
    }

    /// Read a virtual field by its composite key.
    pub fn load_field(&mut self, table: &str, row: RowId, key: &str) -> Result<Value, GroupError> {
        let (group, field, element) = field_key(key)?;
        self.registry.group(table, row, &group)?.get_field(element, &field)
    }

    /// Stage a value for a virtual field by its composite key.
    pub fn store_field(
        &mut self,
        table: &str,
        row: RowId,
        key: &str,
        value: Value,
    ) -> Result<(), GroupError> {
        let (group, field, element) = field_key(key)?;
        self.registry
            .group(table, row, &group)?
            .set_field(element, &field, value)
    }
}

fn field_key(key: &str) -> Result<(String, String, ElementId), GroupError> {
    match key.parse::<VirtualFieldKey>()? {
        VirtualFieldKey::Field {
            group,
            field,
            element,
        } => Ok((group, field, element)),
        _ => Err(GroupError::InvalidArgument(format!(
            "Virtual field '{key}' is a marker and holds no value."
        ))),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Catalog, FieldSchema, TableSchema};
    use crate::storage::{MemoryDatabase, RowStore};
    use serde_json::json;
    use std::rc::Rc;

    fn hooks() -> (Rc<MemoryDatabase>, FormHooks, RowId) {
        let catalog = Catalog::new([TableSchema::new("tl_content")
            .with_field(FieldSchema::new("headline", "text"))
            .with_field(
                FieldSchema::new("slides", "group")
                    .with_attribute("palette", json!(["title"]))
                    .with_attribute("min", json!(1)),
            )
            .with_field(
                FieldSchema::new("links", "group")
                    .with_attribute("palette", json!(["title"]))
                    .with_attribute("storage", json!("entity")),
            )
            .with_field(FieldSchema::new("title", "text"))]);

        let db = Rc::new(MemoryDatabase::new());
        let row = db.insert_row("tl_content").expect("row");
        let registry = Registry::new(catalog, db.clone()).with_entity_store(db.clone());
        (db, FormHooks::new(registry), row)
    }

    fn palette(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|e| (*e).to_string()).collect()
    }

    #[test]
    fn parses_orderings() {
        assert_eq!(parse_ordering("12,-1, 4"), vec![12, -1, 4]);
        assert_eq!(parse_ordering(",0,,x,3,"), vec![3]);
        assert!(parse_ordering("").is_empty());

        let long = vec!["1"; MAX_SUBMITTED_IDS + 5].join(",");
        assert_eq!(parse_ordering(&long).len(), MAX_SUBMITTED_IDS);
    }

    #[test]
    fn load_expands_visible_groups_only() {
        let (_, mut hooks, row) = hooks();

        let loaded = hooks
            .on_load("tl_content", row, &palette(&["headline", "slides"]), &BTreeMap::new())
            .expect("load");

        assert_eq!(
            loaded.palette,
            vec![
                "headline",
                "slides__(start)",
                "slides__(el_start)__1",
                "slides__title__1",
                "slides__(el_end)__1",
                "slides__(end)",
            ]
        );
        assert_eq!(loaded.expansions.len(), 1);
        assert_eq!(hooks.registry().initialized_groups("tl_content", row).len(), 1);
    }

    #[test]
    fn load_applies_submitted_orderings() {
        let (_, mut hooks, row) = hooks();
        let submissions = BTreeMap::from([("links".to_string(), "-1,-1".to_string())]);

        let loaded = hooks
            .on_load("tl_content", row, &palette(&["links"]), &submissions)
            .expect("load");

        let expansion = loaded.expansions.first().expect("expansion");
        assert_eq!(expansion.elements().len(), 2);
    }

    #[test]
    fn fields_round_trip_through_composite_keys() {
        let (db, mut hooks, row) = hooks();
        hooks
            .on_load("tl_content", row, &palette(&["slides"]), &BTreeMap::new())
            .expect("load");

        hooks
            .store_field("tl_content", row, "slides__title__1", json!("Hello"))
            .expect("store");
        assert_eq!(
            hooks
                .load_field("tl_content", row, "slides__title__1")
                .expect("load"),
            json!("Hello")
        );

        assert_eq!(hooks.on_submit("tl_content", row).expect("submit"), 1);
        assert_eq!(hooks.on_submit("tl_content", row).expect("submit"), 0);
        assert!(
            db.fetch_column("tl_content", row, "slides")
                .expect("fetch")
                .is_some()
        );
    }

    #[test]
    fn markers_cannot_be_written() {
        let (_, mut hooks, row) = hooks();
        let err = hooks
            .store_field("tl_content", row, "slides__(el_start)__1", json!(1))
            .expect_err("marker");
        assert!(matches!(err, GroupError::InvalidArgument(_)));
    }

    #[test]
    fn unknown_child_fields_are_rejected() {
        let (_, mut hooks, row) = hooks();
        hooks
            .on_load("tl_content", row, &palette(&["slides"]), &BTreeMap::new())
            .expect("load");

        assert!(matches!(
            hooks.load_field("tl_content", row, "slides__headline__1"),
            Err(GroupError::FieldNotFound(_))
        ));
    }

    #[test]
    fn delete_removes_untouched_groups() {
        let (db, mut hooks, row) = hooks();
        let submissions = BTreeMap::from([("links".to_string(), "-1".to_string())]);
        hooks
            .on_load("tl_content", row, &palette(&["links"]), &submissions)
            .expect("load");
        hooks.on_submit("tl_content", row).expect("submit");

        let mut fresh = FormHooks::new(
            Registry::new(hooks.registry().catalog().clone(), db.clone())
                .with_entity_store(db.clone()),
        );
        fresh.on_delete("tl_content", row).expect("delete");

        let mut reloaded = FormHooks::new(
            Registry::new(hooks.registry().catalog().clone(), db.clone())
                .with_entity_store(db.clone()),
        );
        let elements = reloaded
            .registry_mut()
            .group("tl_content", row, "links")
            .expect("group")
            .elements()
            .expect("elements");
        assert!(elements.is_empty());
        assert_eq!(
            fresh.registry().initialized_groups("tl_content", row).len(),
            2
        );
    }
}
