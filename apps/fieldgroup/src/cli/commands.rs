//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands. Each
//! command returns an `Output`, which the caller prints as text or JSON.

use crate::config::Config;
use fieldgroup_core::{
    Definition, FormHooks, GroupError, RedbDatabase, Registry, RowId, RowStore, Value,
    VirtualFieldKey, parse_ordering,
};
use serde::Serialize;
use serde_json::Map;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

// =============================================================================
// OUTPUT
// =============================================================================

/// Summary of one group field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub name: String,
    pub label: String,
    pub storage: String,
    pub min: usize,
    pub max: usize,
    pub sortable: bool,
    pub fields: Vec<String>,
}

/// One element with its field values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementView {
    pub id: i64,
    pub values: Map<String, Value>,
}

/// One expanded group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupView {
    pub name: String,
    pub elements: Vec<ElementView>,
}

/// Result of a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Output {
    Groups {
        table: String,
        groups: Vec<GroupSummary>,
    },
    Row {
        table: String,
        row: u64,
    },
    Form {
        table: String,
        row: u64,
        palette: Vec<String>,
        groups: Vec<GroupView>,
    },
    Submitted {
        table: String,
        row: u64,
        group: String,
        elements: Vec<i64>,
        written: usize,
    },
    Field {
        key: String,
        value: Value,
    },
    Stored {
        key: String,
        written: usize,
    },
    Deleted {
        table: String,
        row: u64,
        groups: usize,
    },
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Groups { table, groups } => {
                writeln!(f, "Groups of {table}")?;
                writeln!(f, "{}", "=".repeat(table.len() + 10))?;
                for group in groups {
                    writeln!(
                        f,
                        "{:<20} storage={:<10} min={} max={} sortable={} fields={}",
                        group.name,
                        group.storage,
                        group.min,
                        group.max,
                        group.sortable,
                        group.fields.join(", ")
                    )?;
                }
                Ok(())
            }
            Self::Row { table, row } => writeln!(f, "Created row {row} in {table}"),
            Self::Form {
                table,
                row,
                palette,
                groups,
            } => {
                writeln!(f, "{table}[{row}]")?;
                writeln!(f, "Palette: {}", palette.join(", "))?;
                for group in groups {
                    writeln!(f)?;
                    writeln!(f, "{} ({} elements)", group.name, group.elements.len())?;
                    for element in &group.elements {
                        let values: Vec<String> = element
                            .values
                            .iter()
                            .map(|(name, value)| format!("{name}={value}"))
                            .collect();
                        writeln!(f, "  [{}] {}", element.id, values.join(" "))?;
                    }
                }
                Ok(())
            }
            Self::Submitted {
                table,
                row,
                group,
                elements,
                written,
            } => {
                let ids: Vec<String> = elements.iter().map(ToString::to_string).collect();
                writeln!(
                    f,
                    "Submitted {table}[{row}].{group}: [{}] ({written} written)",
                    ids.join(", ")
                )
            }
            Self::Field { key, value } => writeln!(f, "{key} = {value}"),
            Self::Stored { key, written } => writeln!(f, "Stored {key} ({written} written)"),
            Self::Deleted { table, row, groups } => {
                writeln!(f, "Deleted {table}[{row}] ({groups} groups removed)")
            }
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Open the configured database and a request-scoped hook adapter over it.
pub fn open(config: &Config) -> Result<(Rc<RedbDatabase>, FormHooks), GroupError> {
    let db = Rc::new(RedbDatabase::open(&config.database)?);
    let registry = Registry::new(config.catalog(), db.clone()).with_entity_store(db.clone());
    Ok((db, FormHooks::new(registry)))
}

fn known_table(config: &Config, table: &str) -> Result<(), GroupError> {
    if config.tables.iter().any(|t| t.name == table) {
        Ok(())
    } else {
        Err(GroupError::InvalidArgument(format!("Unknown table '{table}'.")))
    }
}

fn existing_row(db: &RedbDatabase, table: &str, row: u64) -> Result<RowId, GroupError> {
    let row = RowId(row);
    if db.row_exists(table, row)? {
        Ok(row)
    } else {
        Err(GroupError::RecordNotFound {
            table: table.to_string(),
            row,
        })
    }
}

/// Every top-level field of `table`, leaving out the child fields of its groups.
fn default_palette(config: &Config, table: &str) -> Result<Vec<String>, GroupError> {
    let catalog = config.catalog();
    let Some(schema) = catalog.table(table) else {
        return Ok(Vec::new());
    };

    let mut children = BTreeSet::new();
    for name in schema.group_fields() {
        let definition = Definition::parse(schema, &name)?;
        children.extend(definition.field_names().into_iter().map(str::to_string));
    }

    Ok(schema
        .fields
        .iter()
        .map(|field| field.name.clone())
        .filter(|name| !children.contains(name))
        .collect())
}

/// Load and expand the group a virtual field key belongs to.
///
/// Field access is only valid after the group went through load, so
/// min-filled elements exist before they are read or written.
fn load_group_of(
    hooks: &mut FormHooks,
    table: &str,
    row: RowId,
    key: &str,
) -> Result<(), GroupError> {
    let group = key.parse::<VirtualFieldKey>()?.group().to_string();
    hooks.on_load(table, row, &[group], &BTreeMap::new())?;
    Ok(())
}

/// Parse a CLI value: JSON if it parses, a plain string otherwise.
#[must_use]
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// =============================================================================
// GROUPS COMMAND
// =============================================================================

/// List the group fields of a table with their parsed definitions.
pub fn cmd_groups(config: &Config, table: &str) -> Result<Output, GroupError> {
    let catalog = config.catalog();
    let schema = catalog
        .table(table)
        .ok_or_else(|| GroupError::InvalidArgument(format!("Unknown table '{table}'.")))?;

    let mut groups = Vec::new();
    for name in schema.group_fields() {
        let definition = Definition::parse(schema, &name)?;
        groups.push(GroupSummary {
            name,
            label: definition.label().to_string(),
            storage: definition.storage_kind().to_string(),
            min: definition.min_elements(),
            max: definition.max_elements(),
            sortable: definition.is_sortable(),
            fields: definition
                .field_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        });
    }

    Ok(Output::Groups {
        table: table.to_string(),
        groups,
    })
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create a new host row.
pub fn cmd_init(config: &Config, table: &str) -> Result<Output, GroupError> {
    known_table(config, table)?;
    let (db, _) = open(config)?;

    let row = db.insert_row(table)?;
    tracing::info!(table, row = %row, database = %config.database.display(), "Created row");

    Ok(Output::Row {
        table: table.to_string(),
        row: row.0,
    })
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Expand the groups shown in `palette` and read every virtual field.
pub fn cmd_show(
    config: &Config,
    table: &str,
    row: u64,
    palette: Option<&str>,
) -> Result<Output, GroupError> {
    known_table(config, table)?;
    let (db, mut hooks) = open(config)?;
    let row = existing_row(&db, table, row)?;

    let palette: Vec<String> = match palette {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        None => default_palette(config, table)?,
    };

    let loaded = hooks.on_load(table, row, &palette, &BTreeMap::new())?;

    let mut groups = Vec::with_capacity(loaded.expansions.len());
    for expansion in &loaded.expansions {
        let mut elements: Vec<ElementView> = Vec::new();
        for field in expansion.fields() {
            match &field.key {
                VirtualFieldKey::ElementStart { element, .. } => elements.push(ElementView {
                    id: element.value(),
                    values: Map::new(),
                }),
                VirtualFieldKey::Field { field: name, .. } => {
                    let value = hooks.load_field(table, row, &field.name())?;
                    if let Some(view) = elements.last_mut() {
                        view.values.insert(name.clone(), value);
                    }
                }
                _ => {}
            }
        }
        groups.push(GroupView {
            name: expansion.group().to_string(),
            elements,
        });
    }

    Ok(Output::Form {
        table: table.to_string(),
        row: row.0,
        palette: loaded.palette,
        groups,
    })
}

// =============================================================================
// SUBMIT COMMAND
// =============================================================================

/// Apply a submitted ordering to one group and persist the row's groups.
pub fn cmd_submit(
    config: &Config,
    table: &str,
    row: u64,
    group: &str,
    order: &str,
) -> Result<Output, GroupError> {
    known_table(config, table)?;
    let (db, mut hooks) = open(config)?;
    let row = existing_row(&db, table, row)?;

    if !hooks.group_fields(table).iter().any(|name| name == group) {
        return Err(GroupError::InvalidArgument(format!(
            "'{group}' is not a group field of '{table}'."
        )));
    }

    tracing::debug!(table, row = %row, group, submitted = ?parse_ordering(order), "Submitting ordering");

    let submissions = BTreeMap::from([(group.to_string(), order.to_string())]);
    let loaded = hooks.on_load(table, row, &[group.to_string()], &submissions)?;
    let written = hooks.on_submit(table, row)?;

    let elements = loaded
        .expansions
        .first()
        .map(|expansion| expansion.elements().iter().map(|id| id.value()).collect())
        .unwrap_or_default();

    Ok(Output::Submitted {
        table: table.to_string(),
        row: row.0,
        group: group.to_string(),
        elements,
        written,
    })
}

// =============================================================================
// GET / SET COMMANDS
// =============================================================================

/// Read a virtual field.
pub fn cmd_get(config: &Config, table: &str, row: u64, key: &str) -> Result<Output, GroupError> {
    known_table(config, table)?;
    let (db, mut hooks) = open(config)?;
    let row = existing_row(&db, table, row)?;

    load_group_of(&mut hooks, table, row, key)?;
    let value = hooks.load_field(table, row, key)?;

    Ok(Output::Field {
        key: key.to_string(),
        value,
    })
}

/// Write a virtual field and persist it.
pub fn cmd_set(
    config: &Config,
    table: &str,
    row: u64,
    key: &str,
    value: &str,
) -> Result<Output, GroupError> {
    known_table(config, table)?;
    let (db, mut hooks) = open(config)?;
    let row = existing_row(&db, table, row)?;

    load_group_of(&mut hooks, table, row, key)?;
    hooks.store_field(table, row, key, parse_value(value))?;
    let written = hooks.on_submit(table, row)?;

    Ok(Output::Stored {
        key: key.to_string(),
        written,
    })
}

// =============================================================================
// DELETE COMMAND
// =============================================================================

/// Remove the group data of a row, then the row itself.
pub fn cmd_delete(config: &Config, table: &str, row: u64) -> Result<Output, GroupError> {
    known_table(config, table)?;
    let (db, mut hooks) = open(config)?;
    let row = existing_row(&db, table, row)?;

    hooks.on_delete(table, row)?;
    let groups = hooks.registry().initialized_groups(table, row).len();
    db.delete_row(table, row)?;

    tracing::info!(table, row = %row, groups, "Deleted row");

    Ok(Output::Deleted {
        table: table.to_string(),
        row: row.0,
        groups,
    })
}
