//! # fieldgroup CLI Module
//!
//! This module implements the CLI interface of the demo host. Every
//! invocation is one request: it opens the database, builds a fresh
//! registry, runs one command and persists what the command changed.
//!
//! ## Available Commands
//!
//! - `groups` - List the group fields of a table
//! - `init` - Create a new host row
//! - `show` - Expand the groups of a row and print their values
//! - `submit` - Apply a submitted ordering to a group
//! - `get` - Read a virtual field
//! - `set` - Write a virtual field
//! - `delete` - Delete a host row together with its group data

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand};
use fieldgroup_core::GroupError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// fieldgroup - ordered element groups inside record fields
///
/// A demo host that drives group reconciliation, expansion and persistence
/// against a redb database.
#[derive(Parser, Debug)]
#[command(name = "fieldgroup")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database (overrides the configuration)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress informational output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List the group fields of a table
    Groups {
        /// Host table
        #[arg(short, long)]
        table: String,
    },

    /// Create a new host row
    Init {
        /// Host table
        #[arg(short, long)]
        table: String,
    },

    /// Expand the groups of a row and print their values
    Show {
        /// Host table
        #[arg(short, long)]
        table: String,

        /// Host row
        #[arg(short, long)]
        row: u64,

        /// Palette to expand (comma-separated field names; default: all fields)
        #[arg(short, long)]
        palette: Option<String>,
    },

    /// Apply a submitted ordering to a group and persist it
    Submit {
        /// Host table
        #[arg(short, long)]
        table: String,

        /// Host row
        #[arg(short, long)]
        row: u64,

        /// Group field
        #[arg(short, long)]
        group: String,

        /// Ordering, e.g. "4,-1,2" (-1 creates an element)
        #[arg(short, long, allow_hyphen_values = true)]
        order: String,
    },

    /// Read a virtual field, e.g. "slides__title__4"
    Get {
        /// Host table
        #[arg(short, long)]
        table: String,

        /// Host row
        #[arg(short, long)]
        row: u64,

        /// Virtual field key
        #[arg(short, long)]
        key: String,
    },

    /// Write a virtual field and persist it
    Set {
        /// Host table
        #[arg(short, long)]
        table: String,

        /// Host row
        #[arg(short, long)]
        row: u64,

        /// Virtual field key
        #[arg(short, long)]
        key: String,

        /// Value (JSON; anything else is taken as a string)
        #[arg(short, long, allow_hyphen_values = true)]
        value: String,
    },

    /// Delete a host row together with its group data
    Delete {
        /// Host table
        #[arg(short, long)]
        table: String,

        /// Host row
        #[arg(short, long)]
        row: u64,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Load the configuration named by the CLI, applying the `--database` override.
pub fn load_config(cli: &Cli) -> Result<Config, GroupError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    Ok(config)
}

/// Execute the CLI with parsed arguments and print the result.
pub fn execute(cli: &Cli, config: &Config) -> Result<(), GroupError> {
    let output = run(&cli.command, config)?;

    if cli.json {
        let rendered = serde_json::to_string_pretty(&output)
            .map_err(|e| GroupError::SerializationError(e.to_string()))?;
        println!("{rendered}");
    } else if !cli.quiet {
        print!("{output}");
    }

    Ok(())
}

/// Run one command against the configured database.
pub fn run(command: &Commands, config: &Config) -> Result<Output, GroupError> {
    match command {
        Commands::Groups { table } => cmd_groups(config, table),
        Commands::Init { table } => cmd_init(config, table),
        Commands::Show {
            table,
            row,
            palette,
        } => cmd_show(config, table, *row, palette.as_deref()),
        Commands::Submit {
            table,
            row,
            group,
            order,
        } => cmd_submit(config, table, *row, group, order),
        Commands::Get { table, row, key } => cmd_get(config, table, *row, key),
        Commands::Set {
            table,
            row,
            key,
            value,
        } => cmd_set(config, table, *row, key, value),
        Commands::Delete { table, row } => cmd_delete(config, table, *row),
    }
}
