//! # fieldgroup - Demo Host
//!
//! The binary plays the part of a form host around `fieldgroup-core`:
//! it loads a table catalog from TOML, opens a redb database and runs the
//! group hooks (load, submit, delete, field access) for one command.
//!
//! ## Usage
//!
//! ```bash
//! fieldgroup --config fieldgroup.toml groups --table tl_content
//! fieldgroup init --table tl_content
//! fieldgroup submit --table tl_content --row 1 --group slides --order "-1,-1"
//! fieldgroup set --table tl_content --row 1 --key slides__title__1 --value '"Hello"'
//! fieldgroup show --table tl_content --row 1
//! fieldgroup delete --table tl_content --row 1
//! ```

use clap::Parser;
use fieldgroup::cli;
use fieldgroup::config::{Config, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();
    let config = cli::load_config(&cli);

    init_tracing(config.as_ref().ok());

    let result = config.and_then(|config| cli::execute(&cli, &config));
    if let Err(e) = result {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber.
///
/// `FIELDGROUP_LOG_FORMAT=json` and `RUST_LOG` take precedence over the
/// `[logging]` section of the configuration.
fn init_tracing(config: Option<&Config>) {
    let format = match std::env::var("FIELDGROUP_LOG_FORMAT").ok().as_deref() {
        Some("json") => LogFormat::Json,
        Some(_) => LogFormat::Text,
        None => config.map(|c| c.logging.format).unwrap_or_default(),
    };

    let default_filter = config
        .map(|c| c.log_filter().to_string())
        .unwrap_or_else(|| fieldgroup::config::DEFAULT_LOG_FILTER.to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
