// Forbid unwrap() in production code to prevent panics from corrupt data.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use std::process::ExitCode;

use bptree::{BPlusTree, TreeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bptree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match TreeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Inspection never creates the index file.
    let mut tree = match BPlusTree::open_existing(&config) {
        Ok(tree) => tree,
        Err(e) => {
            tracing::error!("Failed to open index {}: {e}", config.path.display());
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        "Inspecting index: path={}, sync_writes={}",
        tree.storage().path().display(),
        tree.storage().sync_writes()
    );

    let inspection = match tree.inspect() {
        Ok(inspection) => inspection,
        Err(e) => {
            tracing::error!("Failed to inspect index: {e}");
            return ExitCode::FAILURE;
        }
    };
    print!("{inspection}");

    if inspection.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
