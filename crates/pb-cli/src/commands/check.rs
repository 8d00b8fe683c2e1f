//! Check command implementation

use std::path::Path;

use anyhow::{Context, Result};
use pb_core::config::Overrides;
use pb_core::Configuration;
use pb_orchestrator::check::{check_hosts, clear_marker, marker_path, write_marker};
use pb_orchestrator::SshTransport;
use tracing::warn;

use crate::output::{print_error, print_success};

/// Probe every configured host; returns the number of unreachable hosts
pub async fn check_command(config_path: &Path, select: Option<String>) -> Result<i32> {
    let overrides = Overrides {
        select,
        ..Overrides::default()
    };
    let config = Configuration::load(config_path, &overrides)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let transport = SshTransport::from_config(&config.transport);
    let results = check_hosts(&transport, &config.hosts).await;

    let mut failed = 0;
    for result in &results {
        match &result.error {
            None => print_success(&format!("OK: {} ({})", result.address, result.tag)),
            Some(error) => {
                failed += 1;
                print_error(&format!("FAILED: {} ({}): {}", result.address, result.tag, error));
            }
        }
    }

    if let Some(marker) = marker_path() {
        let updated = if failed == 0 {
            write_marker(&marker)
        } else {
            clear_marker(&marker)
        };
        if let Err(e) = updated {
            warn!(marker = %marker.display(), error = %e, "Failed to update check marker");
        }
    }
    Ok(failed)
}
