//! List command implementation

use std::path::Path;

use anyhow::{Context, Result};
use pb_core::config::Overrides;
use pb_core::Configuration;

use crate::output::format_hosts;

/// Print the resolved configuration and its hosts
pub fn list_command(config_path: &Path, select: Option<String>, json: bool) -> Result<()> {
    let overrides = Overrides {
        select,
        ..Overrides::default()
    };
    let config = Configuration::load(config_path, &overrides)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config.hosts)?);
        return Ok(());
    }

    println!("Configuration: {}", config.path.display());
    println!("Log directory: {}", config.log_dir.display());
    if let Some(prior) = &config.log_prior_dir {
        println!("Prior log directory: {}", prior.display());
    }
    println!("Selector: {}", config.selector.as_deref().unwrap_or("None"));
    println!("Settings: {}", config.settings);
    if !config.exclude.is_empty() {
        println!("Excluded: {}", config.exclude.join(", "));
    }
    println!();
    println!("{}", format_hosts(&config.hosts));
    Ok(())
}
