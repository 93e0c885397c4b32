//! Check-config command implementation.

use super::load_json;
use crmsync_engine::SyncConfig;
use std::path::Path;

/// Loads and validates a configuration file.
pub fn check(path: &Path) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let config: SyncConfig = load_json(path)?;
    config.validate()?;
    Ok(config)
}

/// Runs the check-config command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = check(path)?;

    println!("Configuration OK: {}", path.display());
    println!(
        "  Sync enabled:    {}",
        if config.sync_enabled { "yes" } else { "no" }
    );
    println!("  Call timeout:    {:?}", config.call_timeout);
    println!("  Suppression TTL: {:?}", config.suppression_ttl);
    if let Some(org) = &config.organization_id {
        println!("  Organization:    {org}");
    }
    println!();
    println!("Record types:");
    for record_type in &config.record_types {
        let ops = &record_type.operations;
        println!(
            "  {} ({}): {} attributes, create={} update={} delete={}",
            record_type.object_type,
            if record_type.enabled { "enabled" } else { "disabled" },
            record_type.synced_attributes.len(),
            ops.create,
            ops.update,
            ops.delete
        );
        for (remote, local) in &record_type.mapping {
            println!("    {remote} -> {local}");
        }
    }

    Ok(())
}
