//! List-resources command
//!
//! Read-only inspection of recorded state and published registry entries.
//! Reads bypass the convergence lock: a listing racing a deploy shows a
//! point-in-time snapshot, which is all an inspection promises.

use std::path::Path;

use stratus::registry::{FileParameterStore, ParameterStore, REGISTRY_PREFIX};
use stratus::state::{FileStateStore, StateStore};

use crate::Result;

pub async fn run(config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;

    let store = FileStateStore::new(super::state_dir(&config));
    match store.read(&config.state_key).await? {
        None => println!("No recorded state for '{}'.", config.state_key),
        Some(state) => {
            println!(
                "{:<28} {:<12} {:<15} {:<8} {}",
                "DOMAIN", "ENV", "ROLE", "READY", "IDENTIFIERS"
            );
            for record in state.resources.values() {
                let identifiers = record
                    .applied
                    .identifiers
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!(
                    "{:<28} {:<12} {:<15} {:<8} {}",
                    record.domain,
                    record.environment,
                    record.role.to_string(),
                    if record.applied.ready { "yes" } else { "no" },
                    identifiers,
                );
            }
        }
    }

    let params = FileParameterStore::new(super::registry_path(&config));
    let entries = params.list(REGISTRY_PREFIX).await?;
    if !entries.is_empty() {
        println!("\nRegistry entries:");
        for (key, value) in entries {
            println!("  {key} = {value}");
        }
    }

    Ok(())
}
