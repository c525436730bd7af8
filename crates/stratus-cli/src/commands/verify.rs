//! Verify-prerequisites command
//!
//! Read-only environment check before a first deploy: configuration,
//! catalog layout, state backend, provider, and credentials. Nothing is
//! provisioned or locked.

use std::path::Path;

use stratus::catalog::{CatalogSource, FilesystemCatalog};
use stratus::credentials::Credentials;
use stratus::provider::{create_provider, ProviderKind};

use crate::{Error, Result};

pub async fn run(config_path: &Path) -> Result<()> {
    let mut failures = Vec::new();

    // Configuration must parse before anything else can be checked
    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  configuration {} valid", config_path.display());
            config
        }
        Err(e) => {
            return Err(Error::prerequisite(format!(
                "configuration {}: {e}",
                config_path.display()
            )));
        }
    };

    // Catalog layout and declarations
    match FilesystemCatalog::new(&config.domains_root).scan() {
        Ok(entries) => println!("  catalog {} domains declared", entries.len()),
        Err(e) => failures.push(format!("catalog: {e}")),
    }

    // State backend must be writable
    let state_dir = super::state_dir(&config);
    match std::fs::create_dir_all(&state_dir)
        .and_then(|_| std::fs::write(state_dir.join(".probe"), b"ok"))
        .and_then(|_| std::fs::remove_file(state_dir.join(".probe")))
    {
        Ok(()) => println!("  state backend {} writable", state_dir.display()),
        Err(e) => failures.push(format!("state backend {}: {e}", state_dir.display())),
    }

    // Credentials, only where the provider needs them
    let credentials = Credentials::from_env();
    match (config.provider, &credentials) {
        (ProviderKind::Local, _) => println!("  provider local needs no credentials"),
        (_, Some(_)) => println!("  credentials present in environment"),
        (_, None) => failures.push(format!(
            "provider {:?} requires credentials in the environment",
            config.provider
        )),
    }

    // Provider must be constructible
    match create_provider(config.provider, &super::provider_dir(&config), credentials.as_ref()) {
        Ok(_) => println!("  provider ready"),
        Err(e) => failures.push(format!("provider: {e}")),
    }

    if failures.is_empty() {
        println!("\nAll prerequisite checks passed.");
        Ok(())
    } else {
        for failure in &failures {
            println!("  FAILED {failure}");
        }
        Err(Error::prerequisite(format!(
            "{} check(s) failed",
            failures.len()
        )))
    }
}
