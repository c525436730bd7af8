//! CLI commands

use std::path::Path;
use std::sync::Arc;

use stratus::config::StratusConfig;
use stratus::credentials::Credentials;
use stratus::engine::{Engine, EngineConfig};
use stratus::provider::create_provider;
use stratus::registry::FileParameterStore;
use stratus::retry::RetryConfig;
use stratus::state::FileStateStore;

use crate::Result;

pub mod create_domain;
pub mod deploy;
pub mod destroy;
pub mod list_resources;
pub mod verify;

/// Load the repository configuration from the `--config` path
pub fn load_config(path: &Path) -> Result<StratusConfig> {
    Ok(StratusConfig::load(path)?)
}

/// Path of the state store directory under the working directory
pub fn state_dir(config: &StratusConfig) -> std::path::PathBuf {
    config.work_dir.join("state")
}

/// Path of the local provider workspace under the working directory
pub fn provider_dir(config: &StratusConfig) -> std::path::PathBuf {
    config.work_dir.join("resources")
}

/// Path of the file-backed registry under the working directory
pub fn registry_path(config: &StratusConfig) -> std::path::PathBuf {
    config.work_dir.join("registry.json")
}

/// Build the convergence engine from configuration
///
/// Credentials are resolved from the environment once, here, and injected;
/// the engine and providers never read ambient state themselves.
pub fn build_engine(config: &StratusConfig) -> Result<Engine> {
    tracing::debug!(
        provider = ?config.provider,
        work_dir = %config.work_dir.display(),
        "building engine"
    );
    let credentials = Credentials::from_env();
    let provider = create_provider(
        config.provider,
        &provider_dir(config),
        credentials.as_ref(),
    )?;

    let store = Arc::new(FileStateStore::new(state_dir(config)));
    let params = Arc::new(FileParameterStore::new(registry_path(config)));

    let engine_config = EngineConfig {
        state_key: config.state_key.clone(),
        project: config.project.clone(),
        owner: config.owner.clone(),
        deployer: config.deployer_identity(),
        certificate_timeout: config.certificate_timeout(),
        lock_lease: config.lock_lease(),
        lock_retry: RetryConfig::with_max_attempts(config.lock_retry_attempts),
    };

    Ok(Engine::new(provider.into(), store, params, engine_config))
}
