//! Repository-level configuration (`stratus.yaml`)
//!
//! One configuration file at the repository root drives every command:
//! the state key (also the lock key and the destroy confirmation token),
//! the declaration root, the provider selection, base tag values, and the
//! engine's bounded waits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;
use crate::{Error, Result};

/// Default configuration file name at the repository root
pub const CONFIG_FILE_NAME: &str = "stratus.yaml";

fn default_domains_root() -> PathBuf {
    PathBuf::from("domains")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".stratus")
}

fn default_project() -> String {
    "static-websites".to_string()
}

fn default_owner() -> String {
    "web-platform".to_string()
}

fn default_certificate_timeout_secs() -> u64 {
    1800
}

fn default_lock_lease_secs() -> u64 {
    900
}

fn default_lock_retry_attempts() -> u32 {
    5
}

/// Repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StratusConfig {
    /// Stable identity of this catalog (e.g., "github.com/acme/sites").
    /// Keys the persisted state, the convergence lock, and the destroy
    /// confirmation token.
    pub state_key: String,

    /// Root directory of the domain declaration layout
    #[serde(default = "default_domains_root")]
    pub domains_root: PathBuf,

    /// Cloud provider backing resource operations
    #[serde(default)]
    pub provider: ProviderKind,

    /// Project tag stamped onto every resource
    #[serde(default = "default_project")]
    pub project: String,

    /// Owner tag stamped onto every resource
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Deployer identity tag; resolved from `$USER` when unset
    #[serde(default)]
    pub deployer: Option<String>,

    /// Working directory for state, locks, and local provider files
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Bound on the certificate DNS validation wait
    #[serde(default = "default_certificate_timeout_secs")]
    pub certificate_timeout_secs: u64,

    /// Lease duration written into the convergence lock
    #[serde(default = "default_lock_lease_secs")]
    pub lock_lease_secs: u64,

    /// Bounded attempts when acquiring a contended lock
    #[serde(default = "default_lock_retry_attempts")]
    pub lock_retry_attempts: u32,
}

impl StratusConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::catalog_at(path, format!("failed to read configuration: {e}"))
        })?;
        let config: StratusConfig = serde_yaml::from_str(&content)
            .map_err(|e| Error::catalog_at(path, format!("invalid configuration: {e}")))?;
        if config.state_key.trim().is_empty() {
            return Err(Error::catalog_at(path, "stateKey must not be empty"));
        }
        Ok(config)
    }

    /// Deployer identity, falling back to `$USER`
    pub fn deployer_identity(&self) -> String {
        self.deployer
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Certificate validation bound as a [`Duration`]
    pub fn certificate_timeout(&self) -> Duration {
        Duration::from_secs(self.certificate_timeout_secs)
    }

    /// Lock lease as a [`Duration`]
    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_secs)
    }
}
