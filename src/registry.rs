//! Parameter-registry publisher
//!
//! After a successful apply the engine publishes each domain's resource
//! identifiers into a namespaced key-value store; after a successful
//! destroy it removes them. The registry is the only sanctioned channel
//! through which external consumers learn resource identifiers, and a key
//! exists exactly while its domain is fully converged: never before the
//! apply completes, never after the destroy completes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use crate::bundle::ResourceRole;
use crate::provider::keys as provider_keys;
use crate::state::{ConvergenceState, RecordedResource};
use crate::{Error, Result};

/// Namespace prefix every registry key lives under
pub const REGISTRY_PREFIX: &str = "/static-website/infrastructure";

/// Key suffixes published per domain, paired with the role and provider
/// identifier each value comes from
const KEY_SCHEMA: [(&str, ResourceRole, &str); 6] = [
    ("bucket-name", ResourceRole::Storage, provider_keys::NAME),
    ("bucket-arn", ResourceRole::Storage, provider_keys::ARN),
    (
        "cloudfront-distribution-id",
        ResourceRole::Distribution,
        provider_keys::ID,
    ),
    (
        "cloudfront-domain-name",
        ResourceRole::Distribution,
        provider_keys::DOMAIN_NAME,
    ),
    (
        "certificate-arn",
        ResourceRole::Certificate,
        provider_keys::ARN,
    ),
    ("hosted-zone-id", ResourceRole::DnsZone, provider_keys::ID),
];

/// Full registry key for a domain and suffix
pub fn registry_key(domain: &str, suffix: &str) -> String {
    format!("{REGISTRY_PREFIX}/{domain}/{suffix}")
}

/// All registry keys published for a domain
pub fn registry_keys(domain: &str) -> Vec<String> {
    KEY_SCHEMA
        .iter()
        .map(|(suffix, _, _)| registry_key(domain, suffix))
        .collect()
}

/// Namespaced key-value store the registry publishes into
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Write a key, overwriting any existing value
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Read a key, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete a key; deleting an absent key succeeds
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all keys under a prefix with their values, sorted by key
    async fn list(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}

/// Publishes and withdraws registry entries for converged domains
pub struct RegistryPublisher {
    store: std::sync::Arc<dyn ParameterStore>,
}

impl RegistryPublisher {
    /// Create a publisher over a parameter store
    pub fn new(store: std::sync::Arc<dyn ParameterStore>) -> Self {
        Self { store }
    }

    /// Publish a domain's identifiers from its recorded resources
    ///
    /// Fails without writing anything when an identifier is missing; a
    /// half-published domain would look "ready" to a consumer probing a
    /// subset of keys.
    pub async fn publish(
        &self,
        domain: &str,
        environment: &str,
        state: &ConvergenceState,
    ) -> Result<()> {
        let resources = state.resources_for(domain, environment);
        let entries = entries_for(domain, &resources)?;
        for (key, value) in &entries {
            self.store.put(key, value).await?;
        }
        info!(domain, environment, entries = entries.len(), "registry entries published");
        Ok(())
    }

    /// Remove every registry entry for a domain
    pub async fn withdraw(&self, domain: &str) -> Result<()> {
        for key in registry_keys(domain) {
            self.store.delete(&key).await?;
        }
        info!(domain, "registry entries withdrawn");
        Ok(())
    }
}

/// Build a domain's registry entries from its recorded resources
fn entries_for(domain: &str, resources: &[&RecordedResource]) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::with_capacity(KEY_SCHEMA.len());
    for (suffix, role, identifier) in KEY_SCHEMA {
        let record = resources.iter().find(|r| r.role == role).ok_or_else(|| {
            Error::internal(
                "publisher",
                format!("{domain} has no recorded {role} resource"),
            )
        })?;
        let value = record.applied.require(identifier)?;
        entries.push((registry_key(domain, suffix), value.to_string()));
    }
    Ok(entries)
}

/// In-memory parameter store for tests and tooling
#[derive(Default)]
pub struct MemoryParameterStore {
    entries: DashMap<String, String>,
}

impl MemoryParameterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let mut entries: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort();
        Ok(entries)
    }
}

/// File-backed parameter store
///
/// One JSON map per store, read-modify-written on every mutation. Fits the
/// local development provider; a real deployment points this trait at the
/// cloud parameter service instead.
pub struct FileParameterStore {
    path: PathBuf,
}

impl FileParameterStore {
    /// Create a store persisting to the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::backend(format!("failed to read registry: {e}")))?;
        serde_json::from_str(&content).map_err(|e| {
            Error::backend(format!("corrupt registry at {}: {e}", self.path.display()))
        })
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::backend(format!("failed to create registry dir: {e}")))?;
        }
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| Error::serialization(format!("failed to encode registry: {e}")))?;
        std::fs::write(&self.path, content)
            .map_err(|e| Error::backend(format!("failed to write registry: {e}")))
    }
}

#[async_trait]
impl ParameterStore for FileParameterStore {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)?;
        debug!(key, "registry entry written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
            debug!(key, "registry entry removed");
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect())
    }
}
