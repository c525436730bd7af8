//! Persisted convergence state and the lock-protected state store
//!
//! [`ConvergenceState`] is the record of what currently exists, keyed by
//! the catalog's stable state key. It is owned exclusively by the
//! convergence engine and only ever read or written under the
//! mutual-exclusion lock the same store provides.
//!
//! # Lock safety
//!
//! Locks are leases, not bare markers: every lock record carries its
//! holder, acquisition time, and expiry. Acquisition only ever steals a
//! lock whose lease has expired, and logs a warning when it does. A lock
//! inside its lease always wins, so two live runs cannot both hold it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bundle::{ResourceId, ResourceNode, ResourceRole};
use crate::provider::AppliedResource;
use crate::{Error, Result};

/// One resource as recorded after a completed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedResource {
    /// Stable identifier
    pub id: ResourceId,
    /// Owning domain name
    pub domain: String,
    /// Owning environment
    pub environment: String,
    /// Role within the bundle
    pub role: ResourceRole,
    /// Canonical fingerprint of the spec that was applied
    pub fingerprint: String,
    /// Provider-assigned identifiers
    pub applied: AppliedResource,
}

/// The persisted record of what currently exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvergenceState {
    /// State key this record belongs to
    pub state_key: String,
    /// Time of the last completed operation
    pub updated_at: DateTime<Utc>,
    /// Recorded resources by identifier
    pub resources: BTreeMap<ResourceId, RecordedResource>,
}

impl ConvergenceState {
    /// Create an empty state for a key
    pub fn new(state_key: impl Into<String>) -> Self {
        Self {
            state_key: state_key.into(),
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }

    /// Record a completed operation for a node
    pub fn record(&mut self, node: &ResourceNode, applied: AppliedResource) -> Result<()> {
        let record = RecordedResource {
            id: node.id.clone(),
            domain: node.domain.clone(),
            environment: node.environment.clone(),
            role: node.role(),
            fingerprint: node.fingerprint()?,
            applied,
        };
        self.resources.insert(node.id.clone(), record);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Remove a destroyed resource from the record
    pub fn remove(&mut self, id: &ResourceId) {
        self.resources.remove(id);
        self.updated_at = Utc::now();
    }

    /// Recorded resources belonging to one `(domain, environment)` tuple
    pub fn resources_for(&self, domain: &str, environment: &str) -> Vec<&RecordedResource> {
        self.resources
            .values()
            .filter(|r| r.domain == domain && r.environment == environment)
            .collect()
    }
}

/// Lease-carrying lock record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Identity of the run holding the lock
    pub holder: String,
    /// When the lock was acquired
    pub acquired_at: DateTime<Utc>,
    /// When the lease expires and the lock becomes stealable
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    /// Build a lock record for a holder with the given lease
    pub fn new(holder: impl Into<String>, lease: Duration) -> Self {
        let now = Utc::now();
        Self {
            holder: holder.into(),
            acquired_at: now,
            expires_at: now + chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::zero()),
        }
    }

    /// Whether the lease has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Storage backend for convergence state and its mutual-exclusion lock
///
/// The narrow `acquire`/`read`/`write`/`release` surface keeps the
/// convergence algorithm independent of where state lives, and makes the
/// contention and stale-lock paths testable with an in-memory store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Acquire the lock for a key, or fail with lock contention
    ///
    /// An existing lock whose lease has expired is taken over (with a
    /// warning); an existing lock inside its lease fails the acquisition.
    async fn acquire(&self, key: &str, holder: &str, lease: Duration) -> Result<()>;

    /// Read the state for a key, `None` when it has never been written
    async fn read(&self, key: &str) -> Result<Option<ConvergenceState>>;

    /// Persist the state for a key
    async fn write(&self, key: &str, state: &ConvergenceState) -> Result<()>;

    /// Release the lock for a key
    ///
    /// Releasing a lock held by someone else is refused; releasing an
    /// already-released lock succeeds so the unconditional-unlock path
    /// never fails a completed run.
    async fn release(&self, key: &str, holder: &str) -> Result<()>;
}

/// File-backed state store
///
/// State and lock live as JSON files in one directory, named by a
/// sanitized form of the state key.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Create a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn state_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.state.json", sanitize_key(key)))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.lock.json", sanitize_key(key)))
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::backend(format!("failed to create state directory: {e}")))
    }

    fn read_lock(&self, path: &Path) -> Result<LockRecord> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::backend(format!("failed to read lock record: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::backend(format!("corrupt lock record at {}: {e}", path.display())))
    }

    fn write_lock(&self, path: &Path, record: &LockRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| Error::serialization(format!("failed to encode lock record: {e}")))?;
        std::fs::write(path, content)
            .map_err(|e| Error::backend(format!("failed to write lock record: {e}")))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn acquire(&self, key: &str, holder: &str, lease: Duration) -> Result<()> {
        self.ensure_dir()?;
        let path = self.lock_path(key);

        if path.exists() {
            let existing = self.read_lock(&path)?;
            if existing.holder == holder {
                // Re-acquisition by the same run refreshes the lease
                debug!(key, holder, "refreshing held lock");
            } else if existing.is_expired() {
                warn!(
                    key,
                    holder,
                    previous_holder = %existing.holder,
                    expired_at = %existing.expires_at,
                    "taking over expired convergence lock"
                );
            } else {
                return Err(Error::lock_contention(key, existing.holder));
            }
        }

        self.write_lock(&path, &LockRecord::new(holder, lease))?;
        debug!(key, holder, "convergence lock acquired");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<ConvergenceState>> {
        let path = self.state_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::backend(format!("failed to read state: {e}")))?;
        let state = serde_json::from_str(&content)
            .map_err(|e| Error::backend(format!("corrupt state at {}: {e}", path.display())))?;
        Ok(Some(state))
    }

    async fn write(&self, key: &str, state: &ConvergenceState) -> Result<()> {
        self.ensure_dir()?;
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| Error::serialization(format!("failed to encode state: {e}")))?;
        std::fs::write(self.state_path(key), content)
            .map_err(|e| Error::backend(format!("failed to write state: {e}")))
    }

    async fn release(&self, key: &str, holder: &str) -> Result<()> {
        let path = self.lock_path(key);
        if !path.exists() {
            debug!(key, holder, "lock already released");
            return Ok(());
        }
        let existing = self.read_lock(&path)?;
        if existing.holder != holder {
            return Err(Error::lock_contention(key, existing.holder));
        }
        std::fs::remove_file(&path)
            .map_err(|e| Error::backend(format!("failed to remove lock record: {e}")))?;
        debug!(key, holder, "convergence lock released");
        Ok(())
    }
}

/// In-memory state store for tests and tooling
#[derive(Default)]
pub struct MemoryStateStore {
    states: DashMap<String, ConvergenceState>,
    locks: DashMap<String, LockRecord>,
}

impl MemoryStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn acquire(&self, key: &str, holder: &str, lease: Duration) -> Result<()> {
        if let Some(existing) = self.locks.get(key) {
            if existing.holder != holder && !existing.is_expired() {
                return Err(Error::lock_contention(key, existing.holder.clone()));
            }
            if existing.holder != holder {
                warn!(
                    key,
                    holder,
                    previous_holder = %existing.holder,
                    "taking over expired convergence lock"
                );
            }
        }
        self.locks
            .insert(key.to_string(), LockRecord::new(holder, lease));
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<ConvergenceState>> {
        Ok(self.states.get(key).map(|s| s.clone()))
    }

    async fn write(&self, key: &str, state: &ConvergenceState) -> Result<()> {
        self.states.insert(key.to_string(), state.clone());
        Ok(())
    }

    async fn release(&self, key: &str, holder: &str) -> Result<()> {
        if let Some(existing) = self.locks.get(key) {
            if existing.holder != holder {
                return Err(Error::lock_contention(key, existing.holder.clone()));
            }
        }
        self.locks.remove(key);
        Ok(())
    }
}

/// Replace path-hostile characters in a state key with hyphens
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '-' })
        .collect()
}
