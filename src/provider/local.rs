//! Filesystem-backed development provider
//!
//! Implements [`CloudProvider`] against a local directory, which is useful
//! for development and testing without cloud access. Every resource is one
//! JSON record under the workspace; identifiers are derived
//! deterministically from the resource spec so repeated runs agree with
//! recorded state.
//!
//! The provider mirrors the drift semantics expected of a real backend: a
//! record that exists without a recorded prior is a conflict, a recorded
//! resource whose record vanished is a conflict, and deleting an
//! already-deleted resource succeeds.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{keys, AppliedResource, CloudProvider, DependencyOutputs, CERTIFICATE_ISSUED};
use crate::bundle::{ResourceId, ResourceNode, ResourceRole, ResourceSpec};
use crate::{Error, Result};

/// File name of the DNS validation record written next to a certificate
const VALIDATION_RECORD_FILE: &str = "dns-validation.json";

/// Local development provider
pub struct LocalProvider {
    root: PathBuf,
}

/// On-disk record of one provisioned resource
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceRecord {
    id: ResourceId,
    recorded_at: chrono::DateTime<Utc>,
    spec: ResourceSpec,
    identifiers: BTreeMap<String, String>,
}

impl LocalProvider {
    /// Create a provider storing resource records under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, id: &ResourceId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn write_record(&self, node: &ResourceNode, identifiers: &BTreeMap<String, String>) -> Result<()> {
        let path = self.record_path(&node.id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::provider(node.id.as_str(), format!("failed to create workspace: {e}"))
            })?;
        }
        let record = ResourceRecord {
            id: node.id.clone(),
            recorded_at: Utc::now(),
            spec: node.spec.clone(),
            identifiers: identifiers.clone(),
        };
        let content = serde_json::to_string_pretty(&record)
            .map_err(|e| Error::serialization(format!("failed to encode {}: {e}", node.id)))?;
        std::fs::write(&path, content)
            .map_err(|e| Error::provider(node.id.as_str(), format!("failed to write record: {e}")))
    }

    /// Write the certificate's DNS validation record into the zone
    ///
    /// Overwrites any record left by an earlier generation attempt when the
    /// spec permits it; a pre-existing record with overwrite disabled is a
    /// conflict.
    fn write_validation_record(&self, node: &ResourceNode, overwrite: bool) -> Result<()> {
        let path = self
            .record_path(&node.id)
            .with_file_name(VALIDATION_RECORD_FILE);
        if path.exists() && !overwrite {
            return Err(Error::conflict(
                node.id.as_str(),
                "stale DNS validation record present and overwrite is disabled",
            ));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::provider(node.id.as_str(), format!("failed to create workspace: {e}"))
            })?;
        }
        let record = serde_json::json!({
            "type": "CNAME",
            "purpose": "certificate-validation",
            "writtenAt": Utc::now().to_rfc3339(),
        });
        std::fs::write(&path, record.to_string()).map_err(|e| {
            Error::provider(node.id.as_str(), format!("failed to write validation record: {e}"))
        })
    }

    fn dependency<'a>(
        node: &ResourceNode,
        deps: &'a DependencyOutputs,
        role: ResourceRole,
    ) -> Result<&'a AppliedResource> {
        deps.values().find(|d| d.role == role).ok_or_else(|| {
            Error::internal(
                "provider",
                format!("{} is missing its {role} dependency output", node.id),
            )
        })
    }

    /// Derive the identifier bag for a node
    ///
    /// Identifiers are pure functions of the spec (and dependency outputs),
    /// so a re-created resource always gets the same names back.
    fn identifiers_for(
        &self,
        node: &ResourceNode,
        deps: &DependencyOutputs,
    ) -> Result<BTreeMap<String, String>> {
        let mut ids = BTreeMap::new();
        match &node.spec {
            ResourceSpec::Storage(spec) => {
                ids.insert(keys::NAME.to_string(), spec.name.clone());
                ids.insert(keys::ARN.to_string(), format!("arn:local:storage:::{}", spec.name));
            }
            ResourceSpec::DnsZone(spec) => {
                let tok = token(&spec.zone_name);
                ids.insert(keys::ID.to_string(), format!("Z{tok}"));
                ids.insert(
                    keys::NAME_SERVERS.to_string(),
                    format!(
                        "ns1-{t}.zones.local,ns2-{t}.zones.local",
                        t = tok.to_lowercase()
                    ),
                );
            }
            ResourceSpec::Certificate(spec) => {
                let tok = token(&spec.primary_name).to_lowercase();
                ids.insert(
                    keys::ARN.to_string(),
                    format!("arn:local:certificate/{}-{tok}", spec.primary_name),
                );
                // Local issuance completes as soon as the validation record
                // lands; no asynchronous wait.
                ids.insert(keys::STATUS.to_string(), CERTIFICATE_ISSUED.to_string());
            }
            ResourceSpec::Distribution(spec) => {
                let certificate = Self::dependency(node, deps, ResourceRole::Certificate)?;
                if certificate.identifier(keys::STATUS) != Some(CERTIFICATE_ISSUED) {
                    return Err(Error::provider(
                        node.id.as_str(),
                        format!(
                            "certificate {} is not issued",
                            certificate.identifier(keys::ARN).unwrap_or("<unknown>")
                        ),
                    ));
                }
                Self::dependency(node, deps, ResourceRole::Storage)?;

                let apex = spec.aliases.first().map(String::as_str).unwrap_or_default();
                let tok = token(apex).to_lowercase();
                ids.insert(keys::ID.to_string(), format!("E{}", token(apex)));
                ids.insert(keys::DOMAIN_NAME.to_string(), format!("d{tok}.dist.local"));
            }
            ResourceSpec::AccessPolicy(spec) => {
                let distribution = Self::dependency(node, deps, ResourceRole::Distribution)?;
                ids.insert(keys::NAME.to_string(), spec.name.clone());
                // The policy's only allowed principal is the distribution
                ids.insert(
                    "principal".to_string(),
                    format!("distribution/{}", distribution.require(keys::ID)?),
                );
            }
            ResourceSpec::AliasRecords(_) => {
                Self::dependency(node, deps, ResourceRole::DnsZone)?;
                let distribution = Self::dependency(node, deps, ResourceRole::Distribution)?;
                // Alias targets resolve to the assigned hostname, never a
                // static address
                ids.insert(
                    keys::TARGET.to_string(),
                    distribution.require(keys::DOMAIN_NAME)?.to_string(),
                );
            }
            ResourceSpec::Registration(_) => {
                let zone = Self::dependency(node, deps, ResourceRole::DnsZone)?;
                ids.insert(keys::STATUS.to_string(), "delegated".to_string());
                ids.insert(
                    keys::NAME_SERVERS.to_string(),
                    zone.require(keys::NAME_SERVERS)?.to_string(),
                );
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl CloudProvider for LocalProvider {
    async fn create(
        &self,
        node: &ResourceNode,
        deps: &DependencyOutputs,
    ) -> Result<AppliedResource> {
        let path = self.record_path(&node.id);
        if path.exists() {
            return Err(Error::conflict(
                node.id.as_str(),
                "resource exists in the provider but not in recorded state",
            ));
        }

        if let ResourceSpec::Certificate(spec) = &node.spec {
            self.write_validation_record(node, spec.overwrite_validation_records)?;
        }

        let identifiers = self.identifiers_for(node, deps)?;
        self.write_record(node, &identifiers)?;
        debug!(resource = %node.id, "created local resource");
        Ok(AppliedResource::ready(node.role(), identifiers))
    }

    async fn update(
        &self,
        node: &ResourceNode,
        prior: &AppliedResource,
        deps: &DependencyOutputs,
    ) -> Result<AppliedResource> {
        let path = self.record_path(&node.id);
        if !path.exists() {
            return Err(Error::conflict(
                node.id.as_str(),
                "resource is recorded in state but missing from the provider",
            ));
        }

        if let ResourceSpec::Certificate(spec) = &node.spec {
            self.write_validation_record(node, spec.overwrite_validation_records)?;
        }

        // Stable identifiers stay stable across updates; only spec-derived
        // values may change.
        let mut identifiers = self.identifiers_for(node, deps)?;
        for key in [keys::ID, keys::ARN, keys::DOMAIN_NAME, keys::NAME_SERVERS] {
            if let Some(existing) = prior.identifier(key) {
                identifiers.insert(key.to_string(), existing.to_string());
            }
        }

        self.write_record(node, &identifiers)?;
        debug!(resource = %node.id, "updated local resource");
        Ok(AppliedResource::ready(node.role(), identifiers))
    }

    async fn await_ready(
        &self,
        _node: &ResourceNode,
        applied: &AppliedResource,
    ) -> Result<AppliedResource> {
        // Local certificates issue synchronously at create time
        Ok(applied.clone())
    }

    async fn delete(&self, id: &ResourceId, _applied: &AppliedResource) -> Result<()> {
        let path = self.record_path(id);
        if !path.exists() {
            warn!(resource = %id, "resource already absent, nothing to delete");
            return Ok(());
        }
        std::fs::remove_file(&path)
            .map_err(|e| Error::provider(id.as_str(), format!("failed to delete record: {e}")))?;
        debug!(resource = %id, "deleted local resource");
        Ok(())
    }
}

/// Deterministic short token derived from a seed string (FNV-1a folded to
/// twelve hex digits)
fn token(seed: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in seed.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("{:012X}", hash & 0xFFFF_FFFF_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{instantiate, BaseTags, ResourceBundle};
    use crate::catalog::{CatalogEntry, DomainDeclaration, DomainTuple};

    fn bundle(domain: &str) -> ResourceBundle {
        let entry = CatalogEntry {
            tuple: DomainTuple::new(domain, "production"),
            declaration: DomainDeclaration {
                domain: domain.to_string(),
                register: true,
                typos: vec![],
            },
        };
        let base = BaseTags {
            project: "static-websites".to_string(),
            repository: "acme/sites".to_string(),
            owner: "platform".to_string(),
            deployer: "ci".to_string(),
            deployment_id: "run-1".to_string(),
        };
        instantiate(&entry, &base)
    }

    fn node(bundle: &ResourceBundle, role: ResourceRole) -> ResourceNode {
        bundle
            .nodes
            .iter()
            .find(|n| n.role() == role)
            .cloned()
            .unwrap_or_else(|| panic!("bundle missing {role}"))
    }

    /// Apply a whole bundle in dependency order, returning outputs by id
    async fn apply_bundle(provider: &LocalProvider, bundle: &ResourceBundle) -> DependencyOutputs {
        let mut outputs = DependencyOutputs::new();
        let order = [
            ResourceRole::Storage,
            ResourceRole::DnsZone,
            ResourceRole::Certificate,
            ResourceRole::Distribution,
            ResourceRole::AccessPolicy,
            ResourceRole::AliasRecords,
            ResourceRole::Registration,
        ];
        for role in order {
            let n = node(bundle, role);
            let deps: DependencyOutputs = n
                .depends_on
                .iter()
                .map(|d| (d.clone(), outputs[d].clone()))
                .collect();
            let applied = provider.create(&n, &deps).await.expect("create should succeed");
            outputs.insert(n.id.clone(), applied);
        }
        outputs
    }

    #[tokio::test]
    async fn test_identifiers_are_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let b = bundle("example.com");

        let first = apply_bundle(&LocalProvider::new(tmp.path().join("a")), &b).await;
        let second = apply_bundle(&LocalProvider::new(tmp.path().join("b")), &b).await;

        for (id, applied) in &first {
            assert_eq!(applied.identifiers, second[id].identifiers, "{id}");
            assert!(applied.ready);
        }
    }

    #[tokio::test]
    async fn test_create_detects_drift() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(tmp.path());
        let storage = node(&bundle("example.com"), ResourceRole::Storage);

        provider
            .create(&storage, &DependencyOutputs::new())
            .await
            .expect("first create should succeed");
        let err = provider
            .create(&storage, &DependencyOutputs::new())
            .await
            .expect_err("second create should conflict");
        assert!(err.to_string().contains("resource conflict"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_update_requires_the_resource_to_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(tmp.path());
        let storage = node(&bundle("example.com"), ResourceRole::Storage);

        let prior = AppliedResource::ready(ResourceRole::Storage, BTreeMap::new());
        let err = provider
            .update(&storage, &prior, &DependencyOutputs::new())
            .await
            .expect_err("update of a vanished resource should conflict");
        assert!(err.to_string().contains("missing from the provider"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(tmp.path());
        let storage = node(&bundle("example.com"), ResourceRole::Storage);

        let applied = provider
            .create(&storage, &DependencyOutputs::new())
            .await
            .unwrap();
        provider.delete(&storage.id, &applied).await.unwrap();
        // A crashed destroy re-walks completed deletions
        provider.delete(&storage.id, &applied).await.unwrap();
    }

    #[tokio::test]
    async fn test_alias_records_point_at_the_distribution_hostname() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(tmp.path());
        let b = bundle("example.com");

        let outputs = apply_bundle(&provider, &b).await;
        let alias = node(&b, ResourceRole::AliasRecords);
        let distribution = node(&b, ResourceRole::Distribution);

        let target = outputs[&alias.id].identifier(keys::TARGET).unwrap();
        let hostname = outputs[&distribution.id]
            .identifier(keys::DOMAIN_NAME)
            .unwrap();
        assert_eq!(target, hostname);
        assert!(hostname.ends_with(".dist.local"));
    }

    #[tokio::test]
    async fn test_certificate_validation_record_is_overwritten_on_retry() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(tmp.path());
        let b = bundle("example.com");

        let zone = node(&b, ResourceRole::DnsZone);
        let zone_out = provider.create(&zone, &DependencyOutputs::new()).await.unwrap();
        let cert = node(&b, ResourceRole::Certificate);
        let deps: DependencyOutputs = [(zone.id.clone(), zone_out)].into_iter().collect();

        // Simulate a partial earlier run: validation record exists, the
        // certificate record does not.
        provider.create(&cert, &deps).await.unwrap();
        std::fs::remove_file(provider.record_path(&cert.id)).unwrap();

        let applied = provider
            .create(&cert, &deps)
            .await
            .expect("retry should overwrite the stale validation record");
        assert_eq!(applied.identifier(keys::STATUS), Some(CERTIFICATE_ISSUED));
    }

    #[test]
    fn test_token_is_stable_and_seed_sensitive() {
        assert_eq!(token("example.com"), token("example.com"));
        assert_ne!(token("example.com"), token("other.org"));
        assert_eq!(token("example.com").len(), 12);
    }
}
