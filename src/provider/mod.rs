//! Cloud provider abstraction layer
//!
//! A trait-based abstraction for the provider that actually creates,
//! mutates, and deletes resources. The engine only ever speaks
//! [`CloudProvider`]; which backend answers is decided once, at
//! construction, by [`create_provider`].
//!
//! # Supported Providers
//!
//! - [`LocalProvider`] - filesystem-backed provider for local development
//!
//! Real cloud backends are selectable in configuration but rejected by the
//! factory until implemented.

mod local;

pub use local::LocalProvider;

use std::collections::BTreeMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::bundle::{ResourceId, ResourceNode, ResourceRole};
use crate::credentials::Credentials;
use crate::{Error, Result};

/// Identifier keys reported by providers in [`AppliedResource::identifiers`]
pub mod keys {
    /// Provider-side name of the resource
    pub const NAME: &str = "name";
    /// Provider ARN of the resource
    pub const ARN: &str = "arn";
    /// Provider-assigned opaque identifier
    pub const ID: &str = "id";
    /// Hostname assigned to a distribution
    pub const DOMAIN_NAME: &str = "domain-name";
    /// Name servers assigned to a zone
    pub const NAME_SERVERS: &str = "name-servers";
    /// Lifecycle status (e.g., a certificate's issuance state)
    pub const STATUS: &str = "status";
    /// Target hostname an alias record set points at
    pub const TARGET: &str = "target";
}

/// Certificate status value once DNS validation has completed
pub const CERTIFICATE_ISSUED: &str = "issued";

/// Provider-assigned identifiers for one applied resource
///
/// The identifier bag is the only channel through which downstream
/// resources (and ultimately the registry) learn provider-side names; the
/// engine records it in state after every completed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResource {
    /// Role of the resource these identifiers belong to
    pub role: ResourceRole,
    /// Whether the resource has reached a stable, addressable state.
    /// A requested-but-unvalidated certificate is recorded with
    /// `ready: false` so a re-run knows to resume the wait.
    pub ready: bool,
    /// Provider-assigned identifiers, keyed by the constants in [`keys`]
    pub identifiers: BTreeMap<String, String>,
}

impl AppliedResource {
    /// Create an applied resource in the ready state
    pub fn ready(role: ResourceRole, identifiers: BTreeMap<String, String>) -> Self {
        Self {
            role,
            ready: true,
            identifiers,
        }
    }

    /// Look up an identifier by key
    pub fn identifier(&self, key: &str) -> Option<&str> {
        self.identifiers.get(key).map(String::as_str)
    }

    /// Look up an identifier, erroring when the provider never reported it
    pub fn require(&self, key: &str) -> Result<&str> {
        self.identifier(key).ok_or_else(|| {
            Error::internal(
                "provider",
                format!("{} resource is missing identifier '{key}'", self.role),
            )
        })
    }
}

/// Identifier bags of a node's dependencies, keyed by dependency id
///
/// The engine resolves these from recorded state before each operation;
/// dependency ordering guarantees every entry is present and ready.
pub type DependencyOutputs = BTreeMap<ResourceId, AppliedResource>;

/// Operations the engine performs against a cloud backend
///
/// Every method is a single resource operation: no retries, no hidden
/// waits except [`await_ready`](CloudProvider::await_ready), which the
/// engine wraps in its bounded certificate timeout.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Create a resource that recorded state says does not exist
    ///
    /// Implementations must detect drift: if the target already exists in
    /// the provider, the operation fails with a resource conflict rather
    /// than adopting it silently.
    async fn create(
        &self,
        node: &ResourceNode,
        deps: &DependencyOutputs,
    ) -> Result<AppliedResource>;

    /// Converge an existing resource onto a changed spec
    ///
    /// `prior` carries the identifiers recorded by the operation that
    /// created the resource; implementations keep stable identifiers
    /// stable.
    async fn update(
        &self,
        node: &ResourceNode,
        prior: &AppliedResource,
        deps: &DependencyOutputs,
    ) -> Result<AppliedResource>;

    /// Wait for a resource to reach a stable, addressable state
    ///
    /// Only certificates are ever not-ready after create/update (DNS
    /// validation). The engine bounds this wait; implementations must
    /// return as soon as the resource settles and never poll past a
    /// terminal failure.
    async fn await_ready(
        &self,
        node: &ResourceNode,
        applied: &AppliedResource,
    ) -> Result<AppliedResource>;

    /// Delete a resource recorded in state
    ///
    /// Deleting a resource that is already gone is not an error; a
    /// re-invoked destroy must be able to walk past work a crashed run
    /// already did.
    async fn delete(&self, id: &ResourceId, applied: &AppliedResource) -> Result<()>;
}

/// Cloud backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Filesystem-backed development provider
    #[default]
    Local,
    /// Amazon Web Services
    Aws,
    /// Google Cloud Platform
    Gcp,
    /// Microsoft Azure
    Azure,
}

/// Create a provider instance for the given backend
///
/// `workspace` is the directory the local provider stores its resource
/// records in; cloud backends ignore it. `credentials` are required for
/// cloud backends and ignored by the local one.
pub fn create_provider(
    kind: ProviderKind,
    workspace: &std::path::Path,
    credentials: Option<&Credentials>,
) -> Result<Box<dyn CloudProvider>> {
    match kind {
        ProviderKind::Local => Ok(Box::new(LocalProvider::new(workspace))),
        ProviderKind::Aws => {
            if credentials.is_none() {
                return Err(Error::provider_permanent(
                    "provider/aws",
                    "AWS provider requires credentials",
                ));
            }
            Err(Error::provider_permanent(
                "provider/aws",
                "AWS provider not yet implemented",
            ))
        }
        ProviderKind::Gcp => Err(Error::provider_permanent(
            "provider/gcp",
            "GCP provider not yet implemented",
        )),
        ProviderKind::Azure => Err(Error::provider_permanent(
            "provider/azure",
            "Azure provider not yet implemented",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applied_resource_identifier_lookup() {
        let mut identifiers = BTreeMap::new();
        identifiers.insert(keys::NAME.to_string(), "example-com-production".to_string());

        let applied = AppliedResource::ready(ResourceRole::Storage, identifiers);
        assert!(applied.ready);
        assert_eq!(applied.identifier(keys::NAME), Some("example-com-production"));
        assert_eq!(applied.identifier(keys::ARN), None);

        let err = applied.require(keys::ARN).unwrap_err();
        assert!(err.to_string().contains("missing identifier 'arn'"));
    }

    #[test]
    fn test_provider_kind_parses_from_config() {
        let kind: ProviderKind = serde_yaml::from_str("local").unwrap();
        assert_eq!(kind, ProviderKind::Local);
        let kind: ProviderKind = serde_yaml::from_str("aws").unwrap();
        assert_eq!(kind, ProviderKind::Aws);
        assert_eq!(ProviderKind::default(), ProviderKind::Local);
    }

    #[test]
    fn test_factory_rejects_unimplemented_backends() {
        let tmp = tempfile::tempdir().unwrap();

        assert!(create_provider(ProviderKind::Local, tmp.path(), None).is_ok());

        let creds = Credentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "SECRET".to_string(),
            region: "us-east-1".to_string(),
            session_token: None,
        };
        let err = match create_provider(ProviderKind::Aws, tmp.path(), Some(&creds)) {
            Ok(_) => panic!("expected an error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("not yet implemented"));
        assert!(!err.is_retryable());

        let err = match create_provider(ProviderKind::Aws, tmp.path(), None) {
            Ok(_) => panic!("expected an error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("requires credentials"));
    }
}
