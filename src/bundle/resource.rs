//! Typed resource nodes
//!
//! Every resource a bundle provisions is a [`ResourceNode`]: a stable
//! identifier, a typed spec, the tags to stamp, and declared dependency
//! edges. The engine never infers ordering from evaluation order; it reads
//! the edges.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag map applied to a resource
pub type Tags = BTreeMap<String, String>;

/// Stable identifier of a resource node: `{safe_name}-{environment}/{role}`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Build an identifier from a tuple slug and a resource role
    pub fn new(slug: &str, role: ResourceRole) -> Self {
        Self(format!("{slug}/{role}"))
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role a resource plays within its bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceRole {
    /// Versioned, encrypted, publicly-inaccessible content container
    Storage,
    /// Authoritative DNS zone for the domain
    DnsZone,
    /// TLS certificate covering apex and www (and typo variants)
    Certificate,
    /// CDN distribution fronting the storage container
    Distribution,
    /// Policy binding storage access to the distribution's origin identity
    AccessPolicy,
    /// Alias records pointing the zone at the distribution
    AliasRecords,
    /// Registrar-level delegation of the zone's name servers
    Registration,
}

impl ResourceRole {
    /// Kebab-case form used in identifiers and tags
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceRole::Storage => "storage",
            ResourceRole::DnsZone => "dns-zone",
            ResourceRole::Certificate => "certificate",
            ResourceRole::Distribution => "distribution",
            ResourceRole::AccessPolicy => "access-policy",
            ResourceRole::AliasRecords => "alias-records",
            ResourceRole::Registration => "registration",
        }
    }

    /// Creation order used when a recorded resource has no graph node to
    /// order against (e.g., an orphan left by an edited declaration).
    /// Destroys run through this in reverse.
    pub fn fallback_order(&self) -> usize {
        match self {
            ResourceRole::Storage => 0,
            ResourceRole::DnsZone => 1,
            ResourceRole::Certificate => 2,
            ResourceRole::Distribution => 3,
            ResourceRole::AccessPolicy => 4,
            ResourceRole::AliasRecords => 5,
            ResourceRole::Registration => 6,
        }
    }
}

impl fmt::Display for ResourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content container spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Globally unique container name
    pub name: String,
    /// Object versioning, protects contents against destructive overwrite
    pub versioning: bool,
    /// Server-side encryption at rest
    pub encryption: bool,
    /// All public access blocked; only the distribution's identity may read
    pub block_public_access: bool,
}

/// Authoritative DNS zone spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsZoneSpec {
    /// Zone apex, equal to the domain name
    pub zone_name: String,
}

/// TLS certificate spec
///
/// One certificate covers the apex and its `www` variant (plus any typo
/// variants) so a single validation cycle serves every alias hostname.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Primary subject name (the apex)
    pub primary_name: String,
    /// Additional covered names (www variant, typo variants)
    pub subject_alternative_names: Vec<String>,
    /// Overwrite DNS validation records left by an earlier generation
    /// attempt instead of failing on them
    pub overwrite_validation_records: bool,
}

/// Cache behavior attached to the distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePolicy {
    /// Minimum TTL in seconds
    pub min_ttl_secs: u64,
    /// Default TTL in seconds
    pub default_ttl_secs: u64,
    /// Maximum TTL in seconds
    pub max_ttl_secs: u64,
    /// Compress responses at the edge
    pub compress: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            min_ttl_secs: 0,
            default_ttl_secs: 86_400,
            max_ttl_secs: 31_536_000,
            compress: true,
        }
    }
}

/// Security headers injected into every response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityHeadersPolicy {
    /// `Strict-Transport-Security` max-age in seconds
    pub hsts_max_age_secs: u64,
    /// Send `X-Content-Type-Options: nosniff`
    pub content_type_options: bool,
    /// `X-Frame-Options` value
    pub frame_options: String,
    /// `Referrer-Policy` value
    pub referrer_policy: String,
}

impl Default for SecurityHeadersPolicy {
    fn default() -> Self {
        Self {
            hsts_max_age_secs: 31_536_000,
            content_type_options: true,
            frame_options: "DENY".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
        }
    }
}

/// Mapping of an origin error status to a client-visible response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Status code returned by the origin
    pub origin_status: u16,
    /// Status code shown to the client
    pub response_status: u16,
    /// Response page served instead of the origin body
    pub response_page: String,
}

/// Edge location footprint of the distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceClass {
    /// Reduced edge-location set; the cost/latency trade-off for small sites
    Reduced,
    /// Every edge location
    All,
}

/// CDN distribution spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSpec {
    /// Human-readable description shown in the provider console
    pub comment: String,
    /// Alias hostnames served by this distribution
    pub aliases: Vec<String>,
    /// Object served for the root path
    pub default_root_object: String,
    /// Cache behavior
    pub cache: CachePolicy,
    /// Security headers policy
    pub security_headers: SecurityHeadersPolicy,
    /// Origin error mappings; 403 and 404 both collapse to a single 404
    /// page so clients cannot distinguish "denied" from "absent"
    pub error_responses: Vec<ErrorResponse>,
    /// Edge location footprint
    pub price_class: PriceClass,
    /// Edge-router artifact evaluated on every inbound request
    pub router: crate::router::RouterConfig,
}

/// Access policy spec binding storage reads to the distribution identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicySpec {
    /// Name of the policy
    pub name: String,
    /// Object path pattern the distribution may read
    pub read_paths: String,
}

/// Alias record set pointing a zone at a distribution
///
/// The targets are resolved from the distribution's assigned hostname at
/// apply time; the spec never carries a static address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasRecordSpec {
    /// Zone apex the records live in
    pub zone_name: String,
    /// Apex IPv4 alias record
    pub apex_ipv4: bool,
    /// Apex IPv6 alias record
    pub apex_ipv6: bool,
    /// Canonicalization record for the `www` variant
    pub www_alias: bool,
}

/// Registrar delegation spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSpec {
    /// Domain to keep delegated at the registrar
    pub domain_name: String,
}

/// Typed spec of a resource node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResourceSpec {
    /// Content container
    Storage(StorageSpec),
    /// DNS zone
    DnsZone(DnsZoneSpec),
    /// TLS certificate
    Certificate(CertificateSpec),
    /// CDN distribution
    Distribution(DistributionSpec),
    /// Storage access policy
    AccessPolicy(AccessPolicySpec),
    /// DNS alias record set
    AliasRecords(AliasRecordSpec),
    /// Registrar delegation
    Registration(RegistrationSpec),
}

impl ResourceSpec {
    /// The role this spec fills
    pub fn role(&self) -> ResourceRole {
        match self {
            ResourceSpec::Storage(_) => ResourceRole::Storage,
            ResourceSpec::DnsZone(_) => ResourceRole::DnsZone,
            ResourceSpec::Certificate(_) => ResourceRole::Certificate,
            ResourceSpec::Distribution(_) => ResourceRole::Distribution,
            ResourceSpec::AccessPolicy(_) => ResourceRole::AccessPolicy,
            ResourceSpec::AliasRecords(_) => ResourceRole::AliasRecords,
            ResourceSpec::Registration(_) => ResourceRole::Registration,
        }
    }
}

/// One resource in the desired graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    /// Stable identifier
    pub id: ResourceId,
    /// Owning domain name
    pub domain: String,
    /// Owning environment
    pub environment: String,
    /// Typed spec
    pub spec: ResourceSpec,
    /// Identifiers of resources this node depends on
    pub depends_on: Vec<ResourceId>,
    /// Merged tags to stamp onto the resource
    pub tags: Tags,
}

impl ResourceNode {
    /// The role this node fills
    pub fn role(&self) -> ResourceRole {
        self.spec.role()
    }

    /// Canonical fingerprint of the spec and its edges
    ///
    /// Tags are deliberately excluded: the per-run deployment identifier
    /// changes on every invocation and must not make an unchanged bundle
    /// look dirty.
    pub fn fingerprint(&self) -> crate::Result<String> {
        #[derive(Serialize)]
        struct Fingerprinted<'a> {
            spec: &'a ResourceSpec,
            depends_on: &'a [ResourceId],
        }
        serde_json::to_string(&Fingerprinted {
            spec: &self.spec,
            depends_on: &self.depends_on,
        })
        .map_err(|e| crate::Error::serialization(format!("failed to fingerprint {}: {e}", self.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_format() {
        let id = ResourceId::new("example-com-production", ResourceRole::Storage);
        assert_eq!(id.as_str(), "example-com-production/storage");
        assert_eq!(id.to_string(), "example-com-production/storage");
    }

    #[test]
    fn test_role_round_trips_through_serde() {
        let json = serde_json::to_string(&ResourceRole::AccessPolicy).unwrap();
        assert_eq!(json, "\"access-policy\"");
        let role: ResourceRole = serde_json::from_str(&json).unwrap();
        assert_eq!(role, ResourceRole::AccessPolicy);
    }

    #[test]
    fn test_cache_policy_defaults() {
        let cache = CachePolicy::default();
        assert_eq!(cache.min_ttl_secs, 0);
        assert_eq!(cache.default_ttl_secs, 86_400);
        assert_eq!(cache.max_ttl_secs, 31_536_000);
        assert!(cache.compress);
    }

    #[test]
    fn test_fingerprint_ignores_tags() {
        let mut node = ResourceNode {
            id: ResourceId::new("example-com-production", ResourceRole::Storage),
            domain: "example.com".to_string(),
            environment: "production".to_string(),
            spec: ResourceSpec::Storage(StorageSpec {
                name: "example-com-production".to_string(),
                versioning: true,
                encryption: true,
                block_public_access: true,
            }),
            depends_on: vec![],
            tags: Tags::new(),
        };

        let before = node.fingerprint().unwrap();
        node.tags
            .insert("deployment-id".to_string(), "run-2".to_string());
        let after = node.fingerprint().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_fingerprint_changes_with_spec() {
        let node = ResourceNode {
            id: ResourceId::new("example-com-production", ResourceRole::Storage),
            domain: "example.com".to_string(),
            environment: "production".to_string(),
            spec: ResourceSpec::Storage(StorageSpec {
                name: "example-com-production".to_string(),
                versioning: true,
                encryption: true,
                block_public_access: true,
            }),
            depends_on: vec![],
            tags: Tags::new(),
        };

        let mut changed = node.clone();
        changed.spec = ResourceSpec::Storage(StorageSpec {
            name: "example-com-production".to_string(),
            versioning: false,
            encryption: true,
            block_public_access: true,
        });

        assert_ne!(node.fingerprint().unwrap(), changed.fingerprint().unwrap());
    }
}
