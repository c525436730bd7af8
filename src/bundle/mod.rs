//! Resource bundle template
//!
//! [`instantiate`] is a pure function producing the declarative resource
//! graph for one `(domain, environment)` tuple: storage, CDN distribution,
//! TLS certificate, DNS zone, access policy, alias records, and an optional
//! registrar delegation, with every resource name derived deterministically
//! from the tuple's safe name and environment. It is side-effect-free and
//! never talks to any API.
//!
//! Tuples share no resources, so instantiation across a catalog is
//! embarrassingly parallel; [`instantiate_all`] fans out across tasks and
//! merges the results into one graph.

mod resource;

pub use resource::{
    AccessPolicySpec, AliasRecordSpec, CachePolicy, CertificateSpec, DistributionSpec, DnsZoneSpec,
    ErrorResponse, PriceClass, RegistrationSpec, ResourceId, ResourceNode, ResourceRole,
    ResourceSpec, SecurityHeadersPolicy, StorageSpec, Tags,
};

use tracing::debug;

use crate::catalog::CatalogEntry;
use crate::graph::ResourceGraph;
use crate::router::{RouterConfig, DEFAULT_DOCUMENT};
use crate::{Result, MANAGED_BY};

/// Response page served for every collapsed origin error
pub const ERROR_PAGE: &str = "/404.html";

/// Client-visible status for both 403 and 404 origin responses
///
/// The distribution deliberately hides the distinction between "access
/// denied" and "not found" so object existence cannot be probed.
pub const ERROR_STATUS: u16 = 404;

/// Fixed base tag set stamped onto every resource
///
/// Base keys always win over resource-specific keys of the same name, so
/// audit tooling can trust them regardless of what a template adds.
#[derive(Debug, Clone)]
pub struct BaseTags {
    /// Project name
    pub project: String,
    /// Source repository identity
    pub repository: String,
    /// Owning team or person
    pub owner: String,
    /// Identity that ran the deployment
    pub deployer: String,
    /// Unique identifier of this convergence run
    pub deployment_id: String,
}

impl BaseTags {
    /// Render the base tag map for one environment
    pub fn for_environment(&self, environment: &str) -> Tags {
        let mut tags = Tags::new();
        tags.insert("project".to_string(), self.project.clone());
        tags.insert("repository".to_string(), self.repository.clone());
        tags.insert("environment".to_string(), environment.to_string());
        tags.insert("owner".to_string(), self.owner.clone());
        tags.insert("deployer".to_string(), self.deployer.clone());
        tags.insert("managed-by".to_string(), MANAGED_BY.to_string());
        tags.insert("deployment-id".to_string(), self.deployment_id.clone());
        tags
    }
}

/// Merge resource-specific tags under a base set; base keys win on conflict
pub fn merge_tags(base: &Tags, resource: &Tags) -> Tags {
    let mut merged = resource.clone();
    for (key, value) in base {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// The full resource set for one tuple
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBundle {
    /// Nodes in creation-independent declaration order
    pub nodes: Vec<ResourceNode>,
}

/// Expand one catalog entry into its resource bundle
pub fn instantiate(entry: &CatalogEntry, base: &BaseTags) -> ResourceBundle {
    let tuple = &entry.tuple;
    let declaration = &entry.declaration;
    let slug = tuple.slug();
    let domain = &tuple.domain_name;
    let www = format!("www.{domain}");

    let base_tags = base.for_environment(&tuple.environment);
    let tags_for = |role: ResourceRole| {
        let mut resource_tags = Tags::new();
        resource_tags.insert("role".to_string(), role.as_str().to_string());
        resource_tags.insert("domain".to_string(), domain.clone());
        merge_tags(&base_tags, &resource_tags)
    };

    let storage_id = ResourceId::new(&slug, ResourceRole::Storage);
    let zone_id = ResourceId::new(&slug, ResourceRole::DnsZone);
    let certificate_id = ResourceId::new(&slug, ResourceRole::Certificate);
    let distribution_id = ResourceId::new(&slug, ResourceRole::Distribution);
    let policy_id = ResourceId::new(&slug, ResourceRole::AccessPolicy);
    let alias_id = ResourceId::new(&slug, ResourceRole::AliasRecords);

    // Typo variants ride on the canonical distribution: they are extra
    // aliases and certificate names, and the router redirects them.
    let mut extra_names = Vec::new();
    for typo in &declaration.typos {
        extra_names.push(typo.clone());
        extra_names.push(format!("www.{typo}"));
    }

    let mut subject_alternative_names = vec![www.clone()];
    subject_alternative_names.extend(extra_names.iter().cloned());

    let mut aliases = vec![domain.clone(), www.clone()];
    aliases.extend(extra_names.iter().cloned());

    let node = |id: &ResourceId, spec: ResourceSpec, depends_on: Vec<ResourceId>| ResourceNode {
        id: id.clone(),
        domain: domain.clone(),
        environment: tuple.environment.clone(),
        tags: tags_for(spec.role()),
        spec,
        depends_on,
    };

    let mut nodes = vec![
        node(
            &storage_id,
            ResourceSpec::Storage(StorageSpec {
                name: slug.clone(),
                versioning: true,
                encryption: true,
                block_public_access: true,
            }),
            vec![],
        ),
        node(
            &zone_id,
            ResourceSpec::DnsZone(DnsZoneSpec {
                zone_name: domain.clone(),
            }),
            vec![],
        ),
        // The certificate is validated through records written into the
        // zone, so the zone must exist first.
        node(
            &certificate_id,
            ResourceSpec::Certificate(CertificateSpec {
                primary_name: domain.clone(),
                subject_alternative_names,
                overwrite_validation_records: true,
            }),
            vec![zone_id.clone()],
        ),
        // The distribution may only bind a certificate that reached the
        // issued state, hence the edge.
        node(
            &distribution_id,
            ResourceSpec::Distribution(DistributionSpec {
                comment: format!("{domain} ({})", tuple.environment),
                aliases,
                default_root_object: DEFAULT_DOCUMENT.to_string(),
                cache: CachePolicy::default(),
                security_headers: SecurityHeadersPolicy::default(),
                error_responses: vec![
                    ErrorResponse {
                        origin_status: 403,
                        response_status: ERROR_STATUS,
                        response_page: ERROR_PAGE.to_string(),
                    },
                    ErrorResponse {
                        origin_status: 404,
                        response_status: ERROR_STATUS,
                        response_page: ERROR_PAGE.to_string(),
                    },
                ],
                price_class: PriceClass::Reduced,
                router: RouterConfig::new(domain.clone(), &declaration.typos),
            }),
            vec![storage_id.clone(), certificate_id.clone()],
        ),
        // The policy names the distribution's origin identity as its only
        // allowed principal, so the distribution must exist first.
        node(
            &policy_id,
            ResourceSpec::AccessPolicy(AccessPolicySpec {
                name: format!("{slug}-origin-read"),
                read_paths: "*".to_string(),
            }),
            vec![storage_id.clone(), distribution_id.clone()],
        ),
        // Alias targets resolve to the distribution's assigned hostname,
        // never a static address.
        node(
            &alias_id,
            ResourceSpec::AliasRecords(AliasRecordSpec {
                zone_name: domain.clone(),
                apex_ipv4: true,
                apex_ipv6: true,
                www_alias: true,
            }),
            vec![zone_id.clone(), distribution_id.clone()],
        ),
    ];

    if declaration.register {
        let registration_id = ResourceId::new(&slug, ResourceRole::Registration);
        nodes.push(node(
            &registration_id,
            ResourceSpec::Registration(RegistrationSpec {
                domain_name: domain.clone(),
            }),
            vec![zone_id.clone()],
        ));
    }

    debug!(
        domain = %domain,
        environment = %tuple.environment,
        resources = nodes.len(),
        "bundle instantiated"
    );

    ResourceBundle { nodes }
}

/// Instantiate every catalog entry concurrently and merge into one graph
///
/// Instantiation is pure, so tasks share nothing; the merge re-checks
/// identifier uniqueness as a belt against template bugs.
pub async fn instantiate_all(entries: &[CatalogEntry], base: &BaseTags) -> Result<ResourceGraph> {
    let handles: Vec<_> = entries
        .iter()
        .map(|entry| {
            let entry = entry.clone();
            let base = base.clone();
            tokio::spawn(async move { instantiate(&entry, &base) })
        })
        .collect();

    let mut graph = ResourceGraph::new();
    for result in futures::future::join_all(handles).await {
        let bundle = result
            .map_err(|e| crate::Error::internal("bundle", format!("instantiation task failed: {e}")))?;
        for node in bundle.nodes {
            graph.insert(node)?;
        }
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, DomainDeclaration, DomainTuple};

    fn base() -> BaseTags {
        BaseTags {
            project: "static-websites".to_string(),
            repository: "acme/sites".to_string(),
            owner: "platform".to_string(),
            deployer: "ci".to_string(),
            deployment_id: "run-1".to_string(),
        }
    }

    fn entry(domain: &str, register: bool, typos: Vec<&str>) -> CatalogEntry {
        CatalogEntry {
            tuple: DomainTuple::new(domain, "production"),
            declaration: DomainDeclaration {
                domain: domain.to_string(),
                register,
                typos: typos.into_iter().map(String::from).collect(),
            },
        }
    }

    fn find<'a>(bundle: &'a ResourceBundle, role: ResourceRole) -> &'a ResourceNode {
        bundle
            .nodes
            .iter()
            .find(|n| n.role() == role)
            .unwrap_or_else(|| panic!("bundle missing {role}"))
    }

    #[test]
    fn test_instantiate_is_deterministic() {
        let e = entry("example.com", true, vec!["exmaple.com"]);
        assert_eq!(instantiate(&e, &base()), instantiate(&e, &base()));
    }

    #[test]
    fn test_names_derive_from_safe_name_and_environment() {
        let bundle = instantiate(&entry("example.com", false, vec![]), &base());

        let storage = find(&bundle, ResourceRole::Storage);
        let ResourceSpec::Storage(spec) = &storage.spec else {
            panic!("expected storage spec");
        };
        assert_eq!(spec.name, "example-com-production");
        assert_eq!(storage.id.as_str(), "example-com-production/storage");

        let policy = find(&bundle, ResourceRole::AccessPolicy);
        let ResourceSpec::AccessPolicy(spec) = &policy.spec else {
            panic!("expected policy spec");
        };
        assert_eq!(spec.name, "example-com-production-origin-read");
    }

    #[test]
    fn test_dependency_edges_match_the_bundle_shape() {
        let bundle = instantiate(&entry("example.com", true, vec![]), &base());
        let slug = "example-com-production";

        let id = |role: ResourceRole| ResourceId::new(slug, role);

        assert!(find(&bundle, ResourceRole::Storage).depends_on.is_empty());
        assert!(find(&bundle, ResourceRole::DnsZone).depends_on.is_empty());
        assert_eq!(
            find(&bundle, ResourceRole::Certificate).depends_on,
            vec![id(ResourceRole::DnsZone)]
        );
        assert_eq!(
            find(&bundle, ResourceRole::Distribution).depends_on,
            vec![id(ResourceRole::Storage), id(ResourceRole::Certificate)]
        );
        assert_eq!(
            find(&bundle, ResourceRole::AccessPolicy).depends_on,
            vec![id(ResourceRole::Storage), id(ResourceRole::Distribution)]
        );
        assert_eq!(
            find(&bundle, ResourceRole::AliasRecords).depends_on,
            vec![id(ResourceRole::DnsZone), id(ResourceRole::Distribution)]
        );
        assert_eq!(
            find(&bundle, ResourceRole::Registration).depends_on,
            vec![id(ResourceRole::DnsZone)]
        );
    }

    #[test]
    fn test_certificate_covers_apex_www_and_typos() {
        let bundle = instantiate(&entry("example.com", false, vec!["exmaple.com"]), &base());

        let cert = find(&bundle, ResourceRole::Certificate);
        let ResourceSpec::Certificate(spec) = &cert.spec else {
            panic!("expected certificate spec");
        };
        assert_eq!(spec.primary_name, "example.com");
        assert_eq!(
            spec.subject_alternative_names,
            vec!["www.example.com", "exmaple.com", "www.exmaple.com"]
        );
        // A retry after a partial run must be able to rewrite stale
        // validation records from an earlier generation attempt
        assert!(spec.overwrite_validation_records);
    }

    #[test]
    fn test_distribution_policies_and_aliases() {
        let bundle = instantiate(&entry("example.com", false, vec!["exmaple.com"]), &base());

        let dist = find(&bundle, ResourceRole::Distribution);
        let ResourceSpec::Distribution(spec) = &dist.spec else {
            panic!("expected distribution spec");
        };

        assert_eq!(
            spec.aliases,
            vec![
                "example.com",
                "www.example.com",
                "exmaple.com",
                "www.exmaple.com"
            ]
        );
        assert_eq!(spec.default_root_object, "index.html");
        assert_eq!(spec.price_class, PriceClass::Reduced);
        assert!(spec.cache.compress);

        // Both origin errors collapse to the same client-visible page
        assert_eq!(spec.error_responses.len(), 2);
        for mapping in &spec.error_responses {
            assert_eq!(mapping.response_status, 404);
            assert_eq!(mapping.response_page, "/404.html");
        }

        assert_eq!(spec.router.canonical_host, "example.com");
        assert_eq!(
            spec.router.typo_hosts.get("exmaple.com"),
            Some(&"example.com".to_string())
        );
    }

    #[test]
    fn test_registration_is_optional() {
        let without = instantiate(&entry("example.com", false, vec![]), &base());
        assert!(without
            .nodes
            .iter()
            .all(|n| n.role() != ResourceRole::Registration));
        assert_eq!(without.nodes.len(), 6);

        let with = instantiate(&entry("example.com", true, vec![]), &base());
        assert_eq!(with.nodes.len(), 7);
    }

    #[test]
    fn test_base_tags_win_on_conflict() {
        let mut resource = Tags::new();
        resource.insert("role".to_string(), "storage".to_string());
        resource.insert("owner".to_string(), "someone-else".to_string());

        let base_tags = base().for_environment("production");
        let merged = merge_tags(&base_tags, &resource);

        // Resource-specific key survives, base key wins the conflict
        assert_eq!(merged.get("role"), Some(&"storage".to_string()));
        assert_eq!(merged.get("owner"), Some(&"platform".to_string()));
        assert_eq!(merged.get("managed-by"), Some(&"stratus".to_string()));
    }

    #[test]
    fn test_every_node_carries_the_full_tag_set() {
        let bundle = instantiate(&entry("example.com", true, vec![]), &base());
        for node in &bundle.nodes {
            assert_eq!(node.tags.get("domain"), Some(&"example.com".to_string()));
            assert_eq!(node.tags.get("environment"), Some(&"production".to_string()));
            assert_eq!(node.tags.get("deployment-id"), Some(&"run-1".to_string()));
            assert_eq!(
                node.tags.get("role"),
                Some(&node.role().as_str().to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_instantiate_all_merges_independent_tuples() {
        let entries = vec![
            entry("alpha.com", false, vec![]),
            entry("beta.org", true, vec![]),
        ];

        let graph = instantiate_all(&entries, &base()).await.unwrap();
        assert_eq!(graph.len(), 13);
        let domains = graph.domains();
        assert!(domains.contains("alpha.com"));
        assert!(domains.contains("beta.org"));
    }
}
