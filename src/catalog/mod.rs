//! Domain catalog
//!
//! The catalog turns a set of per-domain declarations into an ordered,
//! deduplicated set of `(domain, environment)` tuples with derived naming.
//! Discovery is behind the [`CatalogSource`] trait so the source is
//! swappable: the filesystem layout used in production, or an embedded list
//! for tests and tooling.
//!
//! The catalog is not a garbage collector: removing a declaration stops
//! Stratus from managing that tuple, but never deletes its resources.
//! Teardown is always an explicit destroy.

mod filesystem;

pub use filesystem::{FilesystemCatalog, DECLARATION_FILE_NAME};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One `(domain, environment)` pair managed as a unit
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainTuple {
    /// Fully qualified domain name (e.g., "example.com")
    pub domain_name: String,
    /// Environment name (e.g., "production")
    pub environment: String,
    /// Domain name with dots replaced by hyphens, safe for resource naming
    pub safe_name: String,
}

impl DomainTuple {
    /// Build a tuple from a domain name and environment, deriving `safe_name`
    pub fn new(domain_name: impl Into<String>, environment: impl Into<String>) -> Self {
        let domain_name = domain_name.into();
        let safe_name = safe_name(&domain_name);
        Self {
            domain_name,
            environment: environment.into(),
            safe_name,
        }
    }

    /// Stable slug combining safe name and environment, used as a resource
    /// name prefix
    pub fn slug(&self) -> String {
        format!("{}-{}", self.safe_name, self.environment)
    }
}

/// Contents of a single domain declaration file
///
/// Presence of the file is the sole membership trigger; the declaration
/// supplies the domain name and two optional knobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDeclaration {
    /// Fully qualified domain name; must match the declaration's directory
    pub domain: String,
    /// Whether to provision a registrar-level registration record
    #[serde(default)]
    pub register: bool,
    /// Mistaken spellings served by this domain's distribution and
    /// redirected to the canonical host by the edge router
    #[serde(default)]
    pub typos: Vec<String>,
}

/// A declaration paired with its derived tuple
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// The derived `(domain, environment)` tuple
    pub tuple: DomainTuple,
    /// The declaration as authored
    pub declaration: DomainDeclaration,
}

/// Source of domain declarations
///
/// Implementations must be deterministic: identical inputs always yield an
/// identical entry set (sorted by domain then environment).
pub trait CatalogSource: Send + Sync {
    /// Scan the source and return all declared entries
    ///
    /// Fails with a catalog error if any declaration is malformed or if two
    /// declarations collide after safe-name normalization; no partial
    /// catalog is ever returned.
    fn scan(&self) -> Result<Vec<CatalogEntry>>;
}

/// Embedded catalog backed by a fixed list of entries
///
/// Used by tests and tooling that need a catalog without filesystem
/// fixtures. Runs the same validation as the filesystem source.
pub struct StaticCatalog {
    entries: Vec<CatalogEntry>,
}

impl StaticCatalog {
    /// Create a static catalog from declarations and their environments
    pub fn new(declarations: Vec<(DomainDeclaration, String)>) -> Self {
        let entries = declarations
            .into_iter()
            .map(|(declaration, environment)| CatalogEntry {
                tuple: DomainTuple::new(&declaration.domain, environment),
                declaration,
            })
            .collect();
        Self { entries }
    }
}

impl CatalogSource for StaticCatalog {
    fn scan(&self) -> Result<Vec<CatalogEntry>> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| a.tuple.cmp(&b.tuple));
        validate_entries(&entries)?;
        Ok(entries)
    }
}

/// Derive the identifier-safe form of a domain name
///
/// Dots are structural separators in DNS but not valid in most resource
/// identifiers, so they are replaced with hyphens. Distinct domains can
/// normalize to the same safe name; [`validate_entries`] rejects that.
pub fn safe_name(domain: &str) -> String {
    domain.replace('.', "-")
}

/// Validate a domain name as declarable
///
/// Accepts lowercase ASCII labels of letters, digits, and hyphens joined by
/// dots. At least two labels are required; hyphens may not lead or trail a
/// label.
pub fn validate_domain_name(domain: &str) -> Result<()> {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(Error::catalog(format!(
            "domain '{domain}' must contain at least two labels"
        )));
    }
    for label in labels {
        if label.is_empty() {
            return Err(Error::catalog(format!("domain '{domain}' has an empty label")));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::catalog(format!(
                "domain '{domain}' has a label with a leading or trailing hyphen"
            )));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(Error::catalog(format!(
                "domain '{domain}' contains characters outside [a-z0-9-.]"
            )));
        }
    }
    Ok(())
}

/// Reject duplicate tuples and safe-name collisions
///
/// Both `(domain, environment)` and `(safe_name, environment)` must be
/// unique across the catalog. A collision is a fatal configuration error:
/// two distinct domains mapping to the same safe name would produce
/// identically named resources.
pub fn validate_entries(entries: &[CatalogEntry]) -> Result<()> {
    let mut by_tuple: BTreeMap<(&str, &str), &CatalogEntry> = BTreeMap::new();
    let mut by_safe: BTreeMap<(&str, &str), &CatalogEntry> = BTreeMap::new();

    for entry in entries {
        validate_domain_name(&entry.tuple.domain_name)?;

        let tuple_key = (
            entry.tuple.domain_name.as_str(),
            entry.tuple.environment.as_str(),
        );
        if by_tuple.insert(tuple_key, entry).is_some() {
            return Err(Error::catalog(format!(
                "duplicate declaration for {} in environment {}",
                entry.tuple.domain_name, entry.tuple.environment
            )));
        }

        let safe_key = (
            entry.tuple.safe_name.as_str(),
            entry.tuple.environment.as_str(),
        );
        if let Some(existing) = by_safe.insert(safe_key, entry) {
            return Err(Error::catalog(format!(
                "safe name '{}' derived from both '{}' and '{}'",
                entry.tuple.safe_name, existing.tuple.domain_name, entry.tuple.domain_name
            )));
        }

        for typo in &entry.declaration.typos {
            validate_domain_name(typo)?;
            if typo == &entry.tuple.domain_name {
                return Err(Error::catalog(format!(
                    "typo list for {} contains the canonical domain itself",
                    entry.tuple.domain_name
                )));
            }
        }
    }

    Ok(())
}
