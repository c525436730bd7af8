//! Filesystem catalog source
//!
//! Reads the two-level `{domain}/{environment}` declaration layout:
//!
//! ```text
//! domains/
//!   example.com/
//!     production/
//!       domain.yaml
//!     staging/
//!       domain.yaml
//!   other.org/
//!     production/
//!       domain.yaml
//! ```
//!
//! Presence of `domain.yaml` is the sole membership trigger. Anything that
//! does not fit the layout is a fatal catalog error rather than being
//! skipped, so a typo in the tree cannot silently drop a domain.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{validate_entries, CatalogEntry, CatalogSource, DomainDeclaration, DomainTuple};
use crate::{Error, Result};

/// File name of a domain declaration
pub const DECLARATION_FILE_NAME: &str = "domain.yaml";

/// Catalog source scanning a declaration root on disk
pub struct FilesystemCatalog {
    root: PathBuf,
}

impl FilesystemCatalog {
    /// Create a catalog over the given declaration root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The declaration root this catalog scans
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_declaration(&self, path: &Path, domain_dir: &str) -> Result<DomainDeclaration> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::catalog_at(path, format!("failed to read declaration: {e}")))?;
        let declaration: DomainDeclaration = serde_yaml::from_str(&content)
            .map_err(|e| Error::catalog_at(path, format!("invalid declaration: {e}")))?;

        // The directory name is authoritative for discovery; a mismatched
        // declaration almost always means a copy-paste error.
        if declaration.domain != domain_dir {
            return Err(Error::catalog_at(
                path,
                format!(
                    "declaration names '{}' but lives under '{}'",
                    declaration.domain, domain_dir
                ),
            ));
        }

        Ok(declaration)
    }

    fn dir_entries(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let reader = std::fs::read_dir(dir)
            .map_err(|e| Error::catalog_at(dir, format!("failed to read directory: {e}")))?;
        for entry in reader {
            let entry =
                entry.map_err(|e| Error::catalog_at(dir, format!("failed to read entry: {e}")))?;
            paths.push(entry.path());
        }
        // Deterministic scan order regardless of filesystem iteration order
        paths.sort();
        Ok(paths)
    }
}

impl CatalogSource for FilesystemCatalog {
    fn scan(&self) -> Result<Vec<CatalogEntry>> {
        if !self.root.is_dir() {
            return Err(Error::catalog_at(
                &self.root,
                "declaration root does not exist or is not a directory",
            ));
        }

        let mut entries = Vec::new();

        for domain_path in self.dir_entries(&self.root)? {
            let Some(domain_dir) = file_name(&domain_path) else {
                continue;
            };
            if !domain_path.is_dir() {
                return Err(Error::catalog_at(
                    &domain_path,
                    "expected a domain directory at the first level",
                ));
            }

            for env_path in self.dir_entries(&domain_path)? {
                let Some(environment) = file_name(&env_path) else {
                    continue;
                };
                if !env_path.is_dir() {
                    return Err(Error::catalog_at(
                        &env_path,
                        "expected an environment directory at the second level",
                    ));
                }

                let declaration_path = env_path.join(DECLARATION_FILE_NAME);
                if !declaration_path.is_file() {
                    // An environment directory without a declaration is not
                    // a member, but an unexpected file tree is an error.
                    debug!(path = %env_path.display(), "no declaration file, skipping");
                    continue;
                }

                let declaration = self.read_declaration(&declaration_path, &domain_dir)?;
                entries.push(CatalogEntry {
                    tuple: DomainTuple::new(&declaration.domain, &environment),
                    declaration,
                });
            }
        }

        entries.sort_by(|a, b| a.tuple.cmp(&b.tuple));
        validate_entries(&entries)?;

        debug!(
            root = %self.root.display(),
            count = entries.len(),
            "catalog scan complete"
        );
        Ok(entries)
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
