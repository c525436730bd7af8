//! Edge request router
//!
//! A pure rewriting function evaluated once per inbound request at the CDN
//! edge, before the origin fetch. The function is shipped to the CDN as an
//! artifact rendered into the distribution spec; the engine never invokes
//! it at deploy time.
//!
//! Rules are evaluated strictly in order, first match wins:
//!
//! 1. Typo host (including its `www.` form) redirects straight to the
//!    canonical host in a single hop.
//! 2. A `www.` prefix on any other host is stripped with a redirect.
//! 3. Directory paths are rewritten to the default document.
//!
//! Directory rewriting therefore only ever sees requests that already carry
//! the canonical host, and the function is idempotent: applying it to its
//! own output is a no-op.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Document appended when a request names a directory
pub const DEFAULT_DOCUMENT: &str = "index.html";

/// HTTP status used for every router-issued redirect
pub const REDIRECT_STATUS: u16 = 301;

/// Alias prefix treated as non-canonical
const WWW_PREFIX: &str = "www.";

/// Configuration rendered into the edge artifact for one distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// The single authoritative hostname for this distribution
    pub canonical_host: String,
    /// Mistaken spellings mapped to the canonical host they redirect to
    pub typo_hosts: BTreeMap<String, String>,
    /// Document appended to directory requests
    pub default_document: String,
}

impl RouterConfig {
    /// Build a config for a canonical host with the given typo spellings
    pub fn new(canonical_host: impl Into<String>, typos: &[String]) -> Self {
        let canonical_host = canonical_host.into();
        let typo_hosts = typos
            .iter()
            .map(|t| (t.clone(), canonical_host.clone()))
            .collect();
        Self {
            canonical_host,
            typo_hosts,
            default_document: DEFAULT_DOCUMENT.to_string(),
        }
    }
}

/// An inbound request as seen at the edge
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRequest {
    /// Request host header
    pub host: String,
    /// Request path, always beginning with `/`
    pub path: String,
}

impl EdgeRequest {
    /// Convenience constructor
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }
}

/// Outcome of evaluating the router against one request
#[derive(Debug, Clone, PartialEq)]
pub enum RouteAction {
    /// Respond immediately with a redirect; no origin fetch
    Redirect {
        /// Redirect status code (always 301)
        status: u16,
        /// Absolute target URL
        location: String,
    },
    /// Pass the request through to the origin with a possibly-rewritten path
    Forward {
        /// Path to fetch from the origin
        path: String,
    },
}

/// Evaluate the routing rules against one request
pub fn route(config: &RouterConfig, request: &EdgeRequest) -> RouteAction {
    // Rule 1: typo host, matched with and without the www prefix so a
    // mistyped www variant reaches the canonical apex in one hop.
    let bare_host = request.host.strip_prefix(WWW_PREFIX).unwrap_or(&request.host);
    if let Some(canonical) = config
        .typo_hosts
        .get(request.host.as_str())
        .or_else(|| config.typo_hosts.get(bare_host))
    {
        return RouteAction::Redirect {
            status: REDIRECT_STATUS,
            location: format!("https://{}{}", canonical, request.path),
        };
    }

    // Rule 2: strip the non-canonical alias prefix.
    if let Some(stripped) = request.host.strip_prefix(WWW_PREFIX) {
        return RouteAction::Redirect {
            status: REDIRECT_STATUS,
            location: format!("https://{}{}", stripped, request.path),
        };
    }

    // Rule 3: directory rewrite. A path with an extension separator is
    // never touched.
    let path = if request.path.ends_with('/') {
        format!("{}{}", request.path, config.default_document)
    } else if !request.path.contains('.') {
        format!("{}/{}", request.path, config.default_document)
    } else {
        request.path.clone()
    };

    RouteAction::Forward { path }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RouterConfig {
        RouterConfig::new(
            "canonical-domain.com",
            &["typo-domain.com".to_string(), "typo-domain.net".to_string()],
        )
    }

    #[test]
    fn test_typo_host_redirects_to_canonical() {
        let action = route(&config(), &EdgeRequest::new("typo-domain.com", "/x"));
        assert_eq!(
            action,
            RouteAction::Redirect {
                status: 301,
                location: "https://canonical-domain.com/x".to_string(),
            }
        );
    }

    #[test]
    fn test_www_typo_host_redirects_in_one_hop() {
        // A mistyped www variant must not bounce through the bare typo host
        let action = route(&config(), &EdgeRequest::new("www.typo-domain.com", "/x"));
        assert_eq!(
            action,
            RouteAction::Redirect {
                status: 301,
                location: "https://canonical-domain.com/x".to_string(),
            }
        );
    }

    #[test]
    fn test_www_canonical_host_is_stripped() {
        let action = route(
            &config(),
            &EdgeRequest::new("www.canonical-domain.com", "/about"),
        );
        assert_eq!(
            action,
            RouteAction::Redirect {
                status: 301,
                location: "https://canonical-domain.com/about".to_string(),
            }
        );
    }

    #[test]
    fn test_trailing_slash_appends_default_document() {
        let action = route(&config(), &EdgeRequest::new("canonical-domain.com", "/blog/"));
        assert_eq!(
            action,
            RouteAction::Forward {
                path: "/blog/index.html".to_string(),
            }
        );
    }

    #[test]
    fn test_extensionless_path_gets_directory_treatment() {
        let action = route(&config(), &EdgeRequest::new("canonical-domain.com", "/blog"));
        assert_eq!(
            action,
            RouteAction::Forward {
                path: "/blog/index.html".to_string(),
            }
        );
    }

    #[test]
    fn test_path_with_extension_is_untouched() {
        let action = route(
            &config(),
            &EdgeRequest::new("canonical-domain.com", "/robots.txt"),
        );
        assert_eq!(
            action,
            RouteAction::Forward {
                path: "/robots.txt".to_string(),
            }
        );
    }

    #[test]
    fn test_root_path_serves_default_document() {
        let action = route(&config(), &EdgeRequest::new("canonical-domain.com", "/"));
        assert_eq!(
            action,
            RouteAction::Forward {
                path: "/index.html".to_string(),
            }
        );
    }

    #[test]
    fn test_route_is_idempotent_on_its_own_output() {
        let cfg = config();
        let first = route(&cfg, &EdgeRequest::new("canonical-domain.com", "/blog/"));
        let RouteAction::Forward { path } = first.clone() else {
            panic!("expected forward");
        };

        let second = route(&cfg, &EdgeRequest::new("canonical-domain.com", &path));
        assert_eq!(first, second);
    }

    #[test]
    fn test_typo_redirect_preserves_original_path() {
        let action = route(
            &config(),
            &EdgeRequest::new("typo-domain.net", "/deep/path/page.html"),
        );
        assert_eq!(
            action,
            RouteAction::Redirect {
                status: 301,
                location: "https://canonical-domain.com/deep/path/page.html".to_string(),
            }
        );
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let cfg = config();
        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: RouterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, parsed);
    }
}
