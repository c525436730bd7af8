//! Error types for the Stratus engine
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant includes contextual information like domain names, resource
//! identifiers, and underlying causes. Every error is fatal to the run that
//! encountered it: the engine never retries a failed operation on its own,
//! and re-invocation resumes from recorded state.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for Stratus operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or duplicate domain declaration; no partial catalog is processed
    #[error("catalog error: {message}")]
    Catalog {
        /// Path of the offending declaration, when known
        path: Option<PathBuf>,
        /// Description of what's wrong
        message: String,
    },

    /// Certificate DNS validation did not complete within the bounded wait
    #[error("certificate validation for {domain} timed out after {waited_secs}s")]
    ValidationTimeout {
        /// Domain whose certificate was being validated
        domain: String,
        /// Resource identifier of the certificate
        resource: String,
        /// Seconds waited before giving up
        waited_secs: u64,
    },

    /// The convergence lock could not be acquired within the bounded retry window
    #[error("convergence lock for {key} is held by {holder}")]
    LockContention {
        /// State key the lock protects
        key: String,
        /// Identity currently holding the lock
        holder: String,
    },

    /// A target resource already exists outside recorded state; requires manual
    /// reconciliation or import
    #[error("resource conflict for {resource}: {message}")]
    ResourceConflict {
        /// Resource identifier that conflicted
        resource: String,
        /// Description of the conflict
        message: String,
    },

    /// Domain registration request was denied by the registrar
    #[error("registration rejected for {domain}: {message}")]
    RegistrationRejected {
        /// Domain whose registration was rejected
        domain: String,
        /// Registrar-supplied reason
        message: String,
    },

    /// State or lock storage is unreachable; nothing proceeds
    #[error("state backend unavailable: {message}")]
    BackendUnavailable {
        /// Description of what failed
        message: String,
    },

    /// Cloud provider operation error
    #[error("provider error for {resource}: {message}")]
    Provider {
        /// Resource identifier the operation targeted
        resource: String,
        /// Description of what failed
        message: String,
        /// Whether re-invoking the run may succeed
        retryable: bool,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Context where the error occurred (e.g., "planner", "publisher")
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a catalog error without a declaration path
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog {
            path: None,
            message: msg.into(),
        }
    }

    /// Create a catalog error for a specific declaration path
    pub fn catalog_at(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Catalog {
            path: Some(path.into()),
            message: msg.into(),
        }
    }

    /// Create a validation timeout error for a certificate resource
    pub fn validation_timeout(
        domain: impl Into<String>,
        resource: impl Into<String>,
        waited_secs: u64,
    ) -> Self {
        Self::ValidationTimeout {
            domain: domain.into(),
            resource: resource.into(),
            waited_secs,
        }
    }

    /// Create a lock contention error
    pub fn lock_contention(key: impl Into<String>, holder: impl Into<String>) -> Self {
        Self::LockContention {
            key: key.into(),
            holder: holder.into(),
        }
    }

    /// Create a resource conflict error
    pub fn conflict(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ResourceConflict {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a registration rejection error
    pub fn registration_rejected(domain: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::RegistrationRejected {
            domain: domain.into(),
            message: msg.into(),
        }
    }

    /// Create a backend unavailable error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: msg.into(),
        }
    }

    /// Create a retryable provider error
    pub fn provider(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            resource: resource.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable provider error (e.g., configuration error)
    pub fn provider_permanent(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            resource: resource.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Check if re-invoking the run may clear this error
    ///
    /// Catalog, conflict, and registration errors require operator action
    /// first. Lock contention and backend outages are expected to clear on
    /// their own; a validation timeout is worth one more run but is reported
    /// as non-retryable because the most common cause is missing registrar
    /// delegation, which only an operator can fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Catalog { .. } => false,
            Error::ValidationTimeout { .. } => false,
            Error::LockContention { .. } => true,
            Error::ResourceConflict { .. } => false,
            Error::RegistrationRejected { .. } => false,
            Error::BackendUnavailable { .. } => true,
            Error::Provider { retryable, .. } => *retryable,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the domain name if this error is scoped to a single domain
    pub fn domain(&self) -> Option<&str> {
        match self {
            Error::ValidationTimeout { domain, .. } => Some(domain),
            Error::RegistrationRejected { domain, .. } => Some(domain),
            _ => None,
        }
    }
}
