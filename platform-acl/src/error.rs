//! Error types for access-control operations
//!
//! This module defines the errors raised while building the access tables
//! and while resolving a user's group memberships. A missing rule is never
//! an error: it is a plain deny.

use thiserror::Error;

use crate::ids::{ResourceId, RoleId};

/// Errors reported by the group-membership collaborator.
///
/// The engine never turns these into an allow or a deny; they are surfaced
/// to the caller, who owns the fail-open/fail-closed policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    /// The backing store could not be reached
    #[error("Membership store unavailable: {0}")]
    Unavailable(String),

    /// The lookup was cancelled before it completed
    #[error("Membership lookup cancelled")]
    Cancelled,

    /// Any other backend failure
    #[error("Membership backend error: {0}")]
    Backend(String),
}

/// Access-control error types.
#[derive(Debug, Error)]
pub enum AclError {
    /// Action catalog missing or malformed
    #[error("Failed to load action catalog `{source_name}`: {message}")]
    CatalogLoad {
        /// Where the catalog was read from (file path or source label)
        source_name: String,
        /// What went wrong
        message: String,
    },

    /// Group data references an unresolvable parent, repeats an id, or loops
    #[error("Malformed role hierarchy: {0}")]
    MalformedHierarchy(String),

    /// Lookup of a role id that was never registered
    #[error("Unknown role `{0}`")]
    UnknownRole(RoleId),

    /// Rule payload could not be decoded into action grants
    #[error("Malformed rule for resource `{resource}`: {message}")]
    MalformedRule {
        /// Resource named by the rule record
        resource: ResourceId,
        /// What went wrong
        message: String,
    },

    /// Group membership lookup failed
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// Group or rule store failed while the tables were being built
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Invalid configuration value for {key}: {message}")]
    Config {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// A process-wide engine was already installed
    #[error("Access-control engine already installed")]
    AlreadyInstalled,

    /// No process-wide engine has been installed
    #[error("Access-control engine not installed")]
    NotInstalled,
}

/// Result type for access-control operations.
pub type AclResult<T> = Result<T, AclError>;

impl AclError {
    /// Check if this error points at inconsistent group or rule data rather
    /// than an infrastructure failure.
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            AclError::MalformedHierarchy(_) | AclError::UnknownRole(_) | AclError::MalformedRule { .. }
        )
    }

    /// Check if this error happened while building the tables.
    ///
    /// Construction errors are fatal: no partial engine is ever handed out.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            AclError::CatalogLoad { .. }
                | AclError::MalformedHierarchy(_)
                | AclError::MalformedRule { .. }
                | AclError::Store(_)
        )
    }

    /// Get error code for API responses and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            AclError::CatalogLoad { .. } => "CATALOG_LOAD",
            AclError::MalformedHierarchy(_) => "MALFORMED_HIERARCHY",
            AclError::UnknownRole(_) => "UNKNOWN_ROLE",
            AclError::MalformedRule { .. } => "MALFORMED_RULE",
            AclError::Resolver(ResolverError::Cancelled) => "RESOLVER_CANCELLED",
            AclError::Resolver(_) => "RESOLVER_ERROR",
            AclError::Store(_) => "STORE_ERROR",
            AclError::Config { .. } => "CONFIG_ERROR",
            AclError::AlreadyInstalled => "ALREADY_INSTALLED",
            AclError::NotInstalled => "NOT_INSTALLED",
        }
    }
}
