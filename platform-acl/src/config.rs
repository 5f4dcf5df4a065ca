//! Engine configuration.
//!
//! Loaded from environment variables with defaults suitable for local
//! development, the same way the platform service clients are configured.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AclError, AclResult};
use crate::ids::{ActionId, ResourceId, RoleId};

/// Resource of the superuser rule.
pub const SUPERUSER_RESOURCE: &str = "app";

/// Action of the superuser rule.
pub const SUPERUSER_ACTION: &str = "admin";

/// Access-control engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AclConfig {
    /// Role used for anonymous callers and users without any membership.
    pub guest_role: RoleId,

    /// How long resolved memberships are cached per user. Zero disables
    /// the cache. Serialized as (possibly fractional) seconds.
    #[serde(rename = "membership_cache_ttl_secs", with = "ttl_secs")]
    pub membership_cache_ttl: Duration,

    /// Optional path to a JSON action catalog.
    pub catalog_path: Option<PathBuf>,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            guest_role: RoleId::from("1"),
            membership_cache_ttl: Duration::ZERO,
            catalog_path: None,
        }
    }
}

impl AclConfig {
    /// Create a configuration with the given guest role and defaults otherwise.
    pub fn with_guest_role(guest_role: impl Into<RoleId>) -> Self {
        Self {
            guest_role: guest_role.into(),
            ..Self::default()
        }
    }

    /// Set the membership cache TTL. Sub-second values are kept as is.
    pub fn membership_cache_ttl(mut self, ttl: Duration) -> Self {
        self.membership_cache_ttl = ttl;
        self
    }

    /// Set the JSON catalog path.
    pub fn catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    /// Load configuration from environment variables, falling back to the
    /// default for anything missing or unparsable.
    ///
    /// Environment variables:
    /// - `ACL_GUEST_ROLE`: Role id for anonymous callers (default: 1)
    /// - `ACL_MEMBERSHIP_CACHE_TTL_SECS`: Membership cache TTL (default: 0, disabled)
    /// - `ACL_CATALOG_PATH`: Path to the JSON action catalog
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            guest_role: std::env::var("ACL_GUEST_ROLE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(RoleId::from)
                .unwrap_or(default.guest_role),
            membership_cache_ttl: std::env::var("ACL_MEMBERSHIP_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.membership_cache_ttl),
            catalog_path: std::env::var("ACL_CATALOG_PATH").ok().map(PathBuf::from),
        }
    }

    /// Load configuration from environment variables, rejecting values that
    /// are present but invalid.
    pub fn try_from_env() -> AclResult<Self> {
        let mut config = Self::from_env();

        if let Ok(raw) = std::env::var("ACL_MEMBERSHIP_CACHE_TTL_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| AclError::Config {
                key: "ACL_MEMBERSHIP_CACHE_TTL_SECS".to_string(),
                message: format!("expected a whole number of seconds, got `{raw}`"),
            })?;
            config.membership_cache_ttl = Duration::from_secs(secs);
        }

        if let Ok(raw) = std::env::var("ACL_GUEST_ROLE") {
            if raw.trim().is_empty() {
                return Err(AclError::Config {
                    key: "ACL_GUEST_ROLE".to_string(),
                    message: "guest role id must not be empty".to_string(),
                });
            }
        }

        Ok(config)
    }

    /// Membership cache TTL, or `None` when caching is disabled.
    pub fn cache_ttl(&self) -> Option<Duration> {
        (!self.membership_cache_ttl.is_zero()).then_some(self.membership_cache_ttl)
    }

    /// The fixed (resource, action) pair whose grant bypasses every other check.
    pub fn superuser_rule() -> (ResourceId, ActionId) {
        (ResourceId::from(SUPERUSER_RESOURCE), ActionId::from(SUPERUSER_ACTION))
    }
}

mod ttl_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if ttl.subsec_nanos() == 0 {
            serializer.serialize_u64(ttl.as_secs())
        } else {
            serializer.serialize_f64(ttl.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}
