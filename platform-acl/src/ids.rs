//! # Identifiers
//!
//! String newtypes for roles, users, resources and actions.
//! All comparisons are exact: no case folding, no prefix matching.

use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from anything string-like.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the identifier, returning the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a role (a user group).
    ///
    /// Group tables are often integer keyed; integers convert through their
    /// decimal form so `RoleId::from(2u64) == RoleId::from("2")`.
    ///
    /// # Example
    ///
    /// ```
    /// use platform_acl::RoleId;
    ///
    /// assert_eq!(RoleId::from(2u64), RoleId::from("2"));
    /// assert_eq!(RoleId::from(2u64).as_str(), "2");
    /// ```
    RoleId
);

string_id!(
    /// Identifier of a user, supplied by the host's session layer.
    UserId
);

string_id!(
    /// Identifier of a protected resource (a catalog section).
    ResourceId
);

string_id!(
    /// Identifier of an action, scoped to one resource.
    ActionId
);

impl RoleId {
    /// Whether this id is the "no parent" marker used by group tables
    /// (`0` for integer keys, or an empty string).
    pub fn is_root_marker(&self) -> bool {
        self.0.is_empty() || self.0 == "0"
    }
}

impl From<u64> for RoleId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for RoleId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u32> for RoleId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for RoleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => RoleId(s),
            Raw::Signed(n) => RoleId::from(n),
            Raw::Unsigned(n) => RoleId::from(n),
        })
    }
}

macro_rules! plain_deserialize {
    ($($name:ident),*) => {
        $(
            impl<'de> Deserialize<'de> for $name {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: Deserializer<'de>,
                {
                    String::deserialize(deserializer).map($name)
                }
            }
        )*
    };
}

plain_deserialize!(UserId, ResourceId, ActionId);
