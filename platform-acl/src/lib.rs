//! # Platform ACL (Hierarchical Group Access Control)
//!
//! This crate decides whether a principal (a user or one of its groups) may
//! perform an action on a protected resource of a host application.
//!
//! ## Overview
//!
//! The platform-acl crate handles:
//! - **Roles**: A forest of user groups built from flat `(id, parent_id)` records
//! - **Resources**: Protected sections declared by an action catalog
//! - **Rules**: Per resource and action, the set of groups granted access
//! - **Decisions**: Single-role checks, and user checks that OR across every
//!   group the user belongs to
//!
//! ## Architecture
//!
//! ```text
//! CatalogSource ──► ResourceCatalog ─┐
//! GroupStore ─────► RoleHierarchy ───┼──► RuleTable ──► AclTables
//! RuleStore ───────────────────────────┘                    │
//! GroupStore ─────► MembershipResolver ──► AggregateRole ───┴──► AclEngine
//! ```
//!
//! ## Decision Rules
//!
//! - A group that is granted `app:admin` is allowed everything (superuser bypass)
//! - Otherwise a user is allowed iff at least one of its groups is granted the action
//! - Anonymous callers and users without groups are evaluated as the guest group
//! - No rule, unknown resource or unknown action: denied
//! - Groups inherit nothing from their parents; grants are explicit
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use platform_acl::{AclConfig, AclEngine, ActionId, MemoryStore, ResourceId, UserId};
//!
//! # async fn example() -> platform_acl::AclResult<()> {
//! let store = Arc::new(MemoryStore::new());
//! let engine = AclEngine::from_memory(AclConfig::from_env(), store);
//! engine.preload().await?;
//!
//! let user = UserId::from("42");
//! let allowed = engine
//!     .is_allowed_for_user(Some(&user), &ResourceId::from("blog"), &ActionId::from("publish"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod global;
pub mod hierarchy;
pub mod ids;
pub mod membership;
pub mod rules;
pub mod store;

// Re-export main types for convenience
pub use catalog::{JsonCatalog, Resource, ResourceCatalog};
pub use config::{AclConfig, SUPERUSER_ACTION, SUPERUSER_RESOURCE};
pub use engine::{AclEngine, AclTables, Decision};
pub use error::{AclError, AclResult, ResolverError};
pub use hierarchy::{Role, RoleHierarchy};
pub use ids::{ActionId, ResourceId, RoleId, UserId};
pub use membership::{AggregateRole, MembershipResolver};
pub use rules::RuleTable;
pub use store::{
    CatalogAction, CatalogSection, CatalogSource, GroupRecord, GroupStore, MemoryStore, RuleRecord,
    RuleStore,
};
