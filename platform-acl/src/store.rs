//! External collaborators
//!
//! The engine reads its data through three abstract sources: the action
//! catalog, the group store and the rule store. Persistence technology is
//! up to the host; [`MemoryStore`] implements all three in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{AclResult, ResolverError};
use crate::ids::{ActionId, ResourceId, RoleId, UserId};

/// One action declared by a catalog section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogAction {
    /// Action name
    pub name: ActionId,
}

/// One catalog section: a resource and its ordered actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogSection {
    /// Resource name
    pub name: ResourceId,
    /// Actions in declaration order
    #[serde(default)]
    pub actions: Vec<CatalogAction>,
}

impl CatalogSection {
    /// Build a section from a resource name and action names.
    pub fn new<I, A>(name: impl Into<ResourceId>, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActionId>,
    {
        Self {
            name: name.into(),
            actions: actions
                .into_iter()
                .map(|a| CatalogAction { name: a.into() })
                .collect(),
        }
    }
}

/// A stored user group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRecord {
    /// Group id
    pub id: RoleId,
    /// Parent group id; `None`, `0` or empty for roots
    #[serde(default)]
    pub parent_id: Option<RoleId>,
    /// Display title
    #[serde(default)]
    pub title: String,
}

impl GroupRecord {
    /// Create a group record.
    pub fn new(id: impl Into<RoleId>, parent_id: Option<RoleId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id,
            title: title.into(),
        }
    }

    /// Parent id, with the root markers normalized away.
    pub fn parent(&self) -> Option<&RoleId> {
        self.parent_id.as_ref().filter(|p| !p.is_root_marker())
    }
}

/// A stored per-resource rule record.
///
/// `rules_json` decodes to a mapping from action name to the list of role
/// ids granted that action, e.g. `{"publish": ["2", "4"]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleRecord {
    /// Record id
    pub id: u64,
    /// Parent record id; `None` or `0` for roots
    #[serde(default)]
    pub parent_id: Option<u64>,
    /// Resource the record applies to
    #[serde(alias = "resource")]
    pub resource_name: ResourceId,
    /// Encoded grants
    #[serde(alias = "rules")]
    pub rules_json: String,
}

impl RuleRecord {
    /// Create a root rule record.
    pub fn new(id: u64, resource_name: impl Into<ResourceId>, rules_json: impl Into<String>) -> Self {
        Self {
            id,
            parent_id: None,
            resource_name: resource_name.into(),
            rules_json: rules_json.into(),
        }
    }

    /// Set the parent record.
    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Parent id, with `0` normalized to `None`.
    pub fn parent(&self) -> Option<u64> {
        self.parent_id.filter(|p| *p > 0)
    }
}

/// Source of the action catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Label used in load errors.
    fn name(&self) -> String {
        "catalog source".to_string()
    }

    /// List every resource with its ordered actions.
    async fn list_resources(&self) -> AclResult<Vec<CatalogSection>>;
}

/// Store of user groups and memberships.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// List all groups, parents before the children linked to them.
    async fn list_groups(&self) -> AclResult<Vec<GroupRecord>>;

    /// Group ids the user belongs to. May contain duplicates.
    async fn group_ids_for_user(&self, user_id: &UserId) -> Result<Vec<RoleId>, ResolverError>;
}

/// Store of per-resource rule records.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// List all rule records.
    async fn list_rules(&self) -> AclResult<Vec<RuleRecord>>;
}

/// In-memory store implementing every collaborator trait.
///
/// Suitable for embedding small static policies and for testing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Catalog sections
    sections: RwLock<Vec<CatalogSection>>,
    /// Groups in tree order
    groups: RwLock<Vec<GroupRecord>>,
    /// Rule records
    rules: RwLock<Vec<RuleRecord>>,
    /// user -> group ids
    memberships: RwLock<HashMap<UserId, Vec<RoleId>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a catalog section.
    pub async fn add_section(&self, section: CatalogSection) {
        self.sections.write().await.push(section);
    }

    /// Add a group.
    pub async fn add_group(&self, group: GroupRecord) {
        self.groups.write().await.push(group);
    }

    /// Add a rule record.
    pub async fn add_rule(&self, rule: RuleRecord) {
        self.rules.write().await.push(rule);
    }

    /// Record that a user belongs to a group.
    pub async fn add_membership(&self, user_id: impl Into<UserId>, group_id: impl Into<RoleId>) {
        self.memberships
            .write()
            .await
            .entry(user_id.into())
            .or_default()
            .push(group_id.into());
    }

    /// Remove every membership of a user.
    pub async fn clear_memberships(&self, user_id: &UserId) {
        self.memberships.write().await.remove(user_id);
    }
}

#[async_trait]
impl CatalogSource for MemoryStore {
    async fn list_resources(&self) -> AclResult<Vec<CatalogSection>> {
        Ok(self.sections.read().await.clone())
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn list_groups(&self) -> AclResult<Vec<GroupRecord>> {
        Ok(self.groups.read().await.clone())
    }

    async fn group_ids_for_user(&self, user_id: &UserId) -> Result<Vec<RoleId>, ResolverError> {
        Ok(self
            .memberships
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn list_rules(&self) -> AclResult<Vec<RuleRecord>> {
        Ok(self.rules.read().await.clone())
    }
}
