//! # Rule Table
//!
//! Per resource and action, the set of role ids explicitly granted access.
//!
//! Grant payloads are decoded and validated while the table is built, so a
//! malformed record fails construction instead of a later query. A declared
//! action without a rule entry has an empty grant set: the normal
//! "not configured yet" state.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::catalog::ResourceCatalog;
use crate::error::{AclError, AclResult};
use crate::hierarchy::RoleHierarchy;
use crate::ids::{ActionId, ResourceId, RoleId};
use crate::store::RuleRecord;

/// Decoded grant payload of one rule record: action -> granted role ids.
pub type ActionGrants = BTreeMap<ActionId, Vec<RoleId>>;

/// Decode a rule record's payload.
///
/// An empty string, `null`, or an action mapped to `null` means no grants.
///
/// # Example
///
/// ```
/// use platform_acl::rules::decode_grants;
/// use platform_acl::{ActionId, ResourceId, RoleId};
///
/// let grants = decode_grants(&ResourceId::from("blog"), r#"{"publish": ["2"]}"#).unwrap();
/// assert_eq!(grants[&ActionId::from("publish")], vec![RoleId::from("2")]);
/// ```
pub fn decode_grants(resource: &ResourceId, rules_json: &str) -> AclResult<ActionGrants> {
    if rules_json.trim().is_empty() {
        return Ok(ActionGrants::new());
    }

    let decoded: Option<BTreeMap<ActionId, Option<Vec<RoleId>>>> = serde_json::from_str(rules_json)
        .map_err(|e| AclError::MalformedRule {
            resource: resource.clone(),
            message: e.to_string(),
        })?;

    Ok(decoded
        .unwrap_or_default()
        .into_iter()
        .map(|(action, roles)| (action, roles.unwrap_or_default()))
        .collect())
}

/// Mapping from (resource, action) to granted role ids.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    grants: HashMap<ResourceId, HashMap<ActionId, HashSet<RoleId>>>,
    /// resource -> resource of its parent rule record
    parents: HashMap<ResourceId, ResourceId>,
}

impl RuleTable {
    /// Build the table from stored rule records.
    ///
    /// Only resources declared in the catalog with at least one action get
    /// entries. Grants naming a role absent from the hierarchy are dropped,
    /// since such a role can never be evaluated.
    ///
    /// # Errors
    ///
    /// [`AclError::MalformedRule`] if any record's payload cannot be decoded.
    pub fn build(
        records: &[RuleRecord],
        roles: &RoleHierarchy,
        catalog: &ResourceCatalog,
    ) -> AclResult<Self> {
        let mut by_resource: HashMap<&ResourceId, ActionGrants> = HashMap::new();
        let mut resource_of_record: HashMap<u64, &ResourceId> = HashMap::new();

        for record in records {
            let decoded = decode_grants(&record.resource_name, &record.rules_json)?;
            if by_resource.insert(&record.resource_name, decoded).is_some() {
                tracing::warn!(
                    resource = %record.resource_name,
                    record_id = record.id,
                    "Duplicate rule record for resource, keeping the later one"
                );
            }
            resource_of_record.insert(record.id, &record.resource_name);

            if catalog.get(&record.resource_name).is_none() {
                tracing::warn!(
                    resource = %record.resource_name,
                    "Rule record for a resource missing from the catalog is ignored"
                );
            }
        }

        let mut parents = HashMap::new();
        for record in records {
            let Some(parent_id) = record.parent() else {
                continue;
            };
            match resource_of_record.get(&parent_id) {
                Some(parent) => {
                    parents.insert(record.resource_name.clone(), (*parent).clone());
                }
                None => tracing::warn!(
                    resource = %record.resource_name,
                    parent_id,
                    "Rule record references an unknown parent record"
                ),
            }
        }

        let mut grants = HashMap::new();
        for resource in catalog.iter().filter(|r| !r.actions.is_empty()) {
            let stored = by_resource.get(&resource.id);
            let mut per_action = HashMap::with_capacity(resource.actions.len());

            for action in &resource.actions {
                let mut granted = HashSet::new();
                if let Some(role_ids) = stored.and_then(|s| s.get(action)) {
                    for role_id in role_ids {
                        if roles.contains(role_id) {
                            granted.insert(role_id.clone());
                        } else {
                            tracing::warn!(
                                resource = %resource.id,
                                action = %action,
                                role = %role_id,
                                "Rule grants an unknown role, entry ignored"
                            );
                        }
                    }
                }
                per_action.insert(action.clone(), granted);
            }

            if let Some(stored) = stored {
                for action in stored.keys().filter(|a| !resource.has_action(a)) {
                    tracing::debug!(
                        resource = %resource.id,
                        action = %action,
                        "Rule entry for an undeclared action ignored"
                    );
                }
            }

            grants.insert(resource.id.clone(), per_action);
        }

        Ok(Self { grants, parents })
    }

    /// Roles granted an action, or `None` when the pair has no rule.
    pub fn grants(&self, resource: &ResourceId, action: &ActionId) -> Option<&HashSet<RoleId>> {
        self.grants.get(resource).and_then(|a| a.get(action))
    }

    /// Check if a role is granted an action. Unknown pairs are denied.
    pub fn is_granted(&self, role: &RoleId, resource: &ResourceId, action: &ActionId) -> bool {
        self.grants(resource, action)
            .is_some_and(|roles| roles.contains(role))
    }

    /// Resource of the parent rule record, if the record has one.
    ///
    /// Informational only: grants are never inherited along this link.
    pub fn parent_resource(&self, resource: &ResourceId) -> Option<&ResourceId> {
        self.parents.get(resource)
    }

    /// Number of (resource, action) rules.
    pub fn len(&self) -> usize {
        self.grants.values().map(HashMap::len).sum()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
