//! # Role Hierarchy
//!
//! Builds the forest of roles from flat group records.
//!
//! Nodes are stored in an arena indexed by position; the parent and child
//! links are resolved by id in a second pass, so a child may be listed
//! before its parent. The hierarchy is structural: a role does not inherit
//! the grants of its ancestors. Grants come only from explicit rule entries.

use std::collections::HashMap;

use crate::error::{AclError, AclResult};
use crate::ids::RoleId;
use crate::store::GroupRecord;

/// A node of the role forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    /// Role id
    pub id: RoleId,
    /// Display title
    pub title: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl Role {
    /// Whether this role has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

/// Forest of roles with inheritance queries.
///
/// # Example
///
/// ```
/// use platform_acl::{GroupRecord, RoleHierarchy, RoleId};
///
/// let hierarchy = RoleHierarchy::build(&[
///     GroupRecord::new(1u64, None, "Root"),
///     GroupRecord::new(2u64, Some(RoleId::from(1u64)), "Editor"),
/// ])
/// .unwrap();
///
/// assert!(hierarchy.is_descendant(&RoleId::from("2"), &RoleId::from("1")).unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    nodes: Vec<Role>,
    index: HashMap<RoleId, usize>,
}

impl RoleHierarchy {
    /// Build the forest from flat group records.
    ///
    /// Nodes are created first and linked by id in a second pass, so a child
    /// may be listed before its parent. A parent id that never appears in
    /// the input is still rejected.
    ///
    /// # Errors
    ///
    /// [`AclError::MalformedHierarchy`] when an id repeats, a parent id is
    /// absent from the input, a role is its own parent, or the parent links
    /// form a cycle.
    pub fn build(groups: &[GroupRecord]) -> AclResult<Self> {
        let mut nodes = Vec::with_capacity(groups.len());
        let mut index = HashMap::with_capacity(groups.len());

        for group in groups {
            if index.insert(group.id.clone(), nodes.len()).is_some() {
                return Err(AclError::MalformedHierarchy(format!(
                    "duplicate role id `{}`",
                    group.id
                )));
            }
            nodes.push(Role {
                id: group.id.clone(),
                title: group.title.clone(),
                parent: None,
                children: Vec::new(),
            });
        }

        for (child_idx, group) in groups.iter().enumerate() {
            let Some(parent_id) = group.parent() else {
                continue;
            };
            if *parent_id == group.id {
                return Err(AclError::MalformedHierarchy(format!(
                    "role `{}` is its own parent",
                    group.id
                )));
            }
            let parent_idx = *index.get(parent_id).ok_or_else(|| {
                AclError::MalformedHierarchy(format!(
                    "role `{}` references unknown parent `{}`",
                    group.id, parent_id
                ))
            })?;
            nodes[child_idx].parent = Some(parent_idx);
            nodes[parent_idx].children.push(child_idx);
        }

        let hierarchy = Self { nodes, index };
        hierarchy.check_acyclic()?;
        Ok(hierarchy)
    }

    /// Every node must reach a root by following parent links.
    fn check_acyclic(&self) -> AclResult<()> {
        // 0 = unvisited, 1 = on current path, 2 = reaches a root
        let mut state = vec![0u8; self.nodes.len()];

        for start in 0..self.nodes.len() {
            let mut path = Vec::new();
            let mut current = Some(start);

            while let Some(idx) = current {
                match state[idx] {
                    2 => break,
                    1 => {
                        return Err(AclError::MalformedHierarchy(format!(
                            "cycle through role `{}`",
                            self.nodes[idx].id
                        )))
                    }
                    _ => {
                        state[idx] = 1;
                        path.push(idx);
                        current = self.nodes[idx].parent;
                    }
                }
            }

            for idx in path {
                state[idx] = 2;
            }
        }

        Ok(())
    }

    fn idx(&self, id: &RoleId) -> AclResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| AclError::UnknownRole(id.clone()))
    }

    /// Get a role by id.
    pub fn get(&self, id: &RoleId) -> AclResult<&Role> {
        Ok(&self.nodes[self.idx(id)?])
    }

    /// Check if a role id is registered.
    pub fn contains(&self, id: &RoleId) -> bool {
        self.index.contains_key(id)
    }

    /// Parent of a role, if any.
    pub fn parent(&self, id: &RoleId) -> AclResult<Option<&RoleId>> {
        let idx = self.idx(id)?;
        Ok(self.nodes[idx].parent.map(|p| &self.nodes[p].id))
    }

    /// Direct children of a role, in input order.
    pub fn children(&self, id: &RoleId) -> AclResult<Vec<&RoleId>> {
        let idx = self.idx(id)?;
        Ok(self.nodes[idx]
            .children
            .iter()
            .map(|c| &self.nodes[*c].id)
            .collect())
    }

    /// Ancestors of a role, nearest first.
    pub fn ancestors(&self, id: &RoleId) -> AclResult<Vec<&RoleId>> {
        let mut result = Vec::new();
        let mut current = self.nodes[self.idx(id)?].parent;
        while let Some(idx) = current {
            result.push(&self.nodes[idx].id);
            current = self.nodes[idx].parent;
        }
        Ok(result)
    }

    /// Check if `candidate` sits strictly below `ancestor` in the forest.
    ///
    /// A role is not its own descendant.
    pub fn is_descendant(&self, candidate: &RoleId, ancestor: &RoleId) -> AclResult<bool> {
        let target = self.idx(ancestor)?;
        let mut current = self.nodes[self.idx(candidate)?].parent;
        while let Some(idx) = current {
            if idx == target {
                return Ok(true);
            }
            current = self.nodes[idx].parent;
        }
        Ok(false)
    }

    /// Depth of a role; roots are at depth 0.
    pub fn depth(&self, id: &RoleId) -> AclResult<usize> {
        Ok(self.ancestors(id)?.len())
    }

    /// Root roles, in input order.
    pub fn roots(&self) -> Vec<&RoleId> {
        self.nodes
            .iter()
            .filter(|n| n.is_root())
            .map(|n| &n.id)
            .collect()
    }

    /// All roles, in input order.
    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.nodes.iter()
    }

    /// Number of roles.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: u64, parent: u64, title: &str) -> GroupRecord {
        GroupRecord::new(id, Some(RoleId::from(parent)), title)
    }

    fn sample() -> Vec<GroupRecord> {
        vec![
            group(1, 0, "Root"),
            group(2, 1, "Editor"),
            group(3, 1, "Guest"),
            group(4, 2, "Publisher"),
        ]
    }

    fn id(n: u64) -> RoleId {
        RoleId::from(n)
    }

    #[test]
    fn test_build_links_parents_and_children() {
        let h = RoleHierarchy::build(&sample()).unwrap();
        assert_eq!(h.len(), 4);
        assert_eq!(h.roots(), vec![&id(1)]);
        assert_eq!(h.children(&id(1)).unwrap(), vec![&id(2), &id(3)]);
        assert_eq!(h.parent(&id(4)).unwrap(), Some(&id(2)));
        assert_eq!(h.parent(&id(1)).unwrap(), None);
        assert_eq!(h.get(&id(2)).unwrap().title, "Editor");
        assert_eq!(h.get(&id(1)).unwrap().child_count(), 2);
    }

    #[test]
    fn test_descendant_queries() {
        let h = RoleHierarchy::build(&sample()).unwrap();
        assert!(h.is_descendant(&id(4), &id(1)).unwrap());
        assert!(h.is_descendant(&id(4), &id(2)).unwrap());
        assert!(!h.is_descendant(&id(4), &id(3)).unwrap());
        assert!(!h.is_descendant(&id(1), &id(4)).unwrap());
        assert!(!h.is_descendant(&id(2), &id(2)).unwrap());
        assert_eq!(h.ancestors(&id(4)).unwrap(), vec![&id(2), &id(1)]);
        assert_eq!(h.depth(&id(4)).unwrap(), 2);
    }

    #[test]
    fn test_child_listed_before_parent() {
        let groups = vec![group(2, 1, "Editor"), group(1, 0, "Root")];
        let h = RoleHierarchy::build(&groups).unwrap();
        assert!(h.is_descendant(&id(2), &id(1)).unwrap());
    }

    #[test]
    fn test_unknown_parent_is_malformed() {
        let groups = vec![group(1, 0, "Root"), group(2, 99, "Orphan")];
        let err = RoleHierarchy::build(&groups).unwrap_err();
        assert!(matches!(err, AclError::MalformedHierarchy(_)));
    }

    #[test]
    fn test_duplicate_id_is_malformed() {
        let groups = vec![group(1, 0, "Root"), group(1, 0, "Again")];
        assert!(matches!(
            RoleHierarchy::build(&groups),
            Err(AclError::MalformedHierarchy(_))
        ));
    }

    #[test]
    fn test_self_parent_and_cycles_are_malformed() {
        assert!(matches!(
            RoleHierarchy::build(&[group(5, 5, "Loop")]),
            Err(AclError::MalformedHierarchy(_))
        ));

        let cycle = vec![group(1, 0, "Root"), group(2, 3, "A"), group(3, 2, "B")];
        assert!(matches!(
            RoleHierarchy::build(&cycle),
            Err(AclError::MalformedHierarchy(_))
        ));
    }

    #[test]
    fn test_unknown_role_lookup() {
        let h = RoleHierarchy::build(&sample()).unwrap();
        assert!(matches!(h.get(&id(42)), Err(AclError::UnknownRole(r)) if r == id(42)));
        assert!(matches!(
            h.is_descendant(&id(42), &id(1)),
            Err(AclError::UnknownRole(_))
        ));
        assert!(!h.contains(&id(42)));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let a = RoleHierarchy::build(&sample()).unwrap();
        let b = RoleHierarchy::build(&sample()).unwrap();
        for x in a.iter() {
            for y in a.iter() {
                assert_eq!(
                    a.is_descendant(&x.id, &y.id).unwrap(),
                    b.is_descendant(&x.id, &y.id).unwrap()
                );
            }
            assert_eq!(a.ancestors(&x.id).unwrap(), b.ancestors(&x.id).unwrap());
        }
    }

    #[test]
    fn test_empty_hierarchy() {
        let h = RoleHierarchy::build(&[]).unwrap();
        assert!(h.is_empty());
        assert!(h.roots().is_empty());
    }
}
