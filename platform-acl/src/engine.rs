//! # Policy Engine
//!
//! [`AclTables`] holds the role hierarchy, resource catalog and rule table
//! and answers decisions synchronously. [`AclEngine`] wires the tables to
//! their stores, builds them lazily exactly once, and resolves users to
//! their aggregate role set before deciding.
//!
//! Decision order for a user:
//! 1. Superuser bypass: a role granted `app:admin` is allowed everything.
//! 2. Otherwise, allowed iff any one of the user's roles is granted the
//!    requested action on the requested resource.
//!
//! A missing rule, an unknown resource and an unknown action all deny.

use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::catalog::{JsonCatalog, ResourceCatalog};
use crate::config::{AclConfig, SUPERUSER_ACTION, SUPERUSER_RESOURCE};
use crate::error::{AclError, AclResult};
use crate::hierarchy::RoleHierarchy;
use crate::ids::{ActionId, ResourceId, RoleId, UserId};
use crate::membership::{AggregateRole, MembershipResolver};
use crate::rules::RuleTable;
use crate::store::{CatalogSource, GroupStore, MemoryStore, RuleStore};

/// Outcome of an aggregate decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// One of the roles holds the superuser grant.
    Superuser,
    /// The named role is granted the requested action.
    Granted(RoleId),
    /// No role is granted the requested action.
    Denied,
}

impl Decision {
    /// Whether access is allowed.
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Denied)
    }
}

/// The three built tables. Read-only once constructed.
#[derive(Debug, Clone)]
pub struct AclTables {
    roles: RoleHierarchy,
    catalog: ResourceCatalog,
    rules: RuleTable,
}

impl AclTables {
    /// Assemble tables that were built separately.
    pub fn new(roles: RoleHierarchy, catalog: ResourceCatalog, rules: RuleTable) -> Self {
        Self {
            roles,
            catalog,
            rules,
        }
    }

    /// Read every source and build the tables.
    ///
    /// Any failure aborts construction; no partial tables are returned.
    pub async fn load(
        catalog: &dyn CatalogSource,
        groups: &dyn GroupStore,
        rules: &dyn RuleStore,
    ) -> AclResult<Self> {
        let roles = RoleHierarchy::build(&groups.list_groups().await?)?;
        let catalog = ResourceCatalog::load(catalog).await?;
        let rules = RuleTable::build(&rules.list_rules().await?, &roles, &catalog)?;

        info!(
            roles = roles.len(),
            resources = catalog.len(),
            rules = rules.len(),
            "Built access-control tables"
        );

        Ok(Self::new(roles, catalog, rules))
    }

    /// The role hierarchy.
    pub fn roles(&self) -> &RoleHierarchy {
        &self.roles
    }

    /// The resource catalog.
    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    /// The rule table.
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Check a single role.
    ///
    /// # Errors
    ///
    /// [`AclError::UnknownRole`] if the role is not in the hierarchy. An
    /// unknown resource or action is a plain `false`.
    pub fn is_allowed_for_role(
        &self,
        role: &RoleId,
        resource: &ResourceId,
        action: &ActionId,
    ) -> AclResult<bool> {
        if !self.roles.contains(role) {
            return Err(AclError::UnknownRole(role.clone()));
        }
        Ok(self.rules.is_granted(role, resource, action))
    }

    /// Check if any role of the set holds the superuser grant.
    pub fn is_superuser(&self, roles: &AggregateRole) -> bool {
        let resource = ResourceId::from(SUPERUSER_RESOURCE);
        let action = ActionId::from(SUPERUSER_ACTION);
        roles
            .iter()
            .any(|role| self.rules.is_granted(role, &resource, &action))
    }

    /// Decide for an aggregate role set.
    ///
    /// Role ids missing from the hierarchy are skipped: they can never hold
    /// a grant.
    pub fn decide(&self, roles: &AggregateRole, resource: &ResourceId, action: &ActionId) -> Decision {
        if self.is_superuser(roles) {
            return Decision::Superuser;
        }

        for role in roles.iter() {
            if !self.roles.contains(role) {
                debug!(role = %role, "Membership references an unknown role, skipped");
                continue;
            }
            if self.rules.is_granted(role, resource, action) {
                return Decision::Granted(role.clone());
            }
        }

        Decision::Denied
    }

    /// Check an aggregate role set.
    pub fn is_allowed_for_roles(
        &self,
        roles: &AggregateRole,
        resource: &ResourceId,
        action: &ActionId,
    ) -> bool {
        self.decide(roles, resource, action).is_allowed()
    }

    /// Roles explicitly granted an action, sorted by id.
    pub fn allowed_roles(&self, resource: &ResourceId, action: &ActionId) -> Vec<RoleId> {
        let mut roles: Vec<RoleId> = self
            .rules
            .grants(resource, action)
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default();
        roles.sort();
        roles
    }

    /// Actions of a resource granted to a role, in catalog order.
    pub fn allowed_actions_for_role(
        &self,
        role: &RoleId,
        resource: &ResourceId,
    ) -> AclResult<Vec<ActionId>> {
        if !self.roles.contains(role) {
            return Err(AclError::UnknownRole(role.clone()));
        }
        Ok(self
            .catalog
            .get(resource)
            .map(|r| {
                r.actions
                    .iter()
                    .filter(|a| self.rules.is_granted(role, resource, a))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Access-control engine.
///
/// Construct once at startup and share it (for example behind an `Arc`).
/// Tables are built on first use; concurrent first callers wait on a single
/// build. A failed build is not cached, so the next call retries.
/// [`AclEngine::reload`] takes `&self`, so a shared engine can be reloaded;
/// decisions already in flight finish against the tables they started with.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use platform_acl::{AclConfig, AclEngine, ActionId, CatalogSection, GroupRecord, MemoryStore, ResourceId, RoleId, RuleRecord};
///
/// # tokio_test_block_on(async {
/// let store = Arc::new(MemoryStore::new());
/// store.add_section(CatalogSection::new("blog", ["publish"])).await;
/// store.add_group(GroupRecord::new(1u64, None, "Root")).await;
/// store.add_group(GroupRecord::new(2u64, Some(RoleId::from(1u64)), "Editor")).await;
/// store.add_rule(RuleRecord::new(1, "blog", r#"{"publish": ["2"]}"#)).await;
///
/// let engine = AclEngine::from_memory(AclConfig::with_guest_role(1u64), store);
/// let allowed = engine
///     .is_allowed_for_role(&RoleId::from("2"), &ResourceId::from("blog"), &ActionId::from("publish"))
///     .await
///     .unwrap();
/// assert!(allowed);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct AclEngine {
    config: AclConfig,
    catalog_source: Arc<dyn CatalogSource>,
    group_store: Arc<dyn GroupStore>,
    rule_store: Arc<dyn RuleStore>,
    resolver: MembershipResolver,
    tables: ArcSwap<OnceCell<Arc<AclTables>>>,
}

impl std::fmt::Debug for AclEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AclEngine")
            .field("config", &self.config)
            .field("loaded", &self.is_loaded())
            .field("resolver", &self.resolver)
            .finish()
    }
}

impl AclEngine {
    /// Create an engine over the given collaborators.
    pub fn new(
        config: AclConfig,
        catalog_source: Arc<dyn CatalogSource>,
        group_store: Arc<dyn GroupStore>,
        rule_store: Arc<dyn RuleStore>,
    ) -> Self {
        let resolver = MembershipResolver::new(group_store.clone(), config.guest_role.clone())
            .with_cache_ttl(config.cache_ttl());

        Self {
            config,
            catalog_source,
            group_store,
            rule_store,
            resolver,
            tables: ArcSwap::from_pointee(OnceCell::new()),
        }
    }

    /// Create an engine whose catalog is the JSON file at `config.catalog_path`.
    ///
    /// # Errors
    ///
    /// [`AclError::Config`] when no catalog path is configured.
    pub fn from_config(
        config: AclConfig,
        group_store: Arc<dyn GroupStore>,
        rule_store: Arc<dyn RuleStore>,
    ) -> AclResult<Self> {
        let path = config.catalog_path.clone().ok_or_else(|| AclError::Config {
            key: "ACL_CATALOG_PATH".to_string(),
            message: "no action catalog path configured".to_string(),
        })?;
        Ok(Self::new(
            config,
            Arc::new(JsonCatalog::from_path(path)),
            group_store,
            rule_store,
        ))
    }

    /// Create an engine reading everything from one in-memory store.
    pub fn from_memory(config: AclConfig, store: Arc<MemoryStore>) -> Self {
        Self::new(config, store.clone(), store.clone(), store)
    }

    /// The engine configuration.
    pub fn config(&self) -> &AclConfig {
        &self.config
    }

    /// The membership resolver.
    pub fn resolver(&self) -> &MembershipResolver {
        &self.resolver
    }

    /// Get the tables, building them on first use.
    pub async fn tables(&self) -> AclResult<Arc<AclTables>> {
        // A reload swaps in a fresh cell; builds already running on the old
        // one finish there.
        let cell = self.tables.load_full();
        let tables = cell
            .get_or_try_init(|| async {
                AclTables::load(
                    self.catalog_source.as_ref(),
                    self.group_store.as_ref(),
                    self.rule_store.as_ref(),
                )
                .await
                .map(Arc::new)
            })
            .await?
            .clone();
        Ok(tables)
    }

    /// Build the tables now instead of on first use.
    pub async fn preload(&self) -> AclResult<()> {
        self.tables().await.map(|_| ())
    }

    /// Check if the tables have been built.
    pub fn is_loaded(&self) -> bool {
        self.tables.load().initialized()
    }

    /// Drop the built tables and cached memberships; the next call rebuilds.
    pub fn reload(&self) {
        self.tables.store(Arc::new(OnceCell::new()));
        self.resolver.clear_cache();
        info!("Access-control tables dropped, rebuilding on next use");
    }

    /// Check a single role.
    #[instrument(level = "debug", skip(self))]
    pub async fn is_allowed_for_role(
        &self,
        role: &RoleId,
        resource: &ResourceId,
        action: &ActionId,
    ) -> AclResult<bool> {
        let allowed = self.tables().await?.is_allowed_for_role(role, resource, action)?;
        debug!(allowed, "Role decision");
        Ok(allowed)
    }

    /// Decide for a user, or for an anonymous caller when `user_id` is `None`.
    ///
    /// # Errors
    ///
    /// Membership lookup failures are returned as [`AclError::Resolver`];
    /// they are never turned into an allow or a deny here.
    #[instrument(level = "debug", skip(self))]
    pub async fn decide_for_user(
        &self,
        user_id: Option<&UserId>,
        resource: &ResourceId,
        action: &ActionId,
    ) -> AclResult<Decision> {
        let tables = self.tables().await?;
        let roles = self.resolver.resolve(user_id).await?;
        let decision = tables.decide(&roles, resource, action);
        debug!(roles = %roles, guest = roles.is_guest(), decision = ?decision, "User decision");
        Ok(decision)
    }

    /// Check a user, or an anonymous caller when `user_id` is `None`.
    pub async fn is_allowed_for_user(
        &self,
        user_id: Option<&UserId>,
        resource: &ResourceId,
        action: &ActionId,
    ) -> AclResult<bool> {
        Ok(self
            .decide_for_user(user_id, resource, action)
            .await?
            .is_allowed())
    }

    /// Roles explicitly granted an action, sorted by id.
    pub async fn allowed_roles(
        &self,
        resource: &ResourceId,
        action: &ActionId,
    ) -> AclResult<Vec<RoleId>> {
        Ok(self.tables().await?.allowed_roles(resource, action))
    }

    /// Actions of a resource granted to a role, in catalog order.
    pub async fn allowed_actions_for_role(
        &self,
        role: &RoleId,
        resource: &ResourceId,
    ) -> AclResult<Vec<ActionId>> {
        self.tables().await?.allowed_actions_for_role(role, resource)
    }

    /// Forget the cached memberships of one user.
    pub fn invalidate_user(&self, user_id: &UserId) {
        self.resolver.invalidate_user(user_id);
    }

    /// Forget every cached membership.
    pub fn clear_membership_cache(&self) {
        self.resolver.clear_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolverError;
    use crate::store::{CatalogSection, GroupRecord, RuleRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn r(id: &str) -> ResourceId {
        ResourceId::from(id)
    }

    fn a(id: &str) -> ActionId {
        ActionId::from(id)
    }

    fn role(id: u64) -> RoleId {
        RoleId::from(id)
    }

    async fn blog_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_section(CatalogSection::new("app", ["admin"])).await;
        store.add_section(CatalogSection::new("blog", ["view", "publish"])).await;
        store.add_section(CatalogSection::new("forum", ["post", "delete"])).await;

        store.add_group(GroupRecord::new(1u64, None, "Root")).await;
        store.add_group(GroupRecord::new(2u64, Some(role(1)), "Editor")).await;
        store.add_group(GroupRecord::new(3u64, Some(role(1)), "Guest")).await;

        store.add_rule(RuleRecord::new(1, "app", r#"{"admin": ["1"]}"#)).await;
        store.add_rule(RuleRecord::new(2, "blog", r#"{"view": ["2", "3"], "publish": ["2"]}"#)).await;
        store
    }

    fn tables_from(groups: &[GroupRecord], sections: Vec<CatalogSection>, rules: &[RuleRecord]) -> AclTables {
        let roles = RoleHierarchy::build(groups).unwrap();
        let catalog = ResourceCatalog::from_sections(sections, "test").unwrap();
        let rules = RuleTable::build(rules, &roles, &catalog).unwrap();
        AclTables::new(roles, catalog, rules)
    }

    #[tokio::test]
    async fn test_role_decisions() {
        let engine = AclEngine::from_memory(AclConfig::with_guest_role(3u64), blog_store().await);
        assert!(engine.is_allowed_for_role(&role(2), &r("blog"), &a("publish")).await.unwrap());
        assert!(!engine.is_allowed_for_role(&role(3), &r("blog"), &a("publish")).await.unwrap());
        // The root role holds app:admin, but per-role checks have no bypass.
        assert!(!engine.is_allowed_for_role(&role(1), &r("blog"), &a("publish")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_pairs_deny_and_unknown_role_errors() {
        let engine = AclEngine::from_memory(AclConfig::with_guest_role(3u64), blog_store().await);
        assert!(!engine.is_allowed_for_role(&role(2), &r("nowhere"), &a("view")).await.unwrap());
        assert!(!engine.is_allowed_for_role(&role(2), &r("blog"), &a("delete")).await.unwrap());

        let err = engine
            .is_allowed_for_role(&role(42), &r("blog"), &a("view"))
            .await
            .unwrap_err();
        assert!(matches!(err, AclError::UnknownRole(_)));
    }

    #[tokio::test]
    async fn test_superuser_bypass_dominates() {
        let store = blog_store().await;
        store.add_membership("root-user", 1u64).await;
        let engine = AclEngine::from_memory(AclConfig::with_guest_role(3u64), store);
        let user = UserId::from("root-user");

        let decision = engine
            .decide_for_user(Some(&user), &r("undeclared"), &a("anything"))
            .await
            .unwrap();
        assert_eq!(decision, Decision::Superuser);
        assert!(engine.is_allowed_for_user(Some(&user), &r("forum"), &a("delete")).await.unwrap());
    }

    #[tokio::test]
    async fn test_aggregate_is_or_over_memberships() {
        let store = blog_store().await;
        store.add_membership("writer", 3u64).await;
        store.add_membership("writer", 2u64).await;
        let engine = AclEngine::from_memory(AclConfig::with_guest_role(3u64), store);
        let writer = UserId::from("writer");

        assert_eq!(
            engine.decide_for_user(Some(&writer), &r("blog"), &a("publish")).await.unwrap(),
            Decision::Granted(role(2))
        );
        assert!(!engine.is_allowed_for_user(Some(&writer), &r("forum"), &a("post")).await.unwrap());
    }

    #[tokio::test]
    async fn test_anonymous_uses_guest_role() {
        let engine = AclEngine::from_memory(AclConfig::with_guest_role(3u64), blog_store().await);
        assert!(engine.is_allowed_for_user(None, &r("blog"), &a("view")).await.unwrap());
        assert!(!engine.is_allowed_for_user(None, &r("blog"), &a("publish")).await.unwrap());

        let stranger = UserId::from("stranger");
        assert!(engine.is_allowed_for_user(Some(&stranger), &r("blog"), &a("view")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_membership_roles_are_skipped() {
        let store = blog_store().await;
        store.add_membership("ghost", 77u64).await;
        store.add_membership("ghost", 2u64).await;
        let engine = AclEngine::from_memory(AclConfig::with_guest_role(3u64), store);
        let ghost = UserId::from("ghost");
        assert!(engine.is_allowed_for_user(Some(&ghost), &r("blog"), &a("publish")).await.unwrap());
        assert!(!engine.is_allowed_for_user(Some(&ghost), &r("forum"), &a("post")).await.unwrap());
    }

    #[tokio::test]
    async fn test_inspection_helpers() {
        let engine = AclEngine::from_memory(AclConfig::with_guest_role(3u64), blog_store().await);
        assert_eq!(
            engine.allowed_roles(&r("blog"), &a("view")).await.unwrap(),
            vec![role(2), role(3)]
        );
        assert!(engine.allowed_roles(&r("nowhere"), &a("view")).await.unwrap().is_empty());
        assert_eq!(
            engine.allowed_actions_for_role(&role(2), &r("blog")).await.unwrap(),
            vec![a("view"), a("publish")]
        );
        assert!(engine.allowed_actions_for_role(&role(99), &r("blog")).await.is_err());
    }

    #[test]
    fn test_tables_decide_without_engine() {
        let tables = tables_from(
            &[
                GroupRecord::new(1u64, None, "Root"),
                GroupRecord::new(2u64, Some(role(1)), "Member"),
            ],
            vec![CatalogSection::new("wiki", ["edit"])],
            &[RuleRecord::new(1, "wiki", r#"{"edit": ["2"]}"#)],
        );
        let member = AggregateRole::new([role(2)]);
        let root = AggregateRole::new([role(1)]);
        assert!(tables.is_allowed_for_roles(&member, &r("wiki"), &a("edit")));
        assert!(!tables.is_allowed_for_roles(&root, &r("wiki"), &a("edit")));
        // No app section: nobody can be superuser.
        assert!(!tables.is_superuser(&root));
        assert!(!tables.is_allowed_for_roles(&AggregateRole::new(Vec::<RoleId>::new()), &r("wiki"), &a("edit")));
    }

    struct CountingRules {
        inner: Arc<MemoryStore>,
        builds: AtomicUsize,
    }

    #[async_trait]
    impl RuleStore for CountingRules {
        async fn list_rules(&self) -> AclResult<Vec<RuleRecord>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.inner.list_rules().await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_builds_once() {
        let store = blog_store().await;
        let rules = Arc::new(CountingRules {
            inner: store.clone(),
            builds: AtomicUsize::new(0),
        });
        let engine = Arc::new(AclEngine::new(
            AclConfig::with_guest_role(3u64),
            store.clone(),
            store,
            rules.clone(),
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.is_allowed_for_role(&role(2), &r("blog"), &a("publish")).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }
        assert_eq!(rules.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reload_is_explicit() {
        let store = blog_store().await;
        let engine = AclEngine::from_memory(AclConfig::with_guest_role(3u64), store.clone());
        assert!(!engine.is_loaded());
        engine.preload().await.unwrap();
        assert!(engine.is_loaded());

        store.add_rule(RuleRecord::new(3, "forum", r#"{"post": ["3"]}"#)).await;
        assert!(!engine.is_allowed_for_role(&role(3), &r("forum"), &a("post")).await.unwrap());

        engine.reload();
        assert!(!engine.is_loaded());
        assert!(engine.is_allowed_for_role(&role(3), &r("forum"), &a("post")).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reload_through_shared_engine() {
        let store = blog_store().await;
        store.add_membership("writer", 3u64).await;
        let config = AclConfig::with_guest_role(3u64).membership_cache_ttl(Duration::from_secs(60));
        let engine = Arc::new(AclEngine::from_memory(config, store.clone()));
        let writer = UserId::from("writer");

        assert!(!engine.is_allowed_for_user(Some(&writer), &r("blog"), &a("publish")).await.unwrap());

        store.add_membership("writer", 2u64).await;
        store.add_rule(RuleRecord::new(3, "forum", r#"{"post": ["2"]}"#)).await;

        let shared = engine.clone();
        tokio::spawn(async move { shared.reload() }).await.unwrap();

        assert!(!engine.is_loaded());
        assert_eq!(engine.resolver().cached_users(), 0);
        assert!(engine.is_allowed_for_user(Some(&writer), &r("blog"), &a("publish")).await.unwrap());
        assert!(engine.is_allowed_for_user(Some(&writer), &r("forum"), &a("post")).await.unwrap());
    }

    struct FailingGroups {
        fail_builds: bool,
    }

    #[async_trait]
    impl GroupStore for FailingGroups {
        async fn list_groups(&self) -> AclResult<Vec<GroupRecord>> {
            if self.fail_builds {
                return Err(AclError::Store("groups table unavailable".into()));
            }
            Ok(vec![GroupRecord::new(1u64, None, "Root")])
        }

        async fn group_ids_for_user(&self, _user_id: &UserId) -> Result<Vec<RoleId>, ResolverError> {
            Err(ResolverError::Cancelled)
        }
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let store = blog_store().await;
        let engine = AclEngine::new(
            AclConfig::with_guest_role(1u64),
            store.clone(),
            Arc::new(FailingGroups { fail_builds: true }),
            store,
        );
        let err = engine.preload().await.unwrap_err();
        assert!(err.is_construction_error());
        assert!(!engine.is_loaded());
    }

    #[tokio::test]
    async fn test_resolver_cancellation_is_surfaced() {
        let store = blog_store().await;
        let engine = AclEngine::new(
            AclConfig::with_guest_role(1u64),
            store.clone(),
            Arc::new(FailingGroups { fail_builds: false }),
            store,
        );
        let user = UserId::from("alice");
        let err = engine
            .is_allowed_for_user(Some(&user), &r("blog"), &a("view"))
            .await
            .unwrap_err();
        assert!(matches!(err, AclError::Resolver(ResolverError::Cancelled)));
    }

    #[test]
    fn test_from_config_requires_catalog_path() {
        let store = Arc::new(MemoryStore::new());
        let err = AclEngine::from_config(AclConfig::default(), store.clone(), store).unwrap_err();
        assert!(matches!(err, AclError::Config { .. }));
    }
}
