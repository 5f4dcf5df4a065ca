//! Group membership resolution
//!
//! Maps a caller to the deduplicated set of role ids it belongs to, with a
//! fixed guest role for anonymous callers and users without memberships.
//! Resolved sets can be cached per user for a configured TTL.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::AclResult;
use crate::ids::{RoleId, UserId};
use crate::store::GroupStore;

/// Request-scoped set of every role a caller belongs to.
///
/// Duplicates are removed on construction, so two callers whose membership
/// records differ only by repetition get the same set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRole {
    roles: BTreeSet<RoleId>,
    guest: bool,
}

impl AggregateRole {
    /// Aggregate from membership records.
    pub fn new<I>(roles: I) -> Self
    where
        I: IntoIterator<Item = RoleId>,
    {
        Self {
            roles: roles.into_iter().collect(),
            guest: false,
        }
    }

    /// The single-role set used for anonymous callers.
    pub fn guest(guest_role: RoleId) -> Self {
        Self {
            roles: BTreeSet::from([guest_role]),
            guest: true,
        }
    }

    /// Whether this set came from the guest fallback.
    pub fn is_guest(&self) -> bool {
        self.guest
    }

    /// Check if the set contains a role.
    pub fn contains(&self, role: &RoleId) -> bool {
        self.roles.contains(role)
    }

    /// Roles in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &RoleId> {
        self.roles.iter()
    }

    /// Number of distinct roles.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl fmt::Display for AggregateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.roles.iter().map(RoleId::as_str).collect();
        write!(f, "[{}]", ids.join(","))
    }
}

#[derive(Debug, Clone)]
struct CachedMembership {
    roles: AggregateRole,
    cached_at: Instant,
}

/// Resolves callers to their aggregate role set.
///
/// Every invalidation bumps an epoch. A lookup only caches its result if no
/// invalidation happened while it was talking to the store, so an
/// in-flight lookup cannot write back memberships that were just revoked.
pub struct MembershipResolver {
    store: Arc<dyn GroupStore>,
    guest_role: RoleId,
    cache: DashMap<UserId, CachedMembership>,
    ttl: Option<Duration>,
    epoch: AtomicU64,
    last_sweep: Mutex<Instant>,
}

impl fmt::Debug for MembershipResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MembershipResolver")
            .field("guest_role", &self.guest_role)
            .field("ttl", &self.ttl)
            .field("cached_users", &self.cache.len())
            .finish()
    }
}

impl MembershipResolver {
    /// Create a resolver without caching.
    pub fn new(store: Arc<dyn GroupStore>, guest_role: RoleId) -> Self {
        Self {
            store,
            guest_role,
            cache: DashMap::new(),
            ttl: None,
            epoch: AtomicU64::new(0),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Cache resolved sets per user for `ttl`.
    pub fn with_cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl.filter(|t| !t.is_zero());
        self
    }

    /// The configured guest role.
    pub fn guest_role(&self) -> &RoleId {
        &self.guest_role
    }

    /// Resolve a caller to its role set.
    ///
    /// `None` (anonymous) and users with no membership resolve to the guest
    /// role. Store failures are returned untouched.
    pub async fn resolve(&self, user_id: Option<&UserId>) -> AclResult<AggregateRole> {
        let Some(user_id) = user_id else {
            return Ok(AggregateRole::guest(self.guest_role.clone()));
        };

        if let Some(hit) = self.cached(user_id) {
            return Ok(hit);
        }

        let epoch = self.epoch.load(Ordering::Acquire);

        // No cache guard is held across this call.
        let ids = self.store.group_ids_for_user(user_id).await?;
        let roles = if ids.is_empty() {
            AggregateRole::guest(self.guest_role.clone())
        } else {
            AggregateRole::new(ids)
        };

        if let Some(ttl) = self.ttl {
            self.store_in_cache(user_id, &roles, epoch);
            self.sweep_expired(ttl);
        }

        Ok(roles)
    }

    fn store_in_cache(&self, user_id: &UserId, roles: &AggregateRole, epoch: u64) {
        // The shard lock is held while the epoch is compared. An invalidation
        // bumps the epoch before removing, so it either makes this insert
        // skip or waits for it and removes the entry afterwards.
        let entry = self.cache.entry(user_id.clone());
        if self.epoch.load(Ordering::Acquire) != epoch {
            debug!(user = %user_id, "Memberships invalidated during lookup, not cached");
            return;
        }
        let cached = CachedMembership {
            roles: roles.clone(),
            cached_at: Instant::now(),
        };
        match entry {
            Entry::Occupied(mut occupied) => {
                occupied.insert(cached);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(cached);
            }
        }
    }

    /// Drop every expired entry, at most once per TTL.
    fn sweep_expired(&self, ttl: Duration) {
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if last_sweep.elapsed() < ttl {
            return;
        }
        let before = self.cache.len();
        self.cache.retain(|_, cached| cached.cached_at.elapsed() < ttl);
        *last_sweep = Instant::now();
        debug!(evicted = before.saturating_sub(self.cache.len()), "Swept expired memberships");
    }

    fn cached(&self, user_id: &UserId) -> Option<AggregateRole> {
        let ttl = self.ttl?;
        let fresh = {
            let entry = self.cache.get(user_id)?;
            (entry.cached_at.elapsed() < ttl).then(|| entry.roles.clone())
        };
        if fresh.is_none() {
            self.cache
                .remove_if(user_id, |_, cached| cached.cached_at.elapsed() >= ttl);
        }
        fresh
    }

    /// Drop the cached set of one user.
    ///
    /// Lookups still in flight for any user will not cache their result.
    pub fn invalidate_user(&self, user_id: &UserId) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cache.remove(user_id);
    }

    /// Drop every cached set.
    pub fn clear_cache(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cache.clear();
    }

    /// Number of users currently cached.
    pub fn cached_users(&self) -> usize {
        self.cache.len()
    }
}
