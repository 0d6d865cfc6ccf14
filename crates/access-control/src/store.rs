//! AccessStore (component C2): builds and caches per-user [`AccessSet`]s.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{FutureExt, Shared};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use snafu::Snafu;
use tokio::sync::Mutex as AsyncMutex;
use tracing::instrument;

use crate::access_set::{Access, AccessSet, GroupResource};
use crate::rbac_index::{PolicyRule, RbacIndex, ResolvedRole, SubjectKind};

/// An authenticated principal: the identity `AccessFor` resolves permissions
/// for.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct User {
    pub name: String,
    pub groups: Vec<String>,
}

impl User {
    pub fn new(name: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            name: name.into(),
            groups,
        }
    }
}

/// Default cache bounds per spec.md §4.2.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_SIZE: u64 = 50;

#[derive(Clone, Debug, Snafu)]
pub enum Error {
    #[snafu(display("role {role:?} referenced by a binding was not found"))]
    MissingRole { role: String },

    #[snafu(display("role {role:?} in namespace {namespace:?} referenced by a binding was not found"))]
    MissingNamespacedRole { role: String, namespace: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

type BuildResult = Result<Arc<AccessSet>>;
type BuildFuture = Shared<Pin<Box<dyn Future<Output = BuildResult> + Send>>>;

/// Builds, caches, and invalidates [`AccessSet`]s for a given
/// [`SubjectKind`] (human users, or — when fronting a group-oriented lookup
/// — groups themselves).
pub struct AccessStore<I> {
    index: Arc<I>,
    cache: Cache<String, Arc<AccessSet>>,
    inflight: AsyncMutex<HashMap<String, BuildFuture>>,
}

impl<I> AccessStore<I>
where
    I: RbacIndex + 'static,
{
    pub fn new(index: I) -> Self {
        Self::with_bounds(index, DEFAULT_TTL, DEFAULT_MAX_SIZE)
    }

    pub fn with_bounds(index: I, ttl: Duration, max_size: u64) -> Self {
        Self {
            index: Arc::new(index),
            cache: Cache::builder().time_to_live(ttl).max_capacity(max_size).build(),
            inflight: AsyncMutex::new(HashMap::new()),
        }
    }

    /// `CacheKey(user)` — SHA-256 hex fingerprint of the user's resolved
    /// role graph, per spec.md §4.2.
    pub fn cache_key(&self, user: &User) -> String {
        let mut hasher = Sha256::new();
        for (subject, kind) in Self::ordered_subjects(user) {
            for crb in self.index.cluster_role_bindings_for_subject(&subject, kind) {
                let revision = self
                    .index
                    .cluster_role(&crb.role_name)
                    .map(|role| role.resource_version)
                    .unwrap_or_default();
                hasher.update(crb.role_name.as_bytes());
                hasher.update(revision.as_bytes());
                hasher.update([0u8]);
            }
            for rb in self.index.role_bindings_for_subject(&subject, kind) {
                let revision = self
                    .index
                    .role(&rb.namespace, &rb.role_name)
                    .map(|role| role.resource_version)
                    .unwrap_or_default();
                hasher.update(rb.role_name.as_bytes());
                hasher.update(rb.namespace.as_bytes());
                hasher.update(revision.as_bytes());
                hasher.update([0u8]);
            }
        }
        format!("{:x}", hasher.finalize())
    }

    /// `[user.name] ++ sort(user.groups)`, each tagged with the
    /// [`SubjectKind`] an RBAC index lookup for it should use.
    fn ordered_subjects(user: &User) -> Vec<(String, SubjectKind)> {
        let mut groups = user.groups.clone();
        groups.sort();
        let mut subjects = vec![(user.name.clone(), SubjectKind::User)];
        subjects.extend(groups.into_iter().map(|g| (g, SubjectKind::Group)));
        subjects
    }

    /// `AccessFor(user)` — deterministic for identical role-graph state;
    /// single-flighted so N concurrent callers for the same fingerprint
    /// trigger exactly one build (spec.md §4.2, §8 scenario 4).
    #[instrument(skip(self, user), fields(user = %user.name))]
    pub async fn access_for(self: &Arc<Self>, user: &User) -> Result<Arc<AccessSet>> {
        let fingerprint = self.cache_key(user);

        if let Some(hit) = self.cache.get(&fingerprint).await {
            return Ok(hit);
        }

        let shared = {
            let mut inflight = self.inflight.lock().await;
            if let Some(existing) = inflight.get(&fingerprint) {
                existing.clone()
            } else {
                let this = Arc::clone(self);
                let user = user.clone();
                let fingerprint_for_build = fingerprint.clone();
                let fut: Pin<Box<dyn Future<Output = BuildResult> + Send>> =
                    Box::pin(async move { this.build(&user, &fingerprint_for_build).await });
                let shared = fut.shared();
                inflight.insert(fingerprint.clone(), shared.clone());
                shared
            }
        };

        let result = shared.await;

        {
            let mut inflight = self.inflight.lock().await;
            inflight.remove(&fingerprint);
        }

        result
    }

    async fn build(&self, user: &User, fingerprint: &str) -> Result<Arc<AccessSet>> {
        let mut set = AccessSet::new();

        for (subject, kind) in Self::ordered_subjects(user) {
            for crb in self.index.cluster_role_bindings_for_subject(&subject, kind) {
                let role = self.index.cluster_role(&crb.role_name).ok_or_else(|| Error::MissingRole {
                    role: crb.role_name.clone(),
                })?;
                merge_role(&mut set, &role, "*");
            }
            for rb in self.index.role_bindings_for_subject(&subject, kind) {
                let role = self
                    .index
                    .role(&rb.namespace, &rb.role_name)
                    .ok_or_else(|| Error::MissingNamespacedRole {
                        role: rb.role_name.clone(),
                        namespace: rb.namespace.clone(),
                    })?;
                merge_role(&mut set, &role, &rb.namespace);
            }
        }

        set.set_id(fingerprint);
        let set = Arc::new(set);
        self.cache.insert(fingerprint.to_string(), Arc::clone(&set)).await;
        Ok(set)
    }

    /// `PurgeUserData(id)` — evicts any cached AccessSet with matching
    /// fingerprint (user logout, role change).
    #[instrument(skip(self))]
    pub async fn purge_user_data(&self, fingerprint: &str) {
        self.cache.invalidate(fingerprint).await;
    }
}

/// Expands a resolved role's rules into `Access`/non-resource grants and
/// merges them into `set`, per spec.md §3's PolicyRule expansion.
fn merge_role(set: &mut AccessSet, role: &ResolvedRole, namespace: &str) {
    for rule in &role.rules {
        expand_rule(set, rule, namespace);
    }
}

fn expand_rule(set: &mut AccessSet, rule: &PolicyRule, namespace: &str) {
    if !rule.non_resource_urls.is_empty() {
        set.add_non_resource_urls(&rule.verbs, &rule.non_resource_urls);
    }

    if rule.resources.is_empty() || rule.api_groups.is_empty() {
        return;
    }

    let names: Vec<&str> = if rule.resource_names.is_empty() {
        vec!["*"]
    } else {
        rule.resource_names.iter().map(String::as_str).collect()
    };

    for group in &rule.api_groups {
        for resource in &rule.resources {
            for name in &names {
                for verb in &rule.verbs {
                    set.add(
                        verb.clone(),
                        GroupResource::new(group.clone(), resource.clone()),
                        Access::new(namespace, *name),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::rbac_index::{ClusterRoleBindingFixture, RoleBindingFixture, StaticRbacIndex};

    use super::*;

    fn fixture() -> StaticRbacIndex {
        StaticRbacIndex::new()
            .with_cluster_role_binding(ClusterRoleBindingFixture::new("testcrb").with_user("user-12345"))
            .with_role_binding(RoleBindingFixture::new("testrb", "testns").with_user("user-12345"))
            .with_cluster_role(
                "testclusterrole",
                "testclusterrolerev",
                vec![PolicyRule {
                    api_groups: vec!["".into()],
                    resources: vec!["pods".into()],
                    verbs: vec!["get".into()],
                    ..Default::default()
                }],
            )
            .with_role(
                "testns",
                "testrole",
                "testnstestrolerev",
                vec![PolicyRule {
                    api_groups: vec!["".into()],
                    resources: vec!["configmaps".into()],
                    verbs: vec!["list".into()],
                    ..Default::default()
                }],
            )
    }

    fn expected_fingerprint() -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"testclusterrole");
        hasher.update(b"testclusterrolerev");
        hasher.update([0u8]);
        hasher.update(b"testrole");
        hasher.update(b"testns");
        hasher.update(b"testnstestrolerev");
        hasher.update([0u8]);
        format!("{:x}", hasher.finalize())
    }

    #[tokio::test]
    async fn deterministic_fingerprint_matches_scenario_1() {
        let store = Arc::new(AccessStore::new(fixture()));
        let user = User::new("user-12345", vec!["users".into(), "mygroup".into()]);

        let expected = expected_fingerprint();
        for _ in 0..5 {
            assert_eq!(store.cache_key(&user), expected);
        }
    }

    #[tokio::test]
    async fn group_order_independent() {
        let store = Arc::new(AccessStore::new(fixture()));
        let a = User::new("user-12345", vec!["a".into(), "b".into()]);
        let b = User::new("user-12345", vec!["b".into(), "a".into()]);
        assert_eq!(store.cache_key(&a), store.cache_key(&b));
    }

    #[tokio::test]
    async fn role_revision_change_invalidates_fingerprint() {
        let store_a = Arc::new(AccessStore::new(fixture()));
        let user = User::new("user-12345", vec![]);
        let fp_a = store_a.cache_key(&user);

        let changed = StaticRbacIndex::new()
            .with_cluster_role_binding(ClusterRoleBindingFixture::new("testcrb").with_user("user-12345"))
            .with_role_binding(RoleBindingFixture::new("testrb", "testns").with_user("user-12345"))
            .with_cluster_role("testclusterrole", "rev2", vec![])
            .with_role("testns", "testrole", "testnstestrolerev", vec![]);
        let store_b = Arc::new(AccessStore::new(changed));
        let fp_b = store_b.cache_key(&user);

        assert_ne!(fp_a, fp_b);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_access_for_single_flights() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Default)]
        struct CountingIndex {
            inner: StaticRbacIndex,
            builds: Arc<AtomicUsize>,
        }

        impl RbacIndex for CountingIndex {
            fn cluster_role_bindings_for_subject(
                &self,
                subject: &str,
                kind: SubjectKind,
            ) -> Vec<crate::rbac_index::ClusterRoleBindingRef> {
                self.inner.cluster_role_bindings_for_subject(subject, kind)
            }

            fn role_bindings_for_subject(
                &self,
                subject: &str,
                kind: SubjectKind,
            ) -> Vec<crate::rbac_index::RoleBindingRef> {
                self.inner.role_bindings_for_subject(subject, kind)
            }

            fn cluster_role(&self, name: &str) -> Option<ResolvedRole> {
                self.builds.fetch_add(1, Ordering::SeqCst);
                self.inner.cluster_role(name)
            }

            fn role(&self, namespace: &str, name: &str) -> Option<ResolvedRole> {
                self.inner.role(namespace, name)
            }
        }

        let builds = Arc::new(AtomicUsize::new(0));
        let index = CountingIndex {
            inner: fixture(),
            builds: Arc::clone(&builds),
        };
        let store = Arc::new(AccessStore::new(index));
        let user = User::new("user-12345", vec![]);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let store = Arc::clone(&store);
            let user = user.clone();
            handles.push(tokio::spawn(async move { store.access_for(&user).await }));
        }
        for handle in handles {
            handle.await.expect("task panicked").expect("build failed");
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}
