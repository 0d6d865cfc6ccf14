//! ListCache (component C6): caches aggregated list results keyed by
//! resource identity, partitions, and access fingerprint, per spec.md §4.6.
//!
//! Two selectable backends, chosen by the `CATTLE_STEVE_CACHE_BACKEND`
//! environment variable: an expiring-only cache (the default, unbounded
//! size, entries age out after a TTL) and an LRU-with-expiry cache (bounded
//! size, entries are also evicted on a TTL). `CATTLE_REQUEST_CACHE_DISABLED`
//! bypasses caching entirely regardless of backend. Modeled on the
//! `moka::future::Cache` usage in this workspace's `access-control` crate.

use std::collections::BTreeMap;
use std::env;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;

/// Default bounds for the LRU-with-expiry backend. The expiring-only backend
/// shares the TTL but has no size cap.
const DEFAULT_TTL: Duration = Duration::from_secs(60);
const DEFAULT_LRU_MAX_SIZE: u64 = 1000;

const BACKEND_ENV_VAR: &str = "CATTLE_STEVE_CACHE_BACKEND";
const DISABLED_ENV_VAR: &str = "CATTLE_REQUEST_CACHE_DISABLED";

/// The composite key an aggregated list result is cached under: the resource
/// kind, the serialized partition list, the requesting user's access
/// fingerprint, the resource revision the result is consistent as-of, and the
/// normalized filter set. Two requests hit the same cached page iff every
/// field is equal (spec.md §3, §6); including `revision` means a role or
/// object change that bumps the revision naturally invalidates prior entries
/// without an explicit purge (spec.md §8).
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ListCacheKey {
    pub group_resource: String,
    pub partitions_fingerprint: String,
    pub access_fingerprint: String,
    pub revision: String,
    pub filters: BTreeMap<String, String>,
    pub limit: Option<i64>,
    pub continue_token: Option<String>,
}

impl ListCacheKey {
    /// Collapses to a single string so both cache backends can share one
    /// `Cache<String, V>` shape.
    pub fn to_cache_string(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        self.group_resource.hash(&mut hasher);
        self.partitions_fingerprint.hash(&mut hasher);
        self.access_fingerprint.hash(&mut hasher);
        self.revision.hash(&mut hasher);
        for (name, value) in &self.filters {
            name.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        self.limit.hash(&mut hasher);
        self.continue_token.hash(&mut hasher);
        format!(
            "{}:{:x}",
            self.group_resource,
            hasher.finish()
        )
    }
}

/// Which of the two selectable backends `ListCache` is built with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheBackend {
    /// TTL-only, unbounded size. The default when `CATTLE_STEVE_CACHE_BACKEND`
    /// is unset or empty.
    ExpiringOnly,
    /// Bounded size with least-recently-used eviction, plus the same TTL.
    /// Selected by `CATTLE_STEVE_CACHE_BACKEND=LRU` (case-insensitive).
    LruWithExpiry,
}

impl CacheBackend {
    /// Reads `CATTLE_STEVE_CACHE_BACKEND` from the process environment and
    /// resolves it to a backend choice. Any value other than a
    /// case-insensitive `"lru"` (including unset/empty) selects
    /// [`CacheBackend::ExpiringOnly`].
    pub fn from_env() -> Self {
        match env::var(BACKEND_ENV_VAR) {
            Ok(value) if value.trim().eq_ignore_ascii_case("lru") => CacheBackend::LruWithExpiry,
            _ => CacheBackend::ExpiringOnly,
        }
    }
}

/// Returns `true` if `CATTLE_REQUEST_CACHE_DISABLED` is set to a truthy
/// value, in which case [`ListCache`] should be bypassed entirely.
pub fn caching_disabled() -> bool {
    match env::var(DISABLED_ENV_VAR) {
        Ok(value) => {
            let value = value.trim();
            !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
        }
        Err(_) => false,
    }
}

/// Cache of aggregated list results. `V` is typically an
/// `Arc<crate::lister::AggregatedList<T>>` for some resource type `T`.
pub struct ListCache<V> {
    backend: CacheBackend,
    cache: Cache<String, V>,
}

impl<V> ListCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_backend(CacheBackend::from_env())
    }

    pub fn with_backend(backend: CacheBackend) -> Self {
        let cache = match backend {
            CacheBackend::ExpiringOnly => Cache::builder().time_to_live(DEFAULT_TTL).build(),
            CacheBackend::LruWithExpiry => Cache::builder()
                .time_to_live(DEFAULT_TTL)
                .max_capacity(DEFAULT_LRU_MAX_SIZE)
                .build(),
        };
        Self { backend, cache }
    }

    pub fn backend(&self) -> CacheBackend {
        self.backend
    }

    /// `Get(key)`. Always misses when caching has been disabled via
    /// `CATTLE_REQUEST_CACHE_DISABLED`, even if entries were inserted
    /// earlier (callers should also skip inserting in that case).
    pub async fn get(&self, key: &ListCacheKey) -> Option<V> {
        if caching_disabled() {
            return None;
        }
        self.cache.get(&key.to_cache_string()).await
    }

    pub async fn insert(&self, key: &ListCacheKey, value: V) {
        if caching_disabled() {
            return;
        }
        self.cache.insert(key.to_cache_string(), value).await;
    }

    /// Evicts one cached entry directly by key — used when a caller already
    /// knows exactly which list result a role or object change invalidated.
    /// Broader access-fingerprint invalidation relies on the cache's TTL
    /// rather than a reverse index, since a fingerprint maps to many keys.
    pub async fn invalidate(&self, key: &ListCacheKey) {
        self.cache.invalidate(&key.to_cache_string()).await;
    }
}

impl<V> Default for ListCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_defaults_to_expiring_only_when_unset() {
        // SAFETY: tests run single-threaded within this module's env scope
        // by convention; this test only reads the default absent-var case.
        assert_eq!(CacheBackend::from_env(), CacheBackend::ExpiringOnly);
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let cache: ListCache<i32> = ListCache::with_backend(CacheBackend::ExpiringOnly);
        let key = ListCacheKey {
            group_resource: "pods".into(),
            partitions_fingerprint: "p1".into(),
            access_fingerprint: "a1".into(),
            revision: "rev1".into(),
            filters: BTreeMap::new(),
            limit: None,
            continue_token: None,
        };
        assert!(cache.get(&key).await.is_none());
        cache.insert(&key, 42).await;
        assert_eq!(cache.get(&key).await, Some(42));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_collide() {
        let cache: ListCache<i32> = ListCache::with_backend(CacheBackend::LruWithExpiry);
        let key_a = ListCacheKey {
            group_resource: "pods".into(),
            partitions_fingerprint: "p1".into(),
            access_fingerprint: "a1".into(),
            revision: "rev1".into(),
            filters: BTreeMap::new(),
            limit: None,
            continue_token: None,
        };
        let mut key_b = key_a.clone();
        key_b.access_fingerprint = "a2".into();

        cache.insert(&key_a, 1).await;
        cache.insert(&key_b, 2).await;
        assert_eq!(cache.get(&key_a).await, Some(1));
        assert_eq!(cache.get(&key_b).await, Some(2));

        let mut key_c = key_a.clone();
        key_c.revision = "rev2".into();
        assert!(cache.get(&key_c).await.is_none());

        let mut key_d = key_a.clone();
        key_d.filters.insert("status.phase".into(), "Running".into());
        assert!(cache.get(&key_d).await.is_none());
    }
}
