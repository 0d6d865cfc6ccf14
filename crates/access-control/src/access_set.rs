//! The immutable permission-set value type (component C1).
//!
//! An [`AccessSet`] is the result of resolving a principal's role graph: a
//! map from `(verb, group/resource)` to the set of `(namespace, name)` tuples
//! that verb is granted on, plus a parallel set of non-resource URL grants.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

const WILDCARD: &str = "*";

/// A `(apiGroup, resource)` pair, e.g. `("apps", "deployments")` or
/// `("", "pods")` for the core group.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }

    /// The eight `(verb, group, resource)` combinations that a concrete
    /// `(verb, group, resource)` triple can be satisfied by, widest first.
    fn wildcard_expansions<'a>(verb: &'a str, group: &'a str, resource: &'a str) -> [(&'a str, &'a str, &'a str); 8] {
        [
            (WILDCARD, WILDCARD, WILDCARD),
            (WILDCARD, WILDCARD, resource),
            (WILDCARD, group, WILDCARD),
            (WILDCARD, group, resource),
            (verb, WILDCARD, WILDCARD),
            (verb, WILDCARD, resource),
            (verb, group, WILDCARD),
            (verb, group, resource),
        ]
    }
}

/// A single `(namespace, name)` grant, wildcard in either slot.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Access {
    pub namespace: String,
    pub name: String,
}

impl Access {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// `Grants(ns, name)` per spec §3: wildcard namespace/name match anything.
    pub fn grants(&self, namespace: &str, name: &str) -> bool {
        (self.namespace == WILDCARD || self.namespace == namespace)
            && (self.name == WILDCARD || self.name == name)
    }
}

/// A `(verb, urlPattern)` grant over non-resource URLs (e.g. `/healthz`,
/// `/apis/*`).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct NonResourceAccess {
    pub verb: String,
    pub url_pattern: String,
}

impl NonResourceAccess {
    pub fn new(verb: impl Into<String>, url_pattern: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            url_pattern: url_pattern.into(),
        }
    }

    /// `Grants(v, p)` per spec §3. A lone `/*` is explicitly disallowed and
    /// matches nothing, even though the prefix rule below would otherwise
    /// let it match every path; see the open question in `spec.md` §9.
    pub fn grants(&self, verb: &str, path: &str) -> bool {
        if self.url_pattern == "/*" {
            return false;
        }

        let verb_matches = self.verb == WILDCARD || self.verb == verb;
        if !verb_matches {
            return false;
        }

        if self.url_pattern == path {
            return true;
        }

        self.url_pattern
            .strip_suffix("/*")
            .is_some_and(|prefix| path.starts_with(prefix))
    }
}

/// Immutable per-principal permission set.
///
/// `resource_set` and `non_resource_set` are only ever grown via [`Self::add`],
/// [`Self::add_non_resource_urls`], and [`Self::merge`]; once `id` has been
/// assigned (by [`crate::store::AccessStore`]) the value is published and
/// must not be mutated further.
#[derive(Clone, Debug, Default)]
pub struct AccessSet {
    resource_set: HashMap<(String, GroupResource), BTreeSet<Access>>,
    non_resource_set: BTreeSet<NonResourceAccess>,
    id: Option<String>,
}

impl AccessSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assigns the set's stable fingerprint. Idempotent: assigning the same
    /// id twice is a no-op, assigning a different one is a logic error in
    /// the caller (an `AccessSet` is published under exactly one fingerprint).
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// `Add(verb, groupResource, access)` — idempotent insert.
    pub fn add(&mut self, verb: impl Into<String>, group_resource: GroupResource, access: Access) {
        self.resource_set
            .entry((verb.into(), group_resource))
            .or_default()
            .insert(access);
    }

    /// `AddNonResourceURLs(verbs[], urls[])` — cartesian product; a no-op if
    /// either list is empty.
    pub fn add_non_resource_urls<V, U>(&mut self, verbs: &[V], urls: &[U])
    where
        V: AsRef<str>,
        U: AsRef<str>,
    {
        if verbs.is_empty() || urls.is_empty() {
            return;
        }

        for verb in verbs {
            for url in urls {
                self.non_resource_set
                    .insert(NonResourceAccess::new(verb.as_ref(), url.as_ref()));
            }
        }
    }

    /// `Merge(other)` — union in place. Preserves `id` iff it was not yet
    /// assigned; merging into an already-published set is only legal during
    /// construction, before the set is shared (spec §5).
    pub fn merge(&mut self, other: &AccessSet) {
        for (key, accesses) in &other.resource_set {
            let entry = self.resource_set.entry(key.clone()).or_default();
            for access in accesses {
                entry.insert(access.clone());
            }
        }
        for nra in &other.non_resource_set {
            self.non_resource_set.insert(nra.clone());
        }
    }

    /// `AccessListFor(verb, groupResource)` — union over the wildcard
    /// expansions `v ∈ {*, verb}`, `g ∈ {*, group}`, `r ∈ {*, resource}`.
    pub fn access_list_for(&self, verb: &str, group_resource: &GroupResource) -> BTreeSet<Access> {
        let mut out = BTreeSet::new();
        for (v, g, r) in
            GroupResource::wildcard_expansions(verb, &group_resource.group, &group_resource.resource)
        {
            if let Some(accesses) = self
                .resource_set
                .get(&(v.to_string(), GroupResource::new(g, r)))
            {
                out.extend(accesses.iter().cloned());
            }
        }
        out
    }

    /// `Grants(verb, groupResource, ns, name)` — true iff any `Access`
    /// reachable via [`Self::access_list_for`] satisfies `Access::grants`.
    pub fn grants(&self, verb: &str, group_resource: &GroupResource, namespace: &str, name: &str) -> bool {
        self.access_list_for(verb, group_resource)
            .iter()
            .any(|access| access.grants(namespace, name))
    }

    /// `GrantsNonResource(verb, url)`.
    pub fn grants_non_resource(&self, verb: &str, url: &str) -> bool {
        self.non_resource_set.iter().any(|nra| nra.grants(verb, url))
    }

    /// True iff some entry grants `verb` on every namespace and every name of
    /// `group_resource` — the passthrough condition the Partitioner (C4)
    /// checks before bothering to compute per-namespace partitions.
    pub fn grants_all(&self, verb: &str, group_resource: &GroupResource) -> bool {
        self.access_list_for(verb, group_resource)
            .iter()
            .any(|access| access.namespace == WILDCARD && access.name == WILDCARD)
    }

    /// All namespaces for which `verb` grants something on `group_resource`,
    /// together with whether the grant is the whole namespace (`all`) or a
    /// concrete set of names. Returns `None` for the wildcard ("*") namespace
    /// grant, signalling cluster-wide, to keep it distinct from a concrete
    /// namespace named `"*"` (which cannot occur from real RBAC objects).
    pub fn namespaced_grants(&self, verb: &str, group_resource: &GroupResource) -> Vec<NamespaceGrant> {
        let mut by_ns: HashMap<String, NamespaceGrant> = HashMap::new();
        for access in self.access_list_for(verb, group_resource) {
            let grant = by_ns
                .entry(access.namespace.clone())
                .or_insert_with(|| NamespaceGrant {
                    namespace: access.namespace.clone(),
                    all: false,
                    names: BTreeSet::new(),
                });
            if access.name == WILDCARD {
                grant.all = true;
            } else {
                grant.names.insert(access.name.clone());
            }
        }
        let mut grants: Vec<_> = by_ns.into_values().collect();
        grants.sort_by(|a, b| a.namespace.cmp(&b.namespace));
        grants
    }
}

/// A resolved per-namespace (or cluster-wide, namespace `"*"`) grant used by
/// the Partitioner (C4) to build a [`crate::Partition`] list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NamespaceGrant {
    pub namespace: String,
    pub all: bool,
    pub names: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gr(group: &str, resource: &str) -> GroupResource {
        GroupResource::new(group, resource)
    }

    #[test]
    fn access_wildcards() {
        let a = Access::new("*", "*");
        assert!(a.grants("ns1", "name1"));
        let b = Access::new("ns1", "*");
        assert!(b.grants("ns1", "anything"));
        assert!(!b.grants("ns2", "anything"));
        let c = Access::new("ns1", "name1");
        assert!(c.grants("ns1", "name1"));
        assert!(!c.grants("ns1", "name2"));
    }

    #[test]
    fn non_resource_lone_wildcard_matches_nothing() {
        let rule = NonResourceAccess::new("*", "/*");
        assert!(!rule.grants("get", "/healthz"));
        assert!(!rule.grants("get", "/"));
    }

    #[test]
    fn non_resource_prefix_match() {
        let rule = NonResourceAccess::new("get", "/apis/*");
        assert!(rule.grants("get", "/apis/foo"));
        assert!(!rule.grants("get", "/api/foo"));
        assert!(!rule.grants("post", "/apis/foo"));
    }

    #[test]
    fn grants_via_wildcard_verb_and_group() {
        let mut set = AccessSet::new();
        set.add("*", gr("*", "*"), Access::new("*", "*"));
        assert!(set.grants("get", &gr("apps", "deployments"), "default", "foo"));
    }

    #[test]
    fn merge_is_commutative_and_idempotent() {
        let mut a = AccessSet::new();
        a.add("get", gr("", "pods"), Access::new("ns1", "*"));

        let mut b = AccessSet::new();
        b.add("list", gr("", "pods"), Access::new("ns2", "*"));

        let mut a_then_b = a.clone();
        a_then_b.merge(&b);

        let mut b_then_a = b.clone();
        b_then_a.merge(&a);

        assert_eq!(
            a_then_b.access_list_for("get", &gr("", "pods")),
            b_then_a.access_list_for("get", &gr("", "pods"))
        );
        assert_eq!(
            a_then_b.access_list_for("list", &gr("", "pods")),
            b_then_a.access_list_for("list", &gr("", "pods"))
        );

        let mut doubled = a_then_b.clone();
        doubled.merge(&a_then_b.clone());
        assert_eq!(
            doubled.access_list_for("get", &gr("", "pods")),
            a_then_b.access_list_for("get", &gr("", "pods"))
        );
    }

    #[test]
    fn add_non_resource_urls_noop_on_empty_list() {
        let mut set = AccessSet::new();
        set.add_non_resource_urls::<&str, &str>(&[], &["/healthz"]);
        set.add_non_resource_urls::<&str, &str>(&["get"], &[]);
        assert!(!set.grants_non_resource("get", "/healthz"));
    }
}
