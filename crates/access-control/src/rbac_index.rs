//! The RBAC informer capability AccessStore (C2) consumes.
//!
//! `spec.md` §1 treats Role/RoleBinding/ClusterRole/ClusterRoleBinding
//! informers as an external collaborator exposing "four lookup methods"
//! without naming them; [`RbacIndex`] is that contract, named so it can be
//! implemented and tested. Production wiring against live informers is out of
//! scope (spec.md §1); [`StaticRbacIndex`] is the in-memory fixture used by
//! this workspace's tests and by `aggregation-server`'s examples.

use std::collections::BTreeMap;

/// Whether a subject lookup is for a human/service-account principal
/// ("User" kind) or for one of that principal's groups ("Group" kind).
///
/// Service-account subjects in role bindings are only synthesized into the
/// `serviceaccount:<ns>:<name>` identifier for `User`-kind lookups; a
/// `Group`-kind lookup ignores them (spec.md §4.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubjectKind {
    User,
    Group,
}

/// A policy rule as carried by a `Role`/`ClusterRole`, pre-expansion.
#[derive(Clone, Debug, Default)]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub resource_names: Vec<String>,
    pub verbs: Vec<String>,
    pub non_resource_urls: Vec<String>,
}

/// A `Role` or `ClusterRole`, resolved to its current `rules` and
/// `resourceVersion`.
#[derive(Clone, Debug)]
pub struct ResolvedRole {
    pub name: String,
    pub namespace: Option<String>,
    pub resource_version: String,
    pub rules: Vec<PolicyRule>,
}

/// A `ClusterRoleBinding` reference, as returned by a subject lookup.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct ClusterRoleBindingRef {
    pub role_name: String,
}

/// A `RoleBinding` reference, as returned by a subject lookup.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct RoleBindingRef {
    pub role_name: String,
    pub namespace: String,
}

/// The four lookups an RBAC informer must expose for AccessStore to resolve
/// a principal's role graph. Implementations must return bindings in a
/// deterministic order (spec.md §4.2's fingerprint depends on it).
pub trait RbacIndex: Send + Sync {
    fn cluster_role_bindings_for_subject(
        &self,
        subject: &str,
        kind: SubjectKind,
    ) -> Vec<ClusterRoleBindingRef>;

    fn role_bindings_for_subject(&self, subject: &str, kind: SubjectKind) -> Vec<RoleBindingRef>;

    fn cluster_role(&self, name: &str) -> Option<ResolvedRole>;

    fn role(&self, namespace: &str, name: &str) -> Option<ResolvedRole>;
}

#[derive(Clone, Debug)]
struct BoundSubject {
    kind: BindingSubjectKind,
    name: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BindingSubjectKind {
    User,
    Group,
    ServiceAccount { namespace_matches_binding: bool },
}

/// A fixture `ClusterRoleBinding`: subjects plus the cluster role they bind.
#[derive(Clone, Debug)]
pub struct ClusterRoleBindingFixture {
    pub role_name: String,
    subjects: Vec<BoundSubject>,
}

impl ClusterRoleBindingFixture {
    pub fn new(role_name: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            subjects: Vec::new(),
        }
    }

    pub fn with_user(mut self, name: impl Into<String>) -> Self {
        self.subjects.push(BoundSubject {
            kind: BindingSubjectKind::User,
            name: name.into(),
        });
        self
    }

    pub fn with_group(mut self, name: impl Into<String>) -> Self {
        self.subjects.push(BoundSubject {
            kind: BindingSubjectKind::Group,
            name: name.into(),
        });
        self
    }

    pub fn with_service_account(mut self, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        self.subjects.push(BoundSubject {
            kind: BindingSubjectKind::ServiceAccount {
                namespace_matches_binding: false,
            },
            name: format!("{}:{}", namespace.into(), name.into()),
        });
        self
    }
}

/// A fixture `RoleBinding`: subjects, namespace, plus the role they bind.
#[derive(Clone, Debug)]
pub struct RoleBindingFixture {
    pub role_name: String,
    pub namespace: String,
    subjects: Vec<BoundSubject>,
}

impl RoleBindingFixture {
    pub fn new(role_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            namespace: namespace.into(),
            subjects: Vec::new(),
        }
    }

    pub fn with_user(mut self, name: impl Into<String>) -> Self {
        self.subjects.push(BoundSubject {
            kind: BindingSubjectKind::User,
            name: name.into(),
        });
        self
    }

    pub fn with_group(mut self, name: impl Into<String>) -> Self {
        self.subjects.push(BoundSubject {
            kind: BindingSubjectKind::Group,
            name: name.into(),
        });
        self
    }

    pub fn with_service_account(mut self, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        self.subjects.push(BoundSubject {
            kind: BindingSubjectKind::ServiceAccount {
                namespace_matches_binding: false,
            },
            name: format!("{}:{}", namespace.into(), name.into()),
        });
        self
    }
}

/// In-memory, deterministically ordered [`RbacIndex`] used by tests and by
/// `aggregation-server`'s standalone examples. Bindings and roles are indexed
/// by name on insertion so lookups don't depend on insertion order.
#[derive(Clone, Debug, Default)]
pub struct StaticRbacIndex {
    cluster_role_bindings: Vec<ClusterRoleBindingFixture>,
    role_bindings: Vec<RoleBindingFixture>,
    cluster_roles: BTreeMap<String, ResolvedRole>,
    roles: BTreeMap<(String, String), ResolvedRole>,
}

impl StaticRbacIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster_role_binding(mut self, binding: ClusterRoleBindingFixture) -> Self {
        self.cluster_role_bindings.push(binding);
        self
    }

    pub fn with_role_binding(mut self, binding: RoleBindingFixture) -> Self {
        self.role_bindings.push(binding);
        self
    }

    pub fn with_cluster_role(
        mut self,
        name: impl Into<String>,
        resource_version: impl Into<String>,
        rules: Vec<PolicyRule>,
    ) -> Self {
        let name = name.into();
        self.cluster_roles.insert(
            name.clone(),
            ResolvedRole {
                name,
                namespace: None,
                resource_version: resource_version.into(),
                rules,
            },
        );
        self
    }

    pub fn with_role(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        resource_version: impl Into<String>,
        rules: Vec<PolicyRule>,
    ) -> Self {
        let namespace = namespace.into();
        let name = name.into();
        self.roles.insert(
            (namespace.clone(), name.clone()),
            ResolvedRole {
                name,
                namespace: Some(namespace),
                resource_version: resource_version.into(),
                rules,
            },
        );
        self
    }

    fn subject_matches(bound: &BoundSubject, subject: &str, kind: SubjectKind) -> bool {
        match (bound.kind, kind) {
            (BindingSubjectKind::User, SubjectKind::User) => bound.name == subject,
            (BindingSubjectKind::Group, SubjectKind::Group) => bound.name == subject,
            // Service-account subjects only resolve for User-kind lookups, where
            // `subject` is expected to be the synthesized "serviceaccount:ns:name"
            // identifier (spec.md §4.2).
            (BindingSubjectKind::ServiceAccount { .. }, SubjectKind::User) => {
                format!("serviceaccount:{}", bound.name) == subject
            }
            _ => false,
        }
    }
}

impl RbacIndex for StaticRbacIndex {
    fn cluster_role_bindings_for_subject(
        &self,
        subject: &str,
        kind: SubjectKind,
    ) -> Vec<ClusterRoleBindingRef> {
        let mut out: Vec<_> = self
            .cluster_role_bindings
            .iter()
            .filter(|binding| binding.subjects.iter().any(|s| Self::subject_matches(s, subject, kind)))
            .map(|binding| ClusterRoleBindingRef {
                role_name: binding.role_name.clone(),
            })
            .collect();
        out.sort();
        out
    }

    fn role_bindings_for_subject(&self, subject: &str, kind: SubjectKind) -> Vec<RoleBindingRef> {
        let mut out: Vec<_> = self
            .role_bindings
            .iter()
            .filter(|binding| binding.subjects.iter().any(|s| Self::subject_matches(s, subject, kind)))
            .map(|binding| RoleBindingRef {
                role_name: binding.role_name.clone(),
                namespace: binding.namespace.clone(),
            })
            .collect();
        out.sort();
        out
    }

    fn cluster_role(&self, name: &str) -> Option<ResolvedRole> {
        self.cluster_roles.get(name).cloned()
    }

    fn role(&self, namespace: &str, name: &str) -> Option<ResolvedRole> {
        self.roles.get(&(namespace.to_string(), name.to_string())).cloned()
    }
}
