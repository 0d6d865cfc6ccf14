//! RBAC evaluation core: derives, caches, and checks per-user permission
//! sets over Kubernetes resources.
//!
//! This crate implements components C1–C3 of the aggregation layer core:
//! [`AccessSet`] (the permission value type), [`AccessStore`] (builds and
//! caches an `AccessSet` per user, keyed by a content hash of the user's
//! resolved role graph), and [`Authorizer`] (maps a request onto an
//! allow/deny decision against an `AccessSet`).

pub mod access_set;
pub mod authorizer;
pub mod rbac_index;
pub mod store;

pub use access_set::{Access, AccessSet, GroupResource, NamespaceGrant, NonResourceAccess};
pub use authorizer::{Authorizer, Decision, Request, RequestTarget};
pub use rbac_index::{
    ClusterRoleBindingFixture, ClusterRoleBindingRef, PolicyRule, RbacIndex, ResolvedRole,
    RoleBindingFixture, RoleBindingRef, StaticRbacIndex, SubjectKind,
};
pub use store::{AccessStore, User};
