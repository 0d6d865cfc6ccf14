//! Authorizer (component C3): maps a request onto the AccessSet it should be
//! checked against.

use crate::access_set::{AccessSet, GroupResource};

/// The target of an authorization check: either a Kubernetes-style resource
/// request or a non-resource URL request (spec.md §4.3).
#[derive(Clone, Debug)]
pub enum RequestTarget {
    Resource {
        group_resource: GroupResource,
        namespace: String,
        name: String,
    },
    NonResource {
        path: String,
    },
}

/// A single authorization request: a verb plus its target.
#[derive(Clone, Debug)]
pub struct Request {
    pub verb: String,
    pub target: RequestTarget,
}

impl Request {
    pub fn resource(
        verb: impl Into<String>,
        group_resource: GroupResource,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            verb: verb.into(),
            target: RequestTarget::Resource {
                group_resource,
                namespace: namespace.into(),
                name: name.into(),
            },
        }
    }

    pub fn non_resource(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            target: RequestTarget::NonResource { path: path.into() },
        }
    }
}

/// The result of an authorization check. Never an error: `Authorize` always
/// produces a decision (spec.md §4.3, §7).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Stateless decision function over an [`AccessSet`]. Constructed fresh per
/// request (it owns no state of its own) so it can never drift from the
/// AccessSet it was given.
pub struct Authorizer<'a> {
    access_set: &'a AccessSet,
}

impl<'a> Authorizer<'a> {
    pub fn new(access_set: &'a AccessSet) -> Self {
        Self { access_set }
    }

    /// `Authorize(request) -> {Allow, Deny}`.
    pub fn authorize(&self, request: &Request) -> Decision {
        let allowed = match &request.target {
            RequestTarget::Resource {
                group_resource,
                namespace,
                name,
            } => self
                .access_set
                .grants(&request.verb, group_resource, namespace, name),
            RequestTarget::NonResource { path } => {
                self.access_set.grants_non_resource(&request.verb, path)
            }
        };

        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_set::Access;

    #[test]
    fn authorize_agrees_with_access_set_grants() {
        let mut set = AccessSet::new();
        set.add("get", GroupResource::new("", "pods"), Access::new("ns1", "*"));

        let authz = Authorizer::new(&set);
        let req = Request::resource("get", GroupResource::new("", "pods"), "ns1", "foo");
        assert_eq!(authz.authorize(&req), Decision::Allow);

        let denied = Request::resource("get", GroupResource::new("", "pods"), "ns2", "foo");
        assert_eq!(authz.authorize(&denied), Decision::Deny);
    }

    #[test]
    fn authorize_non_resource() {
        let mut set = AccessSet::new();
        set.add_non_resource_urls(&["get"], &["/healthz"]);
        let authz = Authorizer::new(&set);

        assert_eq!(authz.authorize(&Request::non_resource("get", "/healthz")), Decision::Allow);
        assert_eq!(authz.authorize(&Request::non_resource("post", "/healthz")), Decision::Deny);
    }
}
