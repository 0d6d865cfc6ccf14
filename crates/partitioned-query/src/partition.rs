//! The [`Partition`] value type and [`Partitioner`] (component C4): turns an
//! [`AccessSet`] plus a request shape into the minimal ordered list of
//! query partitions a [`crate::lister::PartitionedLister`] will execute.

use std::collections::BTreeSet;

use access_control::{AccessSet, GroupResource};

/// A minimal namespace/name scope used to chunk a list/watch query.
/// Request-scoped; never shared across requests (spec.md §3).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Partition {
    pub namespace: String,
    pub all: bool,
    pub passthrough: bool,
    pub names: BTreeSet<String>,
}

impl Partition {
    /// "No filter; query backend directly" — used when an AccessSet grants
    /// the verb globally, or for verbs that delegate per-object enforcement
    /// to the backend (get/create/update/delete).
    pub fn passthrough() -> Self {
        Self {
            passthrough: true,
            ..Default::default()
        }
    }
}

/// Which verb a [`PartitionRequest`] is being partitioned for. `List` and
/// `Watch` are computed per spec.md §4.4; the mutating/single-object verbs
/// always resolve to [`Partition::passthrough`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verb {
    List,
    Watch,
    Get,
    Create,
    Update,
    Delete,
}

impl Verb {
    fn as_rbac_verb(self) -> &'static str {
        match self {
            Verb::List => "list",
            Verb::Watch => "watch",
            Verb::Get => "get",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
        }
    }
}

/// A single-object identifier as embedded in a request path, e.g.
/// `/namespaces/{ns}/{resource}/{name}`.
#[derive(Clone, Debug)]
pub enum ObjectId {
    Namespaced { namespace: String, name: String },
    ClusterScoped { name: String },
}

/// The shape of a request the Partitioner needs in order to compute
/// partitions: the verb, the target group/resource, whether that resource
/// kind is namespaced, the request's own namespace scope (if any), and a
/// single-object id if the request targets exactly one object.
#[derive(Clone, Debug)]
pub struct PartitionRequest {
    pub verb: Verb,
    pub group_resource: GroupResource,
    pub namespaced: bool,
    pub request_namespace: Option<String>,
    pub object_id: Option<ObjectId>,
}

/// A non-fatal observation surfaced alongside a partition list — currently
/// only used for the deprecated id/request namespace disagreement flagged in
/// spec.md §9 as a REDESIGN FLAG.
#[derive(Clone, Debug)]
pub struct PartitionWarning {
    pub message: String,
}

pub struct Partitioner;

impl Partitioner {
    /// Computes the ordered partition list for `request` against
    /// `access_set`, per spec.md §4.4.
    pub fn partition(access_set: &AccessSet, request: &PartitionRequest) -> (Vec<Partition>, Vec<PartitionWarning>) {
        match request.verb {
            Verb::Get | Verb::Create | Verb::Update | Verb::Delete => (vec![Partition::passthrough()], vec![]),
            Verb::List | Verb::Watch => Self::partition_list_or_watch(access_set, request),
        }
    }

    fn partition_list_or_watch(
        access_set: &AccessSet,
        request: &PartitionRequest,
    ) -> (Vec<Partition>, Vec<PartitionWarning>) {
        let verb = request.verb.as_rbac_verb();

        if access_set.grants_all(verb, &request.group_resource) {
            return (vec![Partition::passthrough()], vec![]);
        }

        if let Some(object_id) = &request.object_id {
            return Self::partition_single_object(access_set, request, verb, object_id);
        }

        if request.namespaced {
            (Self::partition_namespaced(access_set, request, verb), vec![])
        } else {
            (vec![Self::partition_cluster_scoped(access_set, verb, &request.group_resource)], vec![])
        }
    }

    fn partition_single_object(
        access_set: &AccessSet,
        request: &PartitionRequest,
        verb: &str,
        object_id: &ObjectId,
    ) -> (Vec<Partition>, Vec<PartitionWarning>) {
        let mut warnings = Vec::new();

        let (namespace, name) = match object_id {
            ObjectId::Namespaced { namespace, name } => {
                // Deprecated fallback (spec.md §9, flagged for removal): the
                // id-embedded namespace wins over the request's own
                // namespace scope when the two disagree.
                if let Some(request_namespace) = &request.request_namespace {
                    if request_namespace != namespace {
                        warnings.push(PartitionWarning {
                            message: format!(
                                "request namespace {request_namespace:?} disagrees with id-embedded \
                                 namespace {namespace:?}; preferring the id-embedded namespace"
                            ),
                        });
                    }
                }
                (namespace.clone(), name.clone())
            }
            ObjectId::ClusterScoped { name } => ("*".to_string(), name.clone()),
        };

        if access_set.grants(verb, &request.group_resource, &namespace, &name) {
            let mut names = BTreeSet::new();
            names.insert(name);
            (
                vec![Partition {
                    namespace,
                    all: false,
                    passthrough: false,
                    names,
                }],
                warnings,
            )
        } else {
            (vec![], warnings)
        }
    }

    fn partition_namespaced(access_set: &AccessSet, request: &PartitionRequest, verb: &str) -> Vec<Partition> {
        let grants = access_set.namespaced_grants(verb, &request.group_resource);

        let mut cluster_all = false;
        let mut cluster_names = BTreeSet::new();
        let mut per_namespace = Vec::new();

        for grant in grants {
            if grant.namespace == "*" {
                cluster_all |= grant.all;
                cluster_names.extend(grant.names);
            } else {
                per_namespace.push(grant);
            }
        }

        let mut partitions = Vec::new();

        if cluster_all || !cluster_names.is_empty() {
            partitions.push(Partition {
                namespace: String::new(),
                all: cluster_all,
                passthrough: false,
                names: cluster_names,
            });
        }

        for grant in per_namespace {
            if let Some(request_namespace) = &request.request_namespace {
                if &grant.namespace != request_namespace {
                    continue;
                }
            }
            partitions.push(Partition {
                namespace: grant.namespace,
                all: grant.all,
                passthrough: false,
                names: grant.names,
            });
        }

        partitions.sort_by(|a, b| a.namespace.cmp(&b.namespace));
        partitions
    }

    fn partition_cluster_scoped(access_set: &AccessSet, verb: &str, group_resource: &GroupResource) -> Partition {
        let grants = access_set.namespaced_grants(verb, group_resource);
        let mut all = false;
        let mut names = BTreeSet::new();
        for grant in grants {
            all |= grant.all;
            names.extend(grant.names);
        }
        Partition {
            namespace: String::new(),
            all,
            passthrough: false,
            names,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use access_control::Access;

    fn gr() -> GroupResource {
        GroupResource::new("apps", "deployments")
    }

    fn request(namespaced: bool, request_namespace: Option<&str>) -> PartitionRequest {
        PartitionRequest {
            verb: Verb::List,
            group_resource: gr(),
            namespaced,
            request_namespace: request_namespace.map(str::to_string),
            object_id: None,
        }
    }

    #[test]
    fn global_grant_is_passthrough() {
        let mut set = AccessSet::new();
        set.add("list", gr(), Access::new("*", "*"));
        let (partitions, warnings) = Partitioner::partition(&set, &request(true, None));
        assert!(warnings.is_empty());
        assert_eq!(partitions, vec![Partition::passthrough()]);
    }

    #[test]
    fn namespaced_grants_become_one_partition_per_namespace_sorted() {
        let mut set = AccessSet::new();
        set.add("list", gr(), Access::new("zeta", "*"));
        set.add("list", gr(), Access::new("alpha", "foo"));

        let (partitions, _) = Partitioner::partition(&set, &request(true, None));
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].namespace, "alpha");
        assert!(!partitions[0].all);
        assert!(partitions[0].names.contains("foo"));
        assert_eq!(partitions[1].namespace, "zeta");
        assert!(partitions[1].all);
    }

    #[test]
    fn mutating_verbs_are_always_passthrough() {
        let set = AccessSet::new();
        let req = PartitionRequest {
            verb: Verb::Delete,
            ..request(true, None)
        };
        let (partitions, _) = Partitioner::partition(&set, &req);
        assert_eq!(partitions, vec![Partition::passthrough()]);
    }

    #[test]
    fn single_object_denied_yields_empty_partition_list() {
        let set = AccessSet::new();
        let req = PartitionRequest {
            object_id: Some(ObjectId::Namespaced {
                namespace: "ns1".into(),
                name: "foo".into(),
            }),
            ..request(true, Some("ns1"))
        };
        let (partitions, _) = Partitioner::partition(&set, &req);
        assert!(partitions.is_empty());
    }

    #[test]
    fn single_object_namespace_disagreement_prefers_id_and_warns() {
        let mut set = AccessSet::new();
        set.add("list", gr(), Access::new("id-ns", "foo"));
        let req = PartitionRequest {
            object_id: Some(ObjectId::Namespaced {
                namespace: "id-ns".into(),
                name: "foo".into(),
            }),
            ..request(true, Some("other-ns"))
        };
        let (partitions, warnings) = Partitioner::partition(&set, &req);
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].namespace, "id-ns");
        assert_eq!(warnings.len(), 1);
    }
}
