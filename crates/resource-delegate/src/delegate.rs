//! ResourceDelegate (component C7): a generic CRUD/watch façade over a
//! user-supplied storage backend, enforcing authorization via
//! `access-control`'s `Authorizer` and funneling every error through
//! [`StatusError`] (spec.md §4.7).

use async_trait::async_trait;
use tokio::sync::mpsc;

use access_control::{AccessSet, Authorizer, GroupResource, Request as AuthRequest, RequestTarget};

use crate::status_error::StatusError;
use crate::watch::{WatchEvent, Watcher};

/// Buffer size for the [`Watcher`] a [`ResourceDelegate::watch`] call
/// creates to forward a backend's event channel through.
const WATCH_BUFFER: usize = 32;

/// The authenticated caller a delegate operation runs as. Every operation
/// requires one; its absence is `StatusError::missing_user_info` (spec.md
/// §4.7).
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub user: Option<String>,
    pub access_set: Option<AccessSet>,
}

impl RequestContext {
    pub fn new(user: impl Into<String>, access_set: AccessSet) -> Self {
        Self {
            user: Some(user.into()),
            access_set: Some(access_set),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user: None,
            access_set: None,
        }
    }

    fn require_access_set(&self) -> Result<&AccessSet, StatusError> {
        self.access_set.as_ref().ok_or_else(StatusError::missing_user_info)
    }
}

/// List options translated from the external (wire) shape into whatever a
/// backend's own `List` call needs; `converter` on [`ResourceDelegate`]
/// performs that translation (spec.md §4.7's "converts internal list
/// options to external shape using a supplied converter").
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
    pub limit: Option<i64>,
    pub continue_token: Option<String>,
}

/// A validation hook run before a mutation is allowed to proceed —
/// `createValidation`/`updateValidation`/`deleteValidation` in spec.md §4.7.
/// Returning `Err` aborts the operation with that error.
pub type Validation<T> = Box<dyn Fn(&T) -> Result<(), StatusError> + Send + Sync>;

/// The backend a [`ResourceDelegate`] bridges into the delegate's generic
/// verbs. Implementors own storage; the delegate owns authorization,
/// validation hooks, and error normalization.
#[async_trait]
pub trait Backend<T, TList>: Send + Sync
where
    T: Send + Sync + Clone + 'static,
    TList: Send + Sync + 'static,
{
    fn new_object(&self) -> T;
    fn new_list(&self) -> TList;

    async fn get(&self, namespace: &str, name: &str) -> Result<T, StatusError>;
    async fn list(&self, options: &ListOptions) -> Result<TList, StatusError>;
    async fn create(&self, obj: T) -> Result<T, StatusError>;
    async fn update(&self, namespace: &str, name: &str, obj: T) -> Result<T, StatusError>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<T, StatusError>;

    /// Obtains an event channel from the backend; `ResourceDelegate::watch`
    /// forwards it into a [`Watcher`] (spec.md §4.7's `Watch(ctx, listOptions)`).
    async fn watch(&self, options: &ListOptions) -> Result<mpsc::Receiver<WatchEvent<T>>, StatusError>;

    fn group_resource(&self) -> GroupResource;
    /// Whether objects of this backend's kind are namespaced. Cluster-scoped
    /// backends ignore `namespace` in requests below.
    fn namespaced(&self) -> bool {
        true
    }
}

/// Result of [`ResourceDelegate::update`]: the stored object plus whether it
/// was newly created via `forceAllowCreate` (spec.md §4.7).
pub struct UpdateResult<T> {
    pub object: T,
    pub created: bool,
}

/// Generic, backend-agnostic CRUD/watch façade (spec.md §4.7). Stateless
/// aside from the authorizer and backend it wraps.
pub struct ResourceDelegate<T, TList> {
    backend: Box<dyn Backend<T, TList>>,
}

impl<T, TList> ResourceDelegate<T, TList>
where
    T: Send + Sync + Clone + 'static,
    TList: Send + Sync + 'static,
{
    pub fn new(backend: Box<dyn Backend<T, TList>>) -> Self {
        Self { backend }
    }

    pub fn new_object(&self) -> T {
        self.backend.new_object()
    }

    pub fn new_list(&self) -> TList {
        self.backend.new_list()
    }

    fn authorize(&self, ctx: &RequestContext, verb: &str, namespace: &str, name: &str) -> Result<(), StatusError> {
        let access_set = ctx.require_access_set()?;
        let authorizer = Authorizer::new(access_set);
        let decision = authorizer.authorize(&AuthRequest {
            verb: verb.to_string(),
            target: RequestTarget::Resource {
                group_resource: self.backend.group_resource(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
        });
        match decision {
            access_control::Decision::Allow => Ok(()),
            access_control::Decision::Deny => Err(StatusError::forbidden(format!(
                "user is not allowed to {verb} {name} in namespace {namespace}"
            ))),
        }
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn get(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<T, StatusError> {
        self.authorize(ctx, "get", namespace, name)?;
        self.backend.get(namespace, name).await
    }

    #[tracing::instrument(skip(self, ctx, options))]
    pub async fn list(&self, ctx: &RequestContext, options: &ListOptions) -> Result<TList, StatusError> {
        let namespace = options.namespace.as_deref().unwrap_or("*");
        self.authorize(ctx, "list", namespace, "*")?;
        self.backend.list(options).await
    }

    /// `Watch` (spec.md §4.7): authorizes, then spawns [`crate::watch::forward`]
    /// to bridge the backend's event channel into a [`Watcher`] the caller can
    /// read from and stop independently of the backend.
    #[tracing::instrument(skip(self, ctx, options))]
    pub async fn watch(&self, ctx: &RequestContext, options: &ListOptions) -> Result<Watcher<T>, StatusError> {
        let namespace = options.namespace.as_deref().unwrap_or("*");
        self.authorize(ctx, "watch", namespace, "*")?;
        let source = self.backend.watch(options).await?;
        let watcher = Watcher::new(WATCH_BUFFER);
        tokio::spawn(crate::watch::forward(source, watcher.clone()));
        Ok(watcher)
    }

    #[tracing::instrument(skip(self, ctx, obj, create_validation))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        obj: T,
        create_validation: Option<&Validation<T>>,
    ) -> Result<T, StatusError> {
        self.authorize(ctx, "create", namespace, "*")?;
        if let Some(validate) = create_validation {
            validate(&obj)?;
        }
        self.backend.create(obj).await
    }

    /// `Update` (spec.md §4.7): reads existing; on not-found, falls back to
    /// create-if-`force_allow_create`; otherwise applies `updated_object` to
    /// the existing value, runs `update_validation`, delegates.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(self, ctx, updated_object, create_validation, update_validation))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
        updated_object: impl Fn(Option<&T>) -> Result<T, StatusError> + Send,
        create_validation: Option<&Validation<T>>,
        update_validation: Option<&Validation<T>>,
        force_allow_create: bool,
    ) -> Result<UpdateResult<T>, StatusError> {
        self.authorize(ctx, "update", namespace, name)?;

        match self.backend.get(namespace, name).await {
            Ok(existing) => {
                let updated = updated_object(Some(&existing))?;
                if let Some(validate) = update_validation {
                    validate(&updated)?;
                }
                let stored = self.backend.update(namespace, name, updated).await?;
                Ok(UpdateResult {
                    object: stored,
                    created: false,
                })
            }
            Err(err) if err.kind == crate::status_error::StatusErrorKind::NotFound && force_allow_create => {
                self.authorize(ctx, "create", namespace, name)?;
                let created = updated_object(None)?;
                if let Some(validate) = create_validation {
                    validate(&created)?;
                }
                let stored = self.backend.create(created).await?;
                Ok(UpdateResult {
                    object: stored,
                    created: true,
                })
            }
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(skip(self, ctx, delete_validation))]
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
        delete_validation: Option<&Validation<T>>,
    ) -> Result<T, StatusError> {
        self.authorize(ctx, "delete", namespace, name)?;
        let existing = self.backend.get(namespace, name).await?;
        if let Some(validate) = delete_validation {
            validate(&existing)?;
        }
        self.backend.delete(namespace, name).await?;
        Ok(existing)
    }

    /// `ConvertToTable` (spec.md §4.7): default two-column (Name, CreatedAt)
    /// view; `column_fn` lets a backend supply custom columns.
    pub fn convert_to_table(
        &self,
        obj: &T,
        name: impl Fn(&T) -> String,
        created_at: impl Fn(&T) -> String,
    ) -> TableRow {
        TableRow {
            name: name(obj),
            created_at: created_at(obj),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableRow {
    pub name: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use access_control::Access;

    use super::*;

    #[derive(Clone, Debug, Eq, PartialEq)]
    struct Widget {
        name: String,
    }

    struct InMemoryBackend {
        objects: Mutex<Vec<Widget>>,
    }

    #[async_trait]
    impl Backend<Widget, Vec<Widget>> for InMemoryBackend {
        fn new_object(&self) -> Widget {
            Widget { name: String::new() }
        }

        fn new_list(&self) -> Vec<Widget> {
            Vec::new()
        }

        async fn get(&self, _namespace: &str, name: &str) -> Result<Widget, StatusError> {
            self.objects
                .lock()
                .unwrap()
                .iter()
                .find(|w| w.name == name)
                .cloned()
                .ok_or_else(|| StatusError::not_found(format!("widget {name} not found")))
        }

        async fn list(&self, _options: &ListOptions) -> Result<Vec<Widget>, StatusError> {
            Ok(self.objects.lock().unwrap().clone())
        }

        async fn create(&self, obj: Widget) -> Result<Widget, StatusError> {
            self.objects.lock().unwrap().push(obj.clone());
            Ok(obj)
        }

        async fn update(&self, _namespace: &str, name: &str, obj: Widget) -> Result<Widget, StatusError> {
            let mut objects = self.objects.lock().unwrap();
            if let Some(slot) = objects.iter_mut().find(|w| w.name == name) {
                *slot = obj.clone();
            }
            Ok(obj)
        }

        async fn delete(&self, _namespace: &str, name: &str) -> Result<Widget, StatusError> {
            let mut objects = self.objects.lock().unwrap();
            let index = objects.iter().position(|w| w.name == name).unwrap();
            Ok(objects.remove(index))
        }

        async fn watch(&self, _options: &ListOptions) -> Result<mpsc::Receiver<WatchEvent<Widget>>, StatusError> {
            let (tx, rx) = mpsc::channel(8);
            for widget in self.objects.lock().unwrap().iter() {
                let _ = tx.try_send(WatchEvent::Added(widget.clone()));
            }
            Ok(rx)
        }

        fn group_resource(&self) -> GroupResource {
            GroupResource::new("example.com", "widgets")
        }
    }

    fn allowed_context() -> RequestContext {
        let mut set = AccessSet::new();
        set.add("*", GroupResource::new("example.com", "widgets"), Access::new("*", "*"));
        RequestContext::new("alice", set)
    }

    #[tokio::test]
    async fn get_requires_user_info() {
        let delegate = ResourceDelegate::new(Box::new(InMemoryBackend {
            objects: Mutex::new(vec![]),
        }));
        let err = delegate
            .get(&RequestContext::anonymous(), "default", "foo")
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::status_error::StatusErrorKind::Internal);
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let delegate = ResourceDelegate::new(Box::new(InMemoryBackend {
            objects: Mutex::new(vec![]),
        }));
        let ctx = allowed_context();
        delegate
            .create(&ctx, "default", Widget { name: "foo".into() }, None)
            .await
            .unwrap();
        let got = delegate.get(&ctx, "default", "foo").await.unwrap();
        assert_eq!(got.name, "foo");
    }

    #[tokio::test]
    async fn update_falls_back_to_create_when_allowed() {
        let delegate = ResourceDelegate::new(Box::new(InMemoryBackend {
            objects: Mutex::new(vec![]),
        }));
        let ctx = allowed_context();
        let result = delegate
            .update(
                &ctx,
                "default",
                "foo",
                |_existing| Ok(Widget { name: "foo".into() }),
                None,
                None,
                true,
            )
            .await
            .unwrap();
        assert!(result.created);
        assert_eq!(result.object.name, "foo");
    }

    #[tokio::test]
    async fn delete_returns_predelete_object() {
        let delegate = ResourceDelegate::new(Box::new(InMemoryBackend {
            objects: Mutex::new(vec![]),
        }));
        let ctx = allowed_context();
        delegate
            .create(&ctx, "default", Widget { name: "foo".into() }, None)
            .await
            .unwrap();
        let deleted = delegate.delete(&ctx, "default", "foo", None).await.unwrap();
        assert_eq!(deleted.name, "foo");
        assert!(delegate.get(&ctx, "default", "foo").await.is_err());
    }

    #[tokio::test]
    async fn watch_forwards_existing_objects_then_closes() {
        let delegate = ResourceDelegate::new(Box::new(InMemoryBackend {
            objects: Mutex::new(vec![]),
        }));
        let ctx = allowed_context();
        delegate
            .create(&ctx, "default", Widget { name: "foo".into() }, None)
            .await
            .unwrap();

        let watcher = delegate.watch(&ctx, &ListOptions::default()).await.unwrap();
        let mut result_chan = watcher.result_chan().await.unwrap();
        let event = result_chan.recv().await.unwrap();
        match event {
            WatchEvent::Added(widget) => assert_eq!(widget.name, "foo"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(result_chan.recv().await.is_none());
    }

    #[tokio::test]
    async fn forbidden_when_access_set_denies() {
        let delegate = ResourceDelegate::new(Box::new(InMemoryBackend {
            objects: Mutex::new(vec![]),
        }));
        let ctx = RequestContext::new("mallory", AccessSet::new());
        let err = delegate.get(&ctx, "default", "foo").await.unwrap_err();
        assert_eq!(err.kind, crate::status_error::StatusErrorKind::Forbidden);
    }
}
