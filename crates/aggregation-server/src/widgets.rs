//! A minimal example resource and in-memory backend, wired up purely so the
//! HTTP surface is runnable and testable end-to-end (spec.md §6's "AMBIENT
//! — minimal HTTP surface").

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use access_control::GroupResource;
use resource_delegate::{Backend, ListOptions, StatusError, WatchEvent};

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub namespace: String,
    pub name: String,
    pub created_at: String,
}

pub type WidgetList = Vec<Widget>;

#[derive(Default)]
pub struct InMemoryWidgetBackend {
    objects: Mutex<BTreeMap<(String, String), Widget>>,
}

#[async_trait]
impl Backend<Widget, WidgetList> for InMemoryWidgetBackend {
    fn new_object(&self) -> Widget {
        Widget::default()
    }

    fn new_list(&self) -> WidgetList {
        Vec::new()
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Widget, StatusError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StatusError::not_found(format!("widget {namespace}/{name} not found")))
    }

    async fn list(&self, options: &ListOptions) -> Result<WidgetList, StatusError> {
        let objects = self.objects.lock().unwrap();
        let items = objects
            .values()
            .filter(|widget| match &options.namespace {
                Some(namespace) if namespace != "*" => &widget.namespace == namespace,
                _ => true,
            })
            .cloned()
            .collect();
        Ok(items)
    }

    async fn create(&self, obj: Widget) -> Result<Widget, StatusError> {
        let mut objects = self.objects.lock().unwrap();
        let key = (obj.namespace.clone(), obj.name.clone());
        if objects.contains_key(&key) {
            return Err(StatusError::already_exists(format!(
                "widget {}/{} already exists",
                obj.namespace, obj.name
            )));
        }
        objects.insert(key, obj.clone());
        Ok(obj)
    }

    async fn update(&self, namespace: &str, name: &str, obj: Widget) -> Result<Widget, StatusError> {
        let mut objects = self.objects.lock().unwrap();
        objects.insert((namespace.to_string(), name.to_string()), obj.clone());
        Ok(obj)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<Widget, StatusError> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| StatusError::not_found(format!("widget {namespace}/{name} not found")))
    }

    /// This in-memory backend has no change-notification mechanism of its
    /// own, so `watch` sends the current snapshot as `Added` events and then
    /// closes the channel rather than staying open across future mutations.
    async fn watch(&self, options: &ListOptions) -> Result<mpsc::Receiver<WatchEvent<Widget>>, StatusError> {
        let snapshot = self.list(options).await?;
        let (tx, rx) = mpsc::channel(snapshot.len().max(1));
        for widget in snapshot {
            let _ = tx.send(WatchEvent::Added(widget)).await;
        }
        Ok(rx)
    }

    fn group_resource(&self) -> GroupResource {
        GroupResource::new("example.com", "widgets")
    }
}
