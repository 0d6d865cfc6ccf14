//! Minimal HTTP surface: a health check plus one example resource's
//! list/get/watch routes through `ResourceDelegate`, in the teacher's `axum`
//! `Router` + `ServiceBuilder` layering idiom.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;

use access_control::{AccessStore, RbacIndex, User};
use resource_delegate::{ListOptions, RequestContext, ResourceDelegate, StatusError, StatusErrorKind};

use crate::widgets::{Widget, WidgetList};

pub struct AppState<I> {
    pub access_store: Arc<AccessStore<I>>,
    pub widgets: Arc<ResourceDelegate<Widget, WidgetList>>,
}

impl<I> Clone for AppState<I> {
    fn clone(&self) -> Self {
        Self {
            access_store: Arc::clone(&self.access_store),
            widgets: Arc::clone(&self.widgets),
        }
    }
}

pub fn router<I>(state: AppState<I>) -> Router
where
    I: RbacIndex + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/apis/example.com/v1/namespaces/{namespace}/widgets", get(list_widgets::<I>))
        .route(
            "/apis/example.com/v1/namespaces/{namespace}/widgets/{name}",
            get(get_widget::<I>),
        )
        .route(
            "/apis/example.com/v1/namespaces/{namespace}/widgets/watch",
            get(watch_widgets::<I>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<i64>,
    #[serde(rename = "continue")]
    continue_token: Option<String>,
}

async fn request_context<I>(access_store: &Arc<AccessStore<I>>, user: &User) -> Result<RequestContext, StatusError>
where
    I: RbacIndex + 'static,
{
    let access_set = access_store
        .access_for(user)
        .await
        .map_err(StatusError::convert)?;
    Ok(RequestContext::new(user.name.clone(), (*access_set).clone()))
}

async fn list_widgets<I>(
    State(state): State<AppState<I>>,
    Path(namespace): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response
where
    I: RbacIndex + 'static,
{
    // A production surface derives the user from authentication middleware;
    // this minimal demo surface always authorizes as a fixed identity.
    let user = User::new("demo-user", vec!["system:authenticated".into()]);
    let result = async {
        let ctx = request_context(&state.access_store, &user).await?;
        state
            .widgets
            .list(
                &ctx,
                &ListOptions {
                    namespace: Some(namespace),
                    limit: query.limit,
                    continue_token: query.continue_token,
                    ..Default::default()
                },
            )
            .await
    }
    .await;

    match result {
        Ok(list) => Json(list).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_widget<I>(State(state): State<AppState<I>>, Path((namespace, name)): Path<(String, String)>) -> Response
where
    I: RbacIndex + 'static,
{
    let user = User::new("demo-user", vec!["system:authenticated".into()]);
    let result = async {
        let ctx = request_context(&state.access_store, &user).await?;
        state.widgets.get(&ctx, &namespace, &name).await
    }
    .await;

    match result {
        Ok(widget) => Json(widget).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Streams newline-delimited JSON watch events, matching the Kubernetes
/// `{"type": "ADDED", "object": ...}` watch wire shape.
async fn watch_widgets<I>(State(state): State<AppState<I>>, Path(namespace): Path<String>) -> Response
where
    I: RbacIndex + 'static,
{
    let user = User::new("demo-user", vec!["system:authenticated".into()]);
    let result = async {
        let ctx = request_context(&state.access_store, &user).await?;
        state
            .widgets
            .watch(
                &ctx,
                &ListOptions {
                    namespace: Some(namespace),
                    ..Default::default()
                },
            )
            .await
    }
    .await;

    let watcher = match result {
        Ok(watcher) => watcher,
        Err(err) => return err.into_response(),
    };

    let Some(receiver) = watcher.result_chan().await else {
        return StatusError::new(StatusErrorKind::Internal, "watch channel already taken").into_response();
    };

    let stream = ReceiverStream::new(receiver).map(|event| {
        let mut line = serde_json::to_vec(&event).expect("WatchEvent always serializes");
        line.push(b'\n');
        Ok::<_, std::convert::Infallible>(line)
    });

    Response::builder()
        .header("content-type", "application/json-seq")
        .body(Body::from_stream(stream))
        .expect("static response parts are always valid")
}
