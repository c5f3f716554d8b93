#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use axum_session::SessionStore;
use axum_session_auth::AuthSession;
use axum_session_surreal::SessionSurrealPool;
use common::storage::types::user::User;
use middleware_api_auth::require_auth;
use surrealdb::{engine::any::Any, Surreal};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

pub type AuthSessionType = AuthSession<User, String, SessionSurrealPool<Any>, Surreal<Any>>;
pub type SessionStoreType = SessionStore<SessionSurrealPool<Any>>;

/// Uploads arrive base64-encoded, so the JSON body cap sits above the 15 MiB
/// document limit.
const UPLOAD_BODY_LIMIT: usize = 22 * 1024 * 1024;

/// Router for the API surface consumed by the UI.
pub fn api_routes<S>(_app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints.
    let public = Router::new()
        .route("/health", get(routes::health::health))
        .route("/metrics", get(routes::health::prometheus_metrics))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/datasets", get(routes::datasets::list))
        .route("/api/datasets/stats", get(routes::datasets::resource_stats))
        .route("/api/datasets/{slug}", get(routes::datasets::get_by_slug))
        .route("/api/resources", get(routes::resources::list))
        .route(
            "/api/resources/{resource_id}/status",
            get(routes::resources::status),
        )
        .route("/api/graph/nodes", get(routes::graph::nodes))
        .route("/api/graph/stats/nodes", get(routes::graph::node_stats))
        .route("/api/graph/stats/edges", get(routes::graph::edge_stats))
        .route("/api/graph/communities", get(routes::graph::communities))
        .route("/api/graph/visualization", get(routes::graph::viz))
        .route("/api/embeddings/collections", get(routes::embeddings::collections));

    // Protected endpoints (require an authenticated session).
    let protected = Router::new()
        .route("/api/datasets/sync", post(routes::datasets::sync))
        .route(
            "/api/resources/{resource_id}/download",
            post(routes::resources::download),
        )
        .route(
            "/api/resources/{resource_id}/process",
            post(routes::resources::process),
        )
        .route(
            "/api/documents",
            get(routes::documents::list)
                .post(routes::documents::upload)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/api/documents/{document_id}/process",
            post(routes::documents::process),
        )
        .route(
            "/api/graph/communities/build",
            post(routes::graph::build_communities),
        )
        .route("/api/rag/query", post(routes::rag::query))
        .route("/api/rag/history", get(routes::rag::history))
        .route("/api/audit", get(routes::audit::list))
        .route_layer(from_fn(require_auth));

    public.merge(protected)
}
