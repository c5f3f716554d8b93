use std::sync::Arc;

use api_router::{api_routes, api_state::ApiState, SessionStoreType};
use axum::Router;
use axum_session::SessionLayer;
use axum_session_auth::{AuthConfig, AuthSessionLayer};
use axum_session_surreal::SessionSurrealPool;
use common::{
    storage::{db::SurrealDbClient, store::StorageManager, types::user::User},
    utils::config::get_config,
};
use surrealdb::{engine::any::Any, Surreal};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;
    if let Err(err) = config.validate() {
        error!(error = %err, "Refusing to start with invalid configuration");
        std::process::exit(1);
    }

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    // Ensure schema and the admin principal exist
    db.ensure_initialized().await?;
    User::ensure_admin(&config.admin_password, &db).await?;

    let session_store = Arc::new(db.create_session_store().await?);
    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let storage = StorageManager::new(&config).await?;

    let api_state = ApiState::new(&config, db.clone(), storage, openai_client)?;
    let app = build_app(api_state, &session_store, &db);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_app(api_state: ApiState, session_store: &SessionStoreType, db: &SurrealDbClient) -> Router {
    Router::new()
        .merge(api_routes(&api_state))
        .with_state(api_state)
        .layer(
            AuthSessionLayer::<User, String, SessionSurrealPool<Any>, Surreal<Any>>::new(Some(
                db.client.clone(),
            ))
            .with_config(AuthConfig::<String>::default()),
        )
        .layer(SessionLayer::new(session_store.clone()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .unwrap_or_else(|err| error!(error = %err, "Failed to listen for ctrl-c"));
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(error = %err, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use common::utils::config::{AppConfig, StorageKind};
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn build_test_app() -> (Router, Arc<SurrealDbClient>) {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let config = AppConfig {
            storage: StorageKind::Memory,
            ..Default::default()
        };

        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        db.ensure_initialized()
            .await
            .expect("failed to initialize schema");
        User::ensure_admin(&config.admin_password, &db)
            .await
            .expect("failed to create admin");

        let session_store = Arc::new(db.create_session_store().await.expect("session store"));
        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));
        let storage = StorageManager::new(&config).await.expect("storage");

        let api_state =
            ApiState::new(&config, db.clone(), storage, openai_client).expect("api state");
        let app = build_app(api_state, &session_store, &db);

        (app, db)
    }

    fn extract_session_cookie(response: &Response) -> String {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|value| {
                value
                    .to_str()
                    .expect("set-cookie header must be valid utf-8")
                    .split(';')
                    .next()
                    .expect("set-cookie should include key=value pair")
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    async fn login(app: &Router, password: &str) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(format!("{{\"password\":\"{password}\"}}")))
                    .expect("login request"),
            )
            .await
            .expect("login response")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn health_and_metrics_are_public() {
        let (app, _db) = build_test_app().await;

        let health = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("health response");
        assert_eq!(health.status(), StatusCode::OK);

        let metrics = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("metrics response");
        assert_eq!(metrics.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn protected_routes_require_a_session() {
        let (app, _db) = build_test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/audit")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("audit response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let public = app
            .oneshot(
                Request::builder()
                    .uri("/api/datasets")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("datasets response");
        assert_eq!(public.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn login_rejects_wrong_password_and_accepts_the_right_one() {
        let (app, _db) = build_test_app().await;

        let wrong = login(&app, "senha-errada").await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let right = login(&app, "admin").await;
        assert_eq!(right.status(), StatusCode::OK);
        let cookie = extract_session_cookie(&right);
        assert!(!cookie.is_empty());

        let audit = app
            .oneshot(
                Request::builder()
                    .uri("/api/audit")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("audit response");
        assert_eq!(audit.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rag_queries_are_rate_limited_per_user() {
        let (app, _db) = build_test_app().await;

        let response = login(&app, "admin").await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = extract_session_cookie(&response);

        // With empty stores and an unreachable LLM, each query resolves to
        // the canned answer. The 11th within the window must be rejected.
        for i in 0..10 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/rag/query")
                        .header(header::CONTENT_TYPE, "application/json")
                        .header(header::COOKIE, cookie.clone())
                        .body(Body::from(
                            "{\"query\":\"tendências jurisprudenciais recentes\"}",
                        ))
                        .expect("query request"),
                )
                .await
                .expect("query response");
            assert_eq!(
                response.status(),
                StatusCode::OK,
                "query {} should be allowed",
                i + 1
            );
        }

        let eleventh = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/rag/query")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::COOKIE, cookie)
                    .body(Body::from(
                        "{\"query\":\"tendências jurisprudenciais recentes\"}",
                    ))
                    .expect("query request"),
            )
            .await
            .expect("query response");
        assert_eq!(eleventh.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn short_rag_query_is_rejected() {
        let (app, _db) = build_test_app().await;

        let response = login(&app, "admin").await;
        let cookie = extract_session_cookie(&response);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/rag/query")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::COOKIE, cookie)
                    .body(Body::from("{\"query\":\"oi\"}"))
                    .expect("query request"),
            )
            .await
            .expect("query response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
