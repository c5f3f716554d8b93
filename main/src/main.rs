use std::sync::Arc;
use std::time::Duration;

use api_router::{api_routes, api_state::ApiState};
use axum::Router;
use axum_session::SessionLayer;
use axum_session_auth::{AuthConfig, AuthSessionLayer};
use axum_session_surreal::SessionSurrealPool;
use common::{
    storage::{db::SurrealDbClient, store::StorageManager, types::user::User},
    utils::{config::get_config, embedding::EmbeddingClient},
};
use ingestion_pipeline::{
    document::DocumentProcessor, extractor::EntityExtractor, resource::ResourceProcessor,
    run_worker_loop, Processors,
};
use surrealdb::{engine::any::Any, Surreal};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Grace period for draining in-flight work after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Combined single-process deployment: API server and job worker side by
/// side, sharing one database connection and shutdown signal.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

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
    db.ensure_initialized().await?;
    User::ensure_admin(&config.admin_password, &db).await?;

    let session_store = Arc::new(db.create_session_store().await?);
    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));
    let embedder = EmbeddingClient::new(openai_client.clone(), &config);
    let storage = StorageManager::new(&config).await?;

    let api_state = ApiState::new(&config, db.clone(), storage.clone(), openai_client.clone())?;
    let app = Router::new()
        .merge(api_routes(&api_state))
        .with_state(api_state)
        .layer(
            AuthSessionLayer::<User, String, SessionSurrealPool<Any>, Surreal<Any>>::new(Some(
                db.client.clone(),
            ))
            .with_config(AuthConfig::<String>::default()),
        )
        .layer(SessionLayer::new((*session_store).clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Server task with graceful shutdown tied to the shared signal.
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&serve_address).await?;
    info!("Starting server listening on {serve_address}");

    let mut server_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = server_shutdown.changed().await;
        };
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(error = %err, "Server error");
        }
    });

    // Worker loop in the same process.
    let processors = Processors {
        resources: Arc::new(ResourceProcessor::new(
            db.clone(),
            EntityExtractor::new(openai_client.clone(), config.chat_model.clone()),
            embedder.clone(),
            &config,
        )?),
        documents: Arc::new(DocumentProcessor::new(db.clone(), storage, embedder)),
    };
    let worker_db = db.clone();
    let worker_shutdown = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move {
        info!("Starting worker process");
        if let Err(err) = run_worker_loop(worker_db, processors, worker_shutdown).await {
            error!(error = %err, "Worker process error");
        }
    });

    shutdown_signal().await;
    info!("Shutdown signal received, draining server and worker");
    let _ = shutdown_tx.send(true);

    let drain = async {
        let _ = server_handle.await;
        let _ = worker_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("Drain grace period elapsed, forcing exit");
        std::process::exit(1);
    }

    Ok(())
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
}
