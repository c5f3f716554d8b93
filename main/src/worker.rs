use std::sync::Arc;
use std::time::Duration;

use common::{
    storage::{db::SurrealDbClient, store::StorageManager, types::user::User},
    utils::{config::get_config, embedding::EmbeddingClient},
};
use ingestion_pipeline::{
    document::DocumentProcessor, extractor::EntityExtractor, resource::ResourceProcessor,
    run_worker_loop, Processors,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Grace period for draining in-flight jobs after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
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

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));
    let embedder = EmbeddingClient::new(openai_client.clone(), &config);
    let storage = StorageManager::new(&config).await?;

    let processors = Processors {
        resources: Arc::new(ResourceProcessor::new(
            db.clone(),
            EntityExtractor::new(openai_client.clone(), config.chat_model.clone()),
            embedder.clone(),
            &config,
        )?),
        documents: Arc::new(DocumentProcessor::new(db.clone(), storage, embedder)),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, draining in-flight jobs");
        let _ = shutdown_tx.send(true);

        // Forced-exit guard: if draining hangs, leave anyway.
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        warn!("Drain grace period elapsed, forcing exit");
        std::process::exit(1);
    });

    info!("Starting worker process");
    run_worker_loop(db, processors, shutdown_rx).await?;
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
