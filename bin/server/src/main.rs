use loomwork_ai::ModelRegistry;
use loomwork_core::SnowflakeGenerator;
use loomwork_integration::{BochaSearch, Crawler, LocalFileStore};
use loomwork_server::config::ServerConfig;
use loomwork_server::db::{PgInstanceStore, PgTemplateSource};
use loomwork_server::routes::{self, AppState};
use loomwork_workflow::{Engine, Services};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load()?;
    tracing::info!(models = config.models.len(), "Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let models = ModelRegistry::from_openai_configs(config.model_configs())?;
    let mut services = Services::new(
        Arc::new(models),
        Crawler::new(Duration::from_secs(config.crawler_timeout_secs))?,
        Arc::new(LocalFileStore::new(config.files.root.clone())),
    );
    if let Some(search) = &config.web_search {
        services = services.with_web_search(Arc::new(BochaSearch::new(
            search.endpoint.clone(),
            search.api_key.clone(),
            Duration::from_secs(search.timeout_secs),
        )?));
    } else {
        tracing::warn!("No web search provider configured; web search nodes will fail");
    }

    let engine = Engine::new(
        Arc::new(PgInstanceStore::new(db_pool.clone())),
        Arc::new(PgTemplateSource::new(db_pool)),
        services,
        Arc::new(SnowflakeGenerator::new(config.worker_id)?),
        config.engine.to_engine_config(),
    );

    let app = routes::router(AppState {
        engine: engine.clone(),
        default_user: config.default_user(),
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
