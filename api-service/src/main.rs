use api_service::{
    build_router,
    config::ApiConfig,
    db,
    services::{Database, GoogleOAuthClient, JwtService, LocalStorage, RedisJobQueue, StripeClient},
    AppState,
};
use service_core::error::AppError;
use service_core::observability::{init_metrics, init_tracing, shutdown_tracing};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on bad configuration
    let config = ApiConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;
    let metrics = init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting API service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    let store = Database::new(pool);

    let jobs = RedisJobQueue::new(&config.redis).await?;
    tracing::info!("Job queue initialized");

    let storage = LocalStorage::new(&config.storage).await?;
    tracing::info!(path = %config.storage.path, "Object storage initialized");

    let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;
    let billing = StripeClient::new(config.stripe.clone());
    let google = GoogleOAuthClient::new(config.google.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    let config = Arc::new(config);

    let state = AppState {
        config: config.clone(),
        store: Arc::new(store),
        storage: Arc::new(storage),
        jobs: Arc::new(jobs),
        jwt,
        billing: Arc::new(billing),
        google: Arc::new(google),
        metrics,
    };
    let app = build_router(state)?;

    tracing::info!(address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tracing();
    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
