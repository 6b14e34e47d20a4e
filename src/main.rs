//! Portfolio API
//!
//! Backend for a personal portfolio site: delivers contact form submissions
//! by email and serves read-only portfolio content from MongoDB.

use std::net::SocketAddr;
use std::sync::Arc;

use portfolio_api::{build_app, init_tracing, rate_limit, AppState, Database, SesMailer, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::from_env()?;

    // Initialize tracing
    init_tracing(settings.json_logs);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;

    tracing::info!(environment = %settings.environment, "Starting portfolio API server");
    tracing::info!("Connecting to database...");

    let database = Arc::new(Database::new(settings.database.clone()));
    if let Err(e) = database.connect().await {
        tracing::error!(error = %e, "Database connection failed");
        return Err(e.into());
    }

    tracing::info!("Database connected successfully");

    let mailer = SesMailer::from_settings(&settings.mail).await;
    let state = AppState::new(settings, database.clone(), Arc::new(mailer));

    let purge = tokio::spawn(rate_limit::run_purge_loop(state.limiter.clone()));

    // Build router and start server
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    purge.abort();
    database.close().await;
    tracing::info!("Database connection closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
