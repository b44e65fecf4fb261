use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atlas_intake_api::config::Config;
use atlas_intake_api::db::Database;
use atlas_intake_api::handlers::AppState;
use atlas_intake_api::notifier::ResendClient;
use atlas_intake_api::routes::build_app;
use atlas_intake_api::storage::DocumentStorage;
use atlas_intake_api::store::PgStore;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, the email client
/// and document storage, then serves the router.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atlas_intake_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url, config.run_migrations).await?;
    tracing::info!("Database connection pool established");

    let notifier = ResendClient::new(
        &config.resend_base_url,
        config.resend_api_key.clone(),
        config.resend_from_email.clone(),
    )?;
    tracing::info!("✓ Resend client initialized: {}", config.resend_base_url);

    let documents = match config.supabase_storage.as_ref() {
        Some(storage) => {
            let documents = DocumentStorage::new(storage)?;
            tracing::info!("✓ Document storage initialized: {}", storage.url);
            Some(documents)
        }
        None => None,
    };

    let port = config.port;
    let app_state = Arc::new(AppState::new(
        config,
        Arc::new(PgStore::new(db.pool.clone())),
        Arc::new(notifier),
        documents,
    )?);

    let app = build_app(app_state, true)?;

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
