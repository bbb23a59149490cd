use std::path::PathBuf;
use std::sync::Arc;

use provider_setup::config::FlowConfig;
use provider_setup::onboarding::FlowController;
use provider_setup::onboarding::routes::{SetupRouteState, setup_routes};
use provider_setup::store::LibSqlStore;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let port: u16 = std::env::var("SETUP_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let db_path: PathBuf = std::env::var("SETUP_DB_PATH")
        .unwrap_or_else(|_| "data/setup.db".to_string())
        .into();

    // One controller per authenticated owner; the session scope here is a
    // single provider identified by env, matching the single-user deployment.
    let owner_id = std::env::var("SETUP_OWNER_ID").unwrap_or_else(|_| "default".to_string());

    eprintln!("💅 Provider Setup v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{port}/api/setup/status");
    eprintln!("   DB:  {}", db_path.display());

    let store = Arc::new(LibSqlStore::new_local(&db_path).await?);
    let controller = FlowController::load(owner_id, store, FlowConfig::default()).await?;

    let app = setup_routes(SetupRouteState {
        controller: Arc::new(controller),
    })
    .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "Setup API listening");
    axum::serve(listener, app).await?;

    Ok(())
}
