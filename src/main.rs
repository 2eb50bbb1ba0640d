use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use extractor_sidecar::api::{routes::create_router, state::AppState};
use extractor_sidecar::config::Config;

#[tokio::main]
async fn main() {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "extractor_sidecar=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env();
    let addr = format!("{}:{}", config.host, config.port);

    // Create application state
    let state = Arc::new(AppState::from_config(config).unwrap());

    // Build router
    let app = create_router(state);

    // Start server
    tracing::info!("Extractor Sidecar starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
