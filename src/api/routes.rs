use axum::{
    http::{HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers::{accessors, health, overrides, pages, tabs};
use super::state::AppState;
use super::websocket::ws_handler;

pub fn create_router(state: Arc<AppState>) -> Router {
    // SECURITY: Restrict CORS to localhost only - sidecar should only be accessed locally
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:1420".parse::<HeaderValue>().unwrap(),
            "http://localhost:5173".parse::<HeaderValue>().unwrap(),
            "http://127.0.0.1:1420".parse::<HeaderValue>().unwrap(),
            "http://127.0.0.1:5173".parse::<HeaderValue>().unwrap(),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Tabs and their frames
        .route("/tabs", get(tabs::list_tabs).post(tabs::open_tab))
        .route(
            "/tabs/:tab_id",
            get(tabs::get_frames).delete(tabs::close_tab),
        )
        .route("/tabs/:tab_id/frames", get(tabs::get_frames))
        .route("/tabs/:tab_id/broadcast", post(tabs::broadcast_request))
        .route("/tabs/:tab_id/auto-select", post(tabs::auto_select))
        .route("/tabs/:tab_id/stats", get(tabs::get_stats))
        .route("/tabs/:tab_id/summary", get(tabs::get_summary))
        .route("/tabs/:tab_id/extract", post(tabs::extract))
        .route("/tabs/:tab_id/validate", post(tabs::validate))
        .route("/tabs/:tab_id/entry", post(tabs::run_entry))
        // Saved pages
        .route("/pages", get(pages::list_pages))
        .route(
            "/pages/:page_id",
            get(pages::get_page).delete(pages::delete_page),
        )
        .route("/pages/:page_id/apply", post(pages::apply_changes))
        // Pending overrides
        .route(
            "/overrides",
            get(overrides::get_overrides)
                .put(overrides::upsert_override)
                .delete(overrides::clear_overrides),
        )
        // Named accessors
        .route("/accessors", get(accessors::list_accessors))
        .route(
            "/accessors/:name",
            put(accessors::put_accessor).delete(accessors::delete_accessor),
        )
        // WebSocket
        .route("/ws/:client_id", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
