use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::server::config::ServerConfig;
use crate::server::registry::SubscriptionRegistry;
use crate::server::sites::SiteDirectory;

pub mod auth;
pub mod error;
pub mod models;
pub mod websocket;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriptionRegistry>,
    pub sites: Arc<SiteDirectory>,
    pub config: Arc<ServerConfig>,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(
    registry: Arc<SubscriptionRegistry>,
    sites: Arc<SiteDirectory>,
    config: Arc<ServerConfig>,
) -> Router {
    let app_state = Arc::new(AppState {
        registry,
        sites,
        config,
    });

    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check_handler))
        .route("/ws", get(websocket::websocket_handler))
        .layer(cors)
        .with_state(app_state)
}
