use std::sync::Arc;

use axum::{
    extract::Extension,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod db;
pub mod error;

pub mod dto {
    pub mod claims_dto;
    pub mod draft_config_dto;
    pub mod draft_dto;
    pub mod draft_session_dto;
    pub mod hero_dto;
}

pub mod services {
    pub mod auth_user;
    pub mod draft_hub;
    pub mod draft_machine;
    pub mod draft_store;
    pub mod hero_roster;
    pub mod lobby_directory;
    pub mod match_handoff;
    pub mod phase_plan;
    pub mod turn_timer;
    pub mod websocket;
}

pub mod routes {
    pub mod draft;
    pub mod heroes;
}

use config::ServerConfig;
use routes::{draft, heroes};
use services::{draft_hub::SharedDraftHub, websocket::websocket_handler};

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.cors_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    layer.allow_origin(origins)
}

pub fn build_app(pool: SqlitePool, hub: SharedDraftHub, config: Arc<ServerConfig>, client: Client) -> Router {
    let cors = cors_layer(&config);

    Router::new()
        .route("/heroes", get(heroes::get_heroes))
        .route("/heroes/refresh", post(heroes::refresh_heroes))
        .route("/lobbies/{lobby_id}/draft", get(draft::get_state))
        .route(
            "/lobbies/{lobby_id}/draft/config",
            get(draft::get_config).put(draft::update_config),
        )
        .route("/lobbies/{lobby_id}/draft/start", post(draft::start_draft))
        .route("/lobbies/{lobby_id}/draft/pick", post(draft::draft_pick))
        .route("/lobbies/{lobby_id}/draft/cancel", post(draft::cancel_draft))
        .route("/lobbies/{lobby_id}/draft/ws", get(websocket_handler))
        .layer(Extension(pool))
        .layer(Extension(hub))
        .layer(Extension(config))
        .layer(Extension(client))
        .layer(cors)
}
