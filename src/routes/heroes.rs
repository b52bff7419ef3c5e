use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use reqwest::Client;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::dto::hero_dto::Hero;
use crate::services::{auth_user::AuthUser, hero_roster};

/**
 * GET the hero roster.
 */
pub async fn get_heroes(Extension(pool): Extension<SqlitePool>) -> impl IntoResponse {
    info!("Fetching heroes.");

    match hero_roster::load_heroes(&pool).await {
        Ok(heroes) => (StatusCode::OK, Json(heroes)),
        Err(e) => {
            error!("DB query error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Vec::<Hero>::new()))
        }
    }
}

/**
 * POST to reload the roster from the remote hero source.
 */
pub async fn refresh_heroes(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<ServerConfig>>,
    Extension(client): Extension<Client>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, (StatusCode, &'static str)> {
    info!("{} requested a hero roster refresh", claims.sub);

    let heroes = hero_roster::fetch_remote_heroes(&client, &config.hero_source_url)
        .await
        .map_err(|e| {
            error!("Failed to fetch heroes: {}", e);
            (StatusCode::BAD_GATEWAY, "Failed to fetch heroes from the roster source")
        })?;

    hero_roster::save_heroes(&pool, &heroes).await.map_err(|e| {
        error!("Failed to save heroes: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to save heroes to DB")
    })?;

    Ok((StatusCode::OK, Json(heroes)))
}
