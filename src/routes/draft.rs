use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;
use tracing::info;

use crate::dto::{draft_config_dto::DraftConfig, draft_dto::PickRequest};
use crate::error::{DraftError, DraftResult};
use crate::services::{
    auth_user::AuthUser,
    draft_hub::{SharedDraftHub, missing_config_is_invalid},
    lobby_directory,
};

async fn require_host(pool: &SqlitePool, lobby_id: i64, participant_id: &str) -> DraftResult<()> {
    let host = lobby_directory::host_of(pool, lobby_id)
        .await?
        .ok_or(DraftError::NotFound("Lobby"))?;

    if host != participant_id {
        return Err(DraftError::Forbidden(
            "Only the lobby host can manage the draft.".to_string(),
        ));
    }
    Ok(())
}

/**
 * PUT to replace the lobby's draft configuration.
 */
pub async fn update_config(
    Extension(hub): Extension<SharedDraftHub>,
    Extension(pool): Extension<SqlitePool>,
    Path(lobby_id): Path<i64>,
    AuthUser(claims): AuthUser,
    Json(config): Json<DraftConfig>,
) -> DraftResult<impl IntoResponse> {
    info!("Configuring draft for lobby {}", lobby_id);
    require_host(&pool, lobby_id, &claims.sub).await?;

    let snapshot = hub.configure(lobby_id, config).await?;
    Ok((StatusCode::OK, Json(snapshot.config)))
}

pub async fn get_config(
    Extension(hub): Extension<SharedDraftHub>,
    Path(lobby_id): Path<i64>,
) -> DraftResult<impl IntoResponse> {
    let snapshot = hub.snapshot(lobby_id).await?;
    Ok((StatusCode::OK, Json(snapshot.config)))
}

pub async fn start_draft(
    Extension(hub): Extension<SharedDraftHub>,
    Extension(pool): Extension<SqlitePool>,
    Path(lobby_id): Path<i64>,
    AuthUser(claims): AuthUser,
) -> DraftResult<impl IntoResponse> {
    info!("Starting draft for lobby {}", lobby_id);
    require_host(&pool, lobby_id, &claims.sub).await?;

    let current = hub.snapshot(lobby_id).await.map_err(missing_config_is_invalid)?;
    if !lobby_directory::ready_to_start(&pool, lobby_id, current.config.allow_single_player).await? {
        return Err(DraftError::NotReady);
    }

    let snapshot = hub.start(lobby_id).await?;
    Ok((StatusCode::OK, Json(snapshot)))
}

/**
 * POST one hero for the current turn. Multi-pick turns arrive as one request
 * per hero; each is checked against the turn as it stands when it runs.
 */
pub async fn draft_pick(
    Extension(hub): Extension<SharedDraftHub>,
    Extension(pool): Extension<SqlitePool>,
    Path(lobby_id): Path<i64>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<PickRequest>,
) -> DraftResult<impl IntoResponse> {
    info!("{} is drafting hero {} in lobby {}", claims.sub, payload.hero_id, lobby_id);

    let team = lobby_directory::team_of(&pool, lobby_id, &claims.sub)
        .await?
        .ok_or_else(|| DraftError::Forbidden("You are not seated on a team in this lobby.".to_string()))?;

    let pick = hub.pick(lobby_id, &claims.sub, team, payload.hero_id).await?;
    Ok((StatusCode::OK, Json(pick)))
}

pub async fn cancel_draft(
    Extension(hub): Extension<SharedDraftHub>,
    Extension(pool): Extension<SqlitePool>,
    Path(lobby_id): Path<i64>,
    AuthUser(claims): AuthUser,
) -> DraftResult<impl IntoResponse> {
    info!("Cancelling draft for lobby {}", lobby_id);
    require_host(&pool, lobby_id, &claims.sub).await?;

    let snapshot = hub.cancel(lobby_id).await?;
    Ok((StatusCode::OK, Json(snapshot)))
}

pub async fn get_state(
    Extension(hub): Extension<SharedDraftHub>,
    Path(lobby_id): Path<i64>,
) -> DraftResult<impl IntoResponse> {
    let snapshot = hub.snapshot(lobby_id).await?;
    Ok((StatusCode::OK, Json(snapshot)))
}
