use sqlx::SqlitePool;

use crate::dto::draft_config_dto::Team;

/*
 * Read-only view of the lobby component's tables. Seating, readiness and
 * host assignment are owned elsewhere; the draft only consumes them.
 */

pub async fn host_of(pool: &SqlitePool, lobby_id: i64) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT host_id FROM lobbies WHERE id = ?")
        .bind(lobby_id)
        .fetch_optional(pool)
        .await
}

pub async fn team_of(
    pool: &SqlitePool,
    lobby_id: i64,
    participant_id: &str,
) -> Result<Option<Team>, sqlx::Error> {
    let team = sqlx::query_scalar::<_, Option<Team>>(
        "SELECT team FROM lobby_participants WHERE lobby_id = ? AND participant_id = ?",
    )
    .bind(lobby_id)
    .bind(participant_id)
    .fetch_optional(pool)
    .await?;

    Ok(team.flatten())
}

#[derive(sqlx::FromRow)]
struct Seat {
    team: Team,
    is_ready: bool,
}

/// Everyone seated is ready, and both sides are seated unless the lobby
/// allows a single player.
pub async fn ready_to_start(
    pool: &SqlitePool,
    lobby_id: i64,
    allow_single_player: bool,
) -> Result<bool, sqlx::Error> {
    let seats = sqlx::query_as::<_, Seat>(
        "SELECT team, is_ready FROM lobby_participants WHERE lobby_id = ? AND team IS NOT NULL",
    )
    .bind(lobby_id)
    .fetch_all(pool)
    .await?;

    if seats.is_empty() || seats.iter().any(|s| !s.is_ready) {
        return Ok(false);
    }

    if allow_single_player {
        return Ok(true);
    }

    let seated = |team: Team| seats.iter().any(|s| s.team == team);
    Ok(seated(Team::Radiant) && seated(Team::Dire))
}
