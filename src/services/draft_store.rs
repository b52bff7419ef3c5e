use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction, types::Json};

use crate::dto::{
    draft_config_dto::{DraftConfig, DraftPhase, PhaseType, Team},
    draft_session_dto::{DraftPick, DraftSession, SessionStatus},
};
use crate::services::{draft_machine::DraftMachine, hero_roster};

#[derive(FromRow)]
struct ConfigRow {
    phases: Json<Vec<DraftPhase>>,
    skip_bans: bool,
    time_per_turn: i64,
    timer_enabled: bool,
    allow_single_player: bool,
}

#[derive(FromRow)]
struct SessionRow {
    lobby_id: i64,
    status: SessionStatus,
    current_phase_index: i64,
    current_pick_index: i64,
    current_team: Option<Team>,
    started_at: Option<DateTime<Utc>>,
    turn_started_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct PickRow {
    hero_id: i64,
    team: Option<Team>,
    #[sqlx(rename = "type")]
    pick_type: PhaseType,
    pick_order: i64,
    picked_by: Option<String>,
    picked_at: DateTime<Utc>,
}

impl From<ConfigRow> for DraftConfig {
    fn from(row: ConfigRow) -> Self {
        DraftConfig {
            phases: row.phases.0,
            skip_bans: row.skip_bans,
            time_per_turn: row.time_per_turn.max(0) as u32,
            timer_enabled: row.timer_enabled,
            allow_single_player: row.allow_single_player,
        }
    }
}

impl From<SessionRow> for DraftSession {
    fn from(row: SessionRow) -> Self {
        DraftSession {
            lobby_id: row.lobby_id,
            status: row.status,
            current_phase_index: row.current_phase_index as usize,
            current_pick_index: row.current_pick_index as usize,
            current_team: row.current_team,
            started_at: row.started_at,
            turn_started_at: row.turn_started_at,
        }
    }
}

impl From<PickRow> for DraftPick {
    fn from(row: PickRow) -> Self {
        DraftPick {
            hero_id: row.hero_id,
            team: row.team,
            r#type: row.pick_type,
            pick_order: row.pick_order as usize,
            picked_by: row.picked_by,
            picked_at: row.picked_at,
        }
    }
}

/**
 * Rebuilds a lobby's draft from its persisted config, session and picks.
 * `None` when the lobby was never configured.
 */
pub async fn load_draft(pool: &SqlitePool, lobby_id: i64) -> Result<Option<DraftMachine>, sqlx::Error> {
    let config = sqlx::query_as::<_, ConfigRow>(
        r#"
        SELECT phases, skip_bans, time_per_turn, timer_enabled, allow_single_player
        FROM draft_configs WHERE lobby_id = ?
        "#,
    )
    .bind(lobby_id)
    .fetch_optional(pool)
    .await?;

    let Some(config) = config else {
        return Ok(None);
    };

    let session = sqlx::query_as::<_, SessionRow>(
        r#"
        SELECT lobby_id, status, current_phase_index, current_pick_index,
               current_team, started_at, turn_started_at
        FROM draft_sessions WHERE lobby_id = ?
        "#,
    )
    .bind(lobby_id)
    .fetch_optional(pool)
    .await?
    .map(DraftSession::from)
    .unwrap_or_else(|| DraftSession::pending(lobby_id));

    let picks = sqlx::query_as::<_, PickRow>(
        r#"
        SELECT hero_id, team, type, pick_order, picked_by, picked_at
        FROM draft_picks WHERE lobby_id = ?
        ORDER BY pick_order
        "#,
    )
    .bind(lobby_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(DraftPick::from)
    .collect();

    let roster = hero_roster::load_heroes(pool).await?;

    Ok(Some(DraftMachine::restore(config.into(), session, picks, roster)))
}

/// Writes the config and pending session for a lobby that is still being set up.
pub async fn save_config(pool: &SqlitePool, machine: &DraftMachine) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    let lobby_id = machine.session().lobby_id;
    let config = machine.config();

    sqlx::query(
        r#"
        INSERT INTO draft_configs (lobby_id, phases, skip_bans, time_per_turn, timer_enabled, allow_single_player)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(lobby_id) DO UPDATE SET
            phases = excluded.phases,
            skip_bans = excluded.skip_bans,
            time_per_turn = excluded.time_per_turn,
            timer_enabled = excluded.timer_enabled,
            allow_single_player = excluded.allow_single_player
        "#,
    )
    .bind(lobby_id)
    .bind(Json(&config.phases))
    .bind(config.skip_bans)
    .bind(i64::from(config.time_per_turn))
    .bind(config.timer_enabled)
    .bind(config.allow_single_player)
    .execute(&mut *tx)
    .await?;

    upsert_session(&mut tx, machine.session()).await?;
    tx.commit().await
}

/// Commits one transition: the new session row plus the pick it produced.
pub async fn save_transition(
    pool: &SqlitePool,
    session: &DraftSession,
    pick: Option<&DraftPick>,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    upsert_session(&mut tx, session).await?;

    if let Some(pick) = pick {
        sqlx::query(
            r#"
            INSERT INTO draft_picks (lobby_id, pick_order, hero_id, team, type, picked_by, picked_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.lobby_id)
        .bind(pick.pick_order as i64)
        .bind(pick.hero_id)
        .bind(pick.team)
        .bind(pick.r#type)
        .bind(&pick.picked_by)
        .bind(pick.picked_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

pub async fn active_lobbies(pool: &SqlitePool) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT lobby_id FROM draft_sessions WHERE status = ?")
        .bind(SessionStatus::Active)
        .fetch_all(pool)
        .await
}

async fn upsert_session(
    tx: &mut Transaction<'_, Sqlite>,
    session: &DraftSession,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO draft_sessions (lobby_id, status, current_phase_index, current_pick_index,
                                    current_team, started_at, turn_started_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(lobby_id) DO UPDATE SET
            status = excluded.status,
            current_phase_index = excluded.current_phase_index,
            current_pick_index = excluded.current_pick_index,
            current_team = excluded.current_team,
            started_at = excluded.started_at,
            turn_started_at = excluded.turn_started_at
        "#,
    )
    .bind(session.lobby_id)
    .bind(session.status)
    .bind(session.current_phase_index as i64)
    .bind(session.current_pick_index as i64)
    .bind(session.current_team)
    .bind(session.started_at)
    .bind(session.turn_started_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
