use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dto::draft_config_dto::{PhaseType, Team};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DraftSession {
    pub lobby_id: i64,
    pub status: SessionStatus,
    pub current_phase_index: usize,
    pub current_pick_index: usize,
    pub current_team: Option<Team>,
    pub started_at: Option<DateTime<Utc>>,
    pub turn_started_at: Option<DateTime<Utc>>,
}

impl DraftSession {
    pub fn pending(lobby_id: i64) -> Self {
        Self {
            lobby_id,
            status: SessionStatus::Pending,
            current_phase_index: 0,
            current_pick_index: 0,
            current_team: None,
            started_at: None,
            turn_started_at: None,
        }
    }
}

/**
 * One resolved turn. `team` is only set for picks; `picked_by` is empty
 * when the turn timer resolved it.
 */
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DraftPick {
    pub hero_id: i64,
    pub team: Option<Team>,
    pub r#type: PhaseType,
    pub pick_order: usize,
    pub picked_by: Option<String>,
    pub picked_at: DateTime<Utc>,
}
