use serde::{Deserialize, Serialize};

use crate::dto::{
    draft_config_dto::{DraftConfig, PhaseType, Team},
    draft_session_dto::{DraftPick, DraftSession},
    hero_dto::Hero,
};

/// Whose turn it is, plus the run it belongs to for "N of M" displays.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct TurnView {
    pub flat_index: usize,
    pub team: Team,
    pub phase_type: PhaseType,
    pub run_start: usize,
    pub run_end: usize,
    pub remaining_in_run: usize,
    pub time_remaining: Option<i64>,
}

/**
 * Full draft state for late joiners and reconnects. Built from the same
 * state the engine mutates; there is no separate read model.
 */
#[derive(Debug, Serialize, Clone)]
pub struct DraftSnapshot {
    pub config: DraftConfig,
    pub session: DraftSession,
    pub picks: Vec<DraftPick>,
    pub available_heroes: Vec<Hero>,
    pub total_turns: usize,
    pub current_turn: Option<TurnView>,
    pub current_turn_time_remaining: Option<i64>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DraftEvent {
    DraftState { state: DraftSnapshot },
    ConfigUpdated { lobby_id: i64, config: DraftConfig },
    SessionStarted { state: DraftSnapshot },
    TurnAdvanced { lobby_id: i64, turn: TurnView },
    PickApplied { pick: DraftPick, state: DraftSnapshot },
    TurnTimedOut { pick: DraftPick, state: DraftSnapshot },
    SessionCompleted { state: DraftSnapshot },
    SessionCancelled { state: DraftSnapshot },
}

#[derive(Debug, Deserialize)]
pub struct PickRequest {
    pub hero_id: i64,
}

/// Handed to the match layer once every turn has been resolved.
#[derive(Debug, Serialize, Clone)]
pub struct CompletedDraft {
    pub lobby_id: i64,
    pub picks: Vec<DraftPick>,
}
