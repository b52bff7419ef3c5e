use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Team {
    Radiant,
    Dire,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PhaseType {
    Pick,
    Ban,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DraftPhase {
    pub r#type: PhaseType,
    pub team_order: Vec<Team>,
}

/**
 * Per-lobby draft configuration. Editable until the session starts.
 */
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DraftConfig {
    pub phases: Vec<DraftPhase>,
    #[serde(default)]
    pub skip_bans: bool,
    #[serde(default = "default_time_per_turn")]
    pub time_per_turn: u32,
    #[serde(default)]
    pub timer_enabled: bool,
    #[serde(default)]
    pub allow_single_player: bool,
}

fn default_time_per_turn() -> u32 {
    30
}

impl DraftConfig {
    /// Checks the shape of the phase list. Roster size is checked at start.
    pub fn validate(&self) -> Result<(), String> {
        if self.phases.is_empty() {
            return Err("draft must have at least one phase".to_string());
        }
        if let Some(index) = self.phases.iter().position(|p| p.team_order.is_empty()) {
            return Err(format!("phase {} has an empty team order", index));
        }
        if self.timer_enabled && self.time_per_turn == 0 {
            return Err("time_per_turn must be positive when the timer is enabled".to_string());
        }
        Ok(())
    }
}
