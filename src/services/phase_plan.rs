use crate::dto::draft_config_dto::{DraftConfig, PhaseType, Team};

/// A single position in the compiled draft order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn {
    pub team: Team,
    pub phase_type: PhaseType,
    pub phase_index: usize,
    pub pick_index: usize,
}

/**
 * Flat turn order compiled from a draft config. Ban phases are dropped when
 * `skip_bans` is set; their phase indices simply never appear.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSequence {
    turns: Vec<Turn>,
}

impl TurnSequence {
    pub fn compile(config: &DraftConfig) -> Self {
        let turns = config
            .phases
            .iter()
            .enumerate()
            .filter(|(_, phase)| !(config.skip_bans && phase.r#type == PhaseType::Ban))
            .flat_map(|(phase_index, phase)| {
                phase.team_order.iter().enumerate().map(move |(pick_index, team)| Turn {
                    team: *team,
                    phase_type: phase.r#type,
                    phase_index,
                    pick_index,
                })
            })
            .collect();

        Self { turns }
    }

    pub fn total_turns(&self) -> usize {
        self.turns.len()
    }

    pub fn get(&self, flat_index: usize) -> Option<&Turn> {
        self.turns.get(flat_index)
    }

    pub fn first(&self) -> Option<&Turn> {
        self.turns.first()
    }

    pub fn index_of(&self, phase_index: usize, pick_index: usize) -> Option<usize> {
        self.turns
            .iter()
            .position(|t| t.phase_index == phase_index && t.pick_index == pick_index)
    }

    /// Inclusive bounds of the run of same team and type containing
    /// `flat_index`. Runs may cross phase boundaries.
    pub fn run_bounds(&self, flat_index: usize) -> Option<(usize, usize)> {
        let turn = self.turns.get(flat_index)?;
        let same_run = |other: &Turn| other.team == turn.team && other.phase_type == turn.phase_type;

        let mut start = flat_index;
        while start > 0 && same_run(&self.turns[start - 1]) {
            start -= 1;
        }

        let mut end = flat_index;
        while end + 1 < self.turns.len() && same_run(&self.turns[end + 1]) {
            end += 1;
        }

        Some((start, end))
    }
}
