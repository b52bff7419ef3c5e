use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::dto::{
    draft_config_dto::{DraftConfig, PhaseType, Team},
    draft_dto::{DraftSnapshot, TurnView},
    draft_session_dto::{DraftPick, DraftSession, SessionStatus},
    hero_dto::Hero,
};
use crate::error::{DraftError, DraftResult};
use crate::services::phase_plan::{Turn, TurnSequence};

/// Identifies the exact turn a timer was armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnStamp {
    pub flat_index: usize,
    pub turn_started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PickOutcome {
    pub pick: DraftPick,
    pub completed: bool,
}

/**
 * Draft state for one lobby: config, session pointer, pick history and the
 * hero roster the available pool is derived from.
 *
 * Every transition validates before touching any field, so a rejected call
 * leaves the machine exactly as it was.
 */
#[derive(Debug, Clone)]
pub struct DraftMachine {
    config: DraftConfig,
    sequence: TurnSequence,
    session: DraftSession,
    picks: Vec<DraftPick>,
    roster: Vec<Hero>,
}

impl DraftMachine {
    pub fn new(lobby_id: i64, config: DraftConfig, roster: Vec<Hero>) -> DraftResult<Self> {
        config.validate().map_err(DraftError::InvalidConfig)?;

        Ok(Self {
            sequence: TurnSequence::compile(&config),
            config,
            session: DraftSession::pending(lobby_id),
            picks: vec![],
            roster,
        })
    }

    pub fn restore(
        config: DraftConfig,
        session: DraftSession,
        mut picks: Vec<DraftPick>,
        roster: Vec<Hero>,
    ) -> Self {
        picks.sort_by_key(|p| p.pick_order);
        Self {
            sequence: TurnSequence::compile(&config),
            config,
            session,
            picks,
            roster,
        }
    }

    pub fn config(&self) -> &DraftConfig {
        &self.config
    }

    pub fn session(&self) -> &DraftSession {
        &self.session
    }

    pub fn picks(&self) -> &[DraftPick] {
        &self.picks
    }

    pub fn update_config(&mut self, config: DraftConfig) -> DraftResult<()> {
        if self.session.status != SessionStatus::Pending {
            return Err(DraftError::ConfigLocked);
        }
        config.validate().map_err(DraftError::InvalidConfig)?;

        self.sequence = TurnSequence::compile(&config);
        self.config = config;
        Ok(())
    }

    pub fn start(&mut self, roster: Vec<Hero>, now: DateTime<Utc>) -> DraftResult<()> {
        if self.session.status != SessionStatus::Pending {
            return Err(DraftError::AlreadyStarted);
        }
        self.config.validate().map_err(DraftError::InvalidConfig)?;

        let first = *self
            .sequence
            .first()
            .ok_or_else(|| DraftError::InvalidConfig("no turns left after skipping bans".to_string()))?;

        let total = self.sequence.total_turns();
        if total > roster.len() {
            return Err(DraftError::InvalidConfig(format!(
                "{} turns configured but only {} heroes exist",
                total,
                roster.len()
            )));
        }

        self.roster = roster;
        self.session.status = SessionStatus::Active;
        self.session.current_phase_index = first.phase_index;
        self.session.current_pick_index = first.pick_index;
        self.session.current_team = Some(first.team);
        self.session.started_at = Some(now);
        self.session.turn_started_at = Some(now);
        Ok(())
    }

    pub fn apply_pick(
        &mut self,
        participant_id: &str,
        team: Team,
        hero_id: i64,
        now: DateTime<Utc>,
    ) -> DraftResult<PickOutcome> {
        let (_, turn) = self.active_turn()?;

        if team != turn.team {
            return Err(DraftError::NotYourTurn);
        }
        if !self.is_available(hero_id) {
            return Err(DraftError::HeroUnavailable(hero_id));
        }

        self.resolve(hero_id, Some(participant_id.to_string()), now)
    }

    /// Auto-resolves the turn `stamp` was armed for. Returns `Ok(None)` when a
    /// faster pick already moved past that turn.
    pub fn expire_turn<R: Rng + ?Sized>(
        &mut self,
        stamp: TurnStamp,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> DraftResult<Option<PickOutcome>> {
        let (flat_index, _) = self.active_turn()?;

        if self.current_stamp() != Some(stamp) {
            return Ok(None);
        }

        let available = self.available_heroes();
        let hero = available
            .choose(rng)
            .ok_or(DraftError::RosterExhausted(flat_index))?;

        self.resolve(hero.id, None, now).map(Some)
    }

    pub fn cancel(&mut self) -> DraftResult<()> {
        if self.session.status.is_terminal() {
            return Err(DraftError::SessionNotActive);
        }
        self.session.status = SessionStatus::Cancelled;
        Ok(())
    }

    pub fn available_heroes(&self) -> Vec<Hero> {
        let taken: HashSet<i64> = self.picks.iter().map(|p| p.hero_id).collect();
        self.roster
            .iter()
            .filter(|h| !taken.contains(&h.id))
            .cloned()
            .collect()
    }

    pub fn is_available(&self, hero_id: i64) -> bool {
        self.roster.iter().any(|h| h.id == hero_id) && !self.picks.iter().any(|p| p.hero_id == hero_id)
    }

    pub fn current_flat_index(&self) -> Option<usize> {
        self.sequence
            .index_of(self.session.current_phase_index, self.session.current_pick_index)
    }

    pub fn current_stamp(&self) -> Option<TurnStamp> {
        if self.session.status != SessionStatus::Active {
            return None;
        }
        Some(TurnStamp {
            flat_index: self.current_flat_index()?,
            turn_started_at: self.session.turn_started_at?,
        })
    }

    /// Seconds left on the running turn. `None` when the timer is off or no
    /// turn is running.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        let deadline = self.turn_deadline()?;
        Some((deadline - now).num_seconds().max(0))
    }

    /// When the running turn times out, if the timer is on.
    pub fn turn_deadline(&self) -> Option<DateTime<Utc>> {
        if !self.config.timer_enabled || self.session.status != SessionStatus::Active {
            return None;
        }
        let started = self.session.turn_started_at?;
        Some(started + Duration::seconds(i64::from(self.config.time_per_turn)))
    }

    pub fn turn_view(&self, now: DateTime<Utc>) -> Option<TurnView> {
        let (flat_index, turn) = self.active_turn().ok()?;
        let (run_start, run_end) = self.sequence.run_bounds(flat_index)?;

        Some(TurnView {
            flat_index,
            team: turn.team,
            phase_type: turn.phase_type,
            run_start,
            run_end,
            remaining_in_run: run_end + 1 - flat_index,
            time_remaining: self.time_remaining(now),
        })
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> DraftSnapshot {
        DraftSnapshot {
            config: self.config.clone(),
            session: self.session.clone(),
            picks: self.picks.clone(),
            available_heroes: self.available_heroes(),
            total_turns: self.sequence.total_turns(),
            current_turn: self.turn_view(now),
            current_turn_time_remaining: self.time_remaining(now),
        }
    }

    fn active_turn(&self) -> DraftResult<(usize, Turn)> {
        if self.session.status != SessionStatus::Active {
            return Err(DraftError::SessionNotActive);
        }
        // The pointer always names a compiled turn while active.
        self.current_flat_index()
            .and_then(|i| self.sequence.get(i).map(|t| (i, *t)))
            .ok_or(DraftError::SessionNotActive)
    }

    fn resolve(
        &mut self,
        hero_id: i64,
        picked_by: Option<String>,
        now: DateTime<Utc>,
    ) -> DraftResult<PickOutcome> {
        let (flat_index, turn) = self.active_turn()?;

        let pick = DraftPick {
            hero_id,
            team: match turn.phase_type {
                PhaseType::Pick => Some(turn.team),
                PhaseType::Ban => None,
            },
            r#type: turn.phase_type,
            pick_order: flat_index,
            picked_by,
            picked_at: now,
        };
        self.picks.push(pick.clone());

        let completed = match self.sequence.get(flat_index + 1).copied() {
            Some(next) => {
                self.session.current_phase_index = next.phase_index;
                self.session.current_pick_index = next.pick_index;
                self.session.current_team = Some(next.team);
                self.session.turn_started_at = Some(now);
                false
            }
            None => {
                self.session.status = SessionStatus::Completed;
                true
            }
        };

        Ok(PickOutcome { pick, completed })
    }
}
