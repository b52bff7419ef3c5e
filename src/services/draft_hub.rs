use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::{
    sync::{Mutex, RwLock, broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::dto::{
    draft_config_dto::{DraftConfig, Team},
    draft_dto::{CompletedDraft, DraftEvent, DraftSnapshot},
    draft_session_dto::DraftPick,
};
use crate::error::{DraftError, DraftResult};
use crate::services::{
    draft_machine::{DraftMachine, PickOutcome, TurnStamp},
    draft_store, hero_roster,
    turn_timer::{self, TurnTimer},
    websocket::publish,
};

const EVENT_BUFFER: usize = 64;
/// Delay before a timed out turn whose commit failed is tried again.
const EXPIRY_RETRY_SECS: i64 = 1;

#[derive(Default)]
struct LobbyState {
    loaded: bool,
    machine: Option<DraftMachine>,
    timer: Option<JoinHandle<()>>,
}

struct LobbySlot {
    lobby_id: i64,
    /// Every mutation for this lobby runs while holding this lock.
    gate: Mutex<LobbyState>,
    /// Copy of the last committed machine, for readers.
    committed: RwLock<Option<DraftMachine>>,
    events: broadcast::Sender<String>,
}

impl LobbySlot {
    fn new(lobby_id: i64) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            lobby_id,
            gate: Mutex::new(LobbyState::default()),
            committed: RwLock::new(None),
            events,
        }
    }
}

/**
 * Owns every lobby's draft. Mutations for one lobby are serialized through
 * that lobby's gate and re-validated against whatever state the previous
 * holder committed; different lobbies never share a lock past the slot lookup.
 */
pub struct DraftHub {
    pool: SqlitePool,
    lobbies: Mutex<HashMap<i64, Arc<LobbySlot>>>,
    timer: TurnTimer,
    completed_tx: mpsc::UnboundedSender<CompletedDraft>,
}

pub type SharedDraftHub = Arc<DraftHub>;

impl DraftHub {
    /// Builds the hub and spawns the dispatcher that feeds timer fires back into it.
    pub fn launch(pool: SqlitePool, completed_tx: mpsc::UnboundedSender<CompletedDraft>) -> SharedDraftHub {
        let (timer, fire_rx) = TurnTimer::new();
        let hub = Arc::new(DraftHub {
            pool,
            lobbies: Mutex::new(HashMap::new()),
            timer,
            completed_tx,
        });

        tokio::spawn(turn_timer::run_dispatch(hub.clone(), fire_rx));
        hub
    }

    /// Subscribes to the lobby and reads its state under the gate. Every event
    /// is published while the gate is held, so the snapshot already covers
    /// everything before the first event the receiver sees.
    pub async fn subscribe(
        &self,
        lobby_id: i64,
    ) -> DraftResult<(broadcast::Receiver<String>, Option<DraftSnapshot>)> {
        let slot = self.slot(lobby_id).await;
        let subscribed = {
            let mut state = slot.gate.lock().await;
            let rx = slot.events.subscribe();
            self.ensure_loaded(&slot, &mut state)
                .await
                .map(|()| (rx, state.machine.as_ref().map(|m| m.snapshot(Utc::now()))))
        };

        match subscribed {
            Ok(subscription) => Ok(subscription),
            Err(e) => {
                self.release(slot).await;
                Err(e.into())
            }
        }
    }

    /// State as of the last committed mutation.
    pub async fn snapshot(&self, lobby_id: i64) -> DraftResult<DraftSnapshot> {
        let slot = self.slot(lobby_id).await;
        let result = self.read_snapshot(&slot).await;
        self.release(slot).await;
        result
    }

    pub async fn configure(&self, lobby_id: i64, config: DraftConfig) -> DraftResult<DraftSnapshot> {
        let slot = self.slot(lobby_id).await;
        let result = self.configure_slot(&slot, config).await;
        self.release(slot).await;
        result
    }

    pub async fn start(&self, lobby_id: i64) -> DraftResult<DraftSnapshot> {
        let slot = self.slot(lobby_id).await;
        let result = self.start_slot(&slot).await;
        self.release(slot).await;
        result
    }

    pub async fn pick(
        &self,
        lobby_id: i64,
        participant_id: &str,
        team: Team,
        hero_id: i64,
    ) -> DraftResult<DraftPick> {
        let slot = self.slot(lobby_id).await;
        let result = self.pick_slot(&slot, participant_id, team, hero_id).await;
        self.release(slot).await;
        result
    }

    /// Resolves a timed out turn. `Ok(None)` when `stamp` no longer names the
    /// current turn.
    pub async fn expire_turn(&self, lobby_id: i64, stamp: TurnStamp) -> DraftResult<Option<DraftPick>> {
        let slot = self.slot(lobby_id).await;
        let result = self.expire_slot(&slot, stamp).await;
        self.release(slot).await;
        result
    }

    pub async fn cancel(&self, lobby_id: i64) -> DraftResult<DraftSnapshot> {
        let slot = self.slot(lobby_id).await;
        let result = self.cancel_slot(&slot).await;
        self.release(slot).await;
        result
    }

    /// Reloads every active draft and re-arms its timer for whatever time is left.
    pub async fn resume_active(&self) -> Result<usize, sqlx::Error> {
        let lobbies = draft_store::active_lobbies(&self.pool).await?;

        for lobby_id in &lobbies {
            let slot = self.slot(*lobby_id).await;
            let mut state = slot.gate.lock().await;
            self.ensure_loaded(&slot, &mut state).await?;
            self.rearm(&slot, &mut state);
        }

        info!("Resumed {} active drafts", lobbies.len());
        Ok(lobbies.len())
    }

    /// Drops the lobby's slot once nothing needs it. Called when a subscriber leaves.
    pub async fn release_idle(&self, lobby_id: i64) {
        let slot = self.lobbies.lock().await.get(&lobby_id).cloned();
        if let Some(slot) = slot {
            self.release(slot).await;
        }
    }

    async fn read_snapshot(&self, slot: &LobbySlot) -> DraftResult<DraftSnapshot> {
        if let Some(machine) = slot.committed.read().await.as_ref() {
            return Ok(machine.snapshot(Utc::now()));
        }

        let mut state = slot.gate.lock().await;
        self.ensure_loaded(slot, &mut state).await?;
        state
            .machine
            .as_ref()
            .map(|m| m.snapshot(Utc::now()))
            .ok_or(DraftError::NotFound("Draft configuration"))
    }

    async fn configure_slot(&self, slot: &LobbySlot, config: DraftConfig) -> DraftResult<DraftSnapshot> {
        let lobby_id = slot.lobby_id;
        let mut state = slot.gate.lock().await;
        self.ensure_loaded(slot, &mut state).await?;

        let next = match state.machine.clone() {
            Some(mut machine) => {
                machine.update_config(config)?;
                machine
            }
            None => {
                let roster = hero_roster::load_heroes(&self.pool).await?;
                DraftMachine::new(lobby_id, config, roster)?
            }
        };

        draft_store::save_config(&self.pool, &next).await?;
        self.install(slot, &mut state, &next).await;
        info!("Updated draft config for lobby {}", lobby_id);

        publish(&slot.events, &DraftEvent::ConfigUpdated { lobby_id, config: next.config().clone() });
        Ok(next.snapshot(Utc::now()))
    }

    async fn start_slot(&self, slot: &LobbySlot) -> DraftResult<DraftSnapshot> {
        let mut state = slot.gate.lock().await;
        let mut next = self
            .loaded_machine(slot, &mut state)
            .await
            .map_err(missing_config_is_invalid)?;

        let roster = hero_roster::load_heroes(&self.pool).await?;
        let now = Utc::now();
        next.start(roster, now)?;

        self.commit(slot, &mut state, &next, None).await?;
        info!("Started draft for lobby {}", slot.lobby_id);

        let snapshot = next.snapshot(now);
        publish(&slot.events, &DraftEvent::SessionStarted { state: snapshot.clone() });
        announce_turn(slot, &next, now);
        self.rearm(slot, &mut state);
        Ok(snapshot)
    }

    async fn pick_slot(
        &self,
        slot: &LobbySlot,
        participant_id: &str,
        team: Team,
        hero_id: i64,
    ) -> DraftResult<DraftPick> {
        let mut state = slot.gate.lock().await;
        let mut next = self.loaded_machine(slot, &mut state).await?;

        let now = Utc::now();
        let outcome = next.apply_pick(participant_id, team, hero_id, now)?;

        self.commit(slot, &mut state, &next, Some(&outcome.pick)).await?;
        info!(
            "{} took hero {} for turn {} in lobby {}",
            participant_id, hero_id, outcome.pick.pick_order, slot.lobby_id
        );

        self.after_resolve(slot, &mut state, &next, &outcome, false, now);
        Ok(outcome.pick)
    }

    async fn expire_slot(&self, slot: &LobbySlot, stamp: TurnStamp) -> DraftResult<Option<DraftPick>> {
        let mut state = slot.gate.lock().await;
        let mut next = self.loaded_machine(slot, &mut state).await?;

        let now = Utc::now();
        let outcome = {
            let mut rng = rand::rng();
            next.expire_turn(stamp, now, &mut rng)?
        };
        let Some(outcome) = outcome else {
            return Ok(None);
        };

        if let Err(e) = self.commit(slot, &mut state, &next, Some(&outcome.pick)).await {
            // Nothing was applied and the turn is still overdue.
            self.retry_expiry(slot, &mut state, stamp);
            return Err(e);
        }
        info!(
            "Turn {} in lobby {} timed out, auto-resolved to hero {}",
            outcome.pick.pick_order, slot.lobby_id, outcome.pick.hero_id
        );

        self.after_resolve(slot, &mut state, &next, &outcome, true, now);
        Ok(Some(outcome.pick))
    }

    async fn cancel_slot(&self, slot: &LobbySlot) -> DraftResult<DraftSnapshot> {
        let mut state = slot.gate.lock().await;
        let mut next = self.loaded_machine(slot, &mut state).await?;

        next.cancel()?;

        self.commit(slot, &mut state, &next, None).await?;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        info!("Cancelled draft for lobby {}", slot.lobby_id);

        let snapshot = next.snapshot(Utc::now());
        publish(&slot.events, &DraftEvent::SessionCancelled { state: snapshot.clone() });
        Ok(snapshot)
    }

    async fn slot(&self, lobby_id: i64) -> Arc<LobbySlot> {
        let mut lobbies = self.lobbies.lock().await;
        lobbies
            .entry(lobby_id)
            .or_insert_with(|| Arc::new(LobbySlot::new(lobby_id)))
            .clone()
    }

    /// Evicts `slot` when the map and `slot` are its only handles, nobody is
    /// subscribed, and the lobby has no draft or a finished one. Handles are
    /// only cloned under the map lock, so the count cannot grow while it is held.
    async fn release(&self, slot: Arc<LobbySlot>) {
        let mut lobbies = self.lobbies.lock().await;
        let Some(current) = lobbies.get(&slot.lobby_id) else {
            return;
        };
        if !Arc::ptr_eq(current, &slot) || Arc::strong_count(&slot) > 2 || slot.events.receiver_count() > 0 {
            return;
        }

        let idle = match slot.gate.try_lock() {
            Ok(state) => state
                .machine
                .as_ref()
                .is_none_or(|m| m.session().status.is_terminal()),
            Err(_) => false,
        };
        if idle {
            lobbies.remove(&slot.lobby_id);
            debug!("Released idle lobby {}", slot.lobby_id);
        }
    }

    async fn ensure_loaded(&self, slot: &LobbySlot, state: &mut LobbyState) -> Result<(), sqlx::Error> {
        if !state.loaded {
            let machine = draft_store::load_draft(&self.pool, slot.lobby_id).await?;
            *slot.committed.write().await = machine.clone();
            state.machine = machine;
            state.loaded = true;
        }
        Ok(())
    }

    /// Working copy of the lobby's machine. Changes land only through `commit`.
    async fn loaded_machine(&self, slot: &LobbySlot, state: &mut LobbyState) -> DraftResult<DraftMachine> {
        self.ensure_loaded(slot, state).await?;
        state
            .machine
            .clone()
            .ok_or(DraftError::NotFound("Draft configuration"))
    }

    async fn commit(
        &self,
        slot: &LobbySlot,
        state: &mut LobbyState,
        next: &DraftMachine,
        pick: Option<&DraftPick>,
    ) -> DraftResult<()> {
        draft_store::save_transition(&self.pool, next.session(), pick).await?;
        self.install(slot, state, next).await;
        Ok(())
    }

    async fn install(&self, slot: &LobbySlot, state: &mut LobbyState, next: &DraftMachine) {
        *slot.committed.write().await = Some(next.clone());
        state.machine = Some(next.clone());
    }

    fn after_resolve(
        &self,
        slot: &LobbySlot,
        state: &mut LobbyState,
        machine: &DraftMachine,
        outcome: &PickOutcome,
        timed_out: bool,
        now: DateTime<Utc>,
    ) {
        let snapshot = machine.snapshot(now);
        let pick = outcome.pick.clone();
        let event = if timed_out {
            DraftEvent::TurnTimedOut { pick, state: snapshot.clone() }
        } else {
            DraftEvent::PickApplied { pick, state: snapshot.clone() }
        };
        publish(&slot.events, &event);

        if !outcome.completed {
            announce_turn(slot, machine, now);
            self.rearm(slot, state);
            return;
        }

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        info!("Draft for lobby {} completed", slot.lobby_id);
        publish(&slot.events, &DraftEvent::SessionCompleted { state: snapshot.clone() });

        let completed = CompletedDraft {
            lobby_id: slot.lobby_id,
            picks: snapshot.picks,
        };
        if self.completed_tx.send(completed).is_err() {
            warn!("No match hand-off listening for lobby {}", slot.lobby_id);
        }
    }

    fn rearm(&self, slot: &LobbySlot, state: &mut LobbyState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let Some(machine) = state.machine.as_ref() else {
            return;
        };
        if let (Some(stamp), Some(deadline)) = (machine.current_stamp(), machine.turn_deadline()) {
            state.timer = Some(self.timer.arm(slot.lobby_id, stamp, deadline));
        }
    }

    fn retry_expiry(&self, slot: &LobbySlot, state: &mut LobbyState, stamp: TurnStamp) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let deadline = Utc::now() + chrono::Duration::seconds(EXPIRY_RETRY_SECS);
        warn!("Retrying timed out turn {} in lobby {} shortly", stamp.flat_index, slot.lobby_id);
        state.timer = Some(self.timer.arm(slot.lobby_id, stamp, deadline));
    }
}

fn announce_turn(slot: &LobbySlot, machine: &DraftMachine, now: DateTime<Utc>) {
    if let Some(turn) = machine.turn_view(now) {
        publish(&slot.events, &DraftEvent::TurnAdvanced { lobby_id: slot.lobby_id, turn });
    }
}

/// Starting an unconfigured draft is a configuration problem, not a missing resource.
pub fn missing_config_is_invalid(e: DraftError) -> DraftError {
    match e {
        DraftError::NotFound(_) => DraftError::InvalidConfig("the draft has not been configured".to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db;
    use crate::dto::{
        draft_config_dto::{DraftPhase, PhaseType},
        draft_session_dto::SessionStatus,
        hero_dto::Hero,
    };

    async fn setup() -> (SqlitePool, SharedDraftHub, mpsc::UnboundedReceiver<CompletedDraft>) {
        let pool = db::memory_pool().await.unwrap();
        let heroes: Vec<Hero> = (1..=10)
            .map(|id| Hero { id, name: format!("hero{}", id) })
            .collect();
        hero_roster::save_heroes(&pool, &heroes).await.unwrap();

        let (completed_tx, completed_rx) = mpsc::unbounded_channel();
        let hub = DraftHub::launch(pool.clone(), completed_tx);
        (pool, hub, completed_rx)
    }

    fn config(phases: Vec<(PhaseType, Vec<Team>)>) -> DraftConfig {
        DraftConfig {
            phases: phases
                .into_iter()
                .map(|(r#type, team_order)| DraftPhase { r#type, team_order })
                .collect(),
            skip_bans: false,
            time_per_turn: 30,
            timer_enabled: false,
            allow_single_player: false,
        }
    }

    fn scenario() -> DraftConfig {
        config(vec![
            (PhaseType::Ban, vec![Team::Radiant, Team::Dire]),
            (PhaseType::Pick, vec![Team::Radiant, Team::Dire, Team::Dire, Team::Radiant]),
        ])
    }

    fn stamp_of(snapshot: &DraftSnapshot) -> TurnStamp {
        TurnStamp {
            flat_index: snapshot.current_turn.as_ref().unwrap().flat_index,
            turn_started_at: snapshot.session.turn_started_at.unwrap(),
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<String>) -> serde_json::Value {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .unwrap();
        serde_json::from_str(&msg).unwrap()
    }

    #[tokio::test]
    async fn unconfigured_lobby_is_not_found() {
        let (_pool, hub, _rx) = setup().await;

        assert!(matches!(hub.snapshot(1).await, Err(DraftError::NotFound(_))));
        assert!(matches!(hub.start(1).await, Err(DraftError::InvalidConfig(_))));
        assert!(matches!(hub.pick(1, "a", Team::Radiant, 1).await, Err(DraftError::NotFound(_))));
    }

    #[tokio::test]
    async fn pending_draft_shows_full_roster_and_accepts_new_config() {
        let (_pool, hub, _rx) = setup().await;

        let snapshot = hub.configure(1, scenario()).await.unwrap();
        assert_eq!(snapshot.session.status, SessionStatus::Pending);
        assert_eq!(snapshot.available_heroes.len(), 10);
        assert_eq!(snapshot.total_turns, 6);

        let mut skipped = scenario();
        skipped.skip_bans = true;
        let snapshot = hub.configure(1, skipped).await.unwrap();
        assert_eq!(snapshot.total_turns, 4);

        hub.start(1).await.unwrap();
        assert!(matches!(hub.configure(1, scenario()).await, Err(DraftError::ConfigLocked)));
        assert!(matches!(hub.start(1).await, Err(DraftError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn racing_picks_for_one_run_both_land_in_order() {
        let (_pool, hub, _rx) = setup().await;
        hub.configure(1, config(vec![(PhaseType::Pick, vec![Team::Radiant, Team::Radiant, Team::Dire])]))
            .await
            .unwrap();
        hub.start(1).await.unwrap();

        let (first, second) = tokio::join!(
            hub.pick(1, "a1", Team::Radiant, 1),
            hub.pick(1, "a2", Team::Radiant, 2),
        );
        let mut orders = vec![first.unwrap().pick_order, second.unwrap().pick_order];
        orders.sort();
        assert_eq!(orders, vec![0, 1]);

        // The run is over, a third Radiant pick is out of turn.
        let err = hub.pick(1, "a1", Team::Radiant, 3).await.unwrap_err();
        assert!(matches!(err, DraftError::NotYourTurn));
    }

    #[tokio::test]
    async fn racing_picks_for_one_turn_commit_exactly_once() {
        let (_pool, hub, _rx) = setup().await;
        hub.configure(1, scenario()).await.unwrap();
        hub.start(1).await.unwrap();

        let (first, second) = tokio::join!(
            hub.pick(1, "a1", Team::Radiant, 1),
            hub.pick(1, "a2", Team::Radiant, 2),
        );
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(DraftError::NotYourTurn))));

        let snapshot = hub.snapshot(1).await.unwrap();
        assert_eq!(snapshot.picks.len(), 1);
        assert_eq!(snapshot.current_turn.unwrap().team, Team::Dire);
    }

    #[tokio::test]
    async fn racing_for_the_same_hero_leaves_one_owner() {
        let (_pool, hub, _rx) = setup().await;
        hub.configure(1, config(vec![(PhaseType::Pick, vec![Team::Radiant, Team::Radiant])]))
            .await
            .unwrap();
        hub.start(1).await.unwrap();

        let (first, second) = tokio::join!(
            hub.pick(1, "a1", Team::Radiant, 5),
            hub.pick(1, "a2", Team::Radiant, 5),
        );
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(DraftError::HeroUnavailable(5)))));
    }

    #[tokio::test]
    async fn duplicate_expiry_resolves_turn_once() {
        let (_pool, hub, _rx) = setup().await;
        hub.configure(1, scenario()).await.unwrap();
        let snapshot = hub.start(1).await.unwrap();
        let stamp = stamp_of(&snapshot);

        let (first, second) = tokio::join!(hub.expire_turn(1, stamp), hub.expire_turn(1, stamp));
        let resolved: Vec<DraftPick> = [first.unwrap(), second.unwrap()].into_iter().flatten().collect();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].picked_by, None);
        assert_eq!(hub.snapshot(1).await.unwrap().picks.len(), 1);
    }

    #[tokio::test]
    async fn expiry_after_manual_pick_is_ignored() {
        let (_pool, hub, _rx) = setup().await;
        hub.configure(1, scenario()).await.unwrap();
        let snapshot = hub.start(1).await.unwrap();
        let stamp = stamp_of(&snapshot);

        hub.pick(1, "a1", Team::Radiant, 1).await.unwrap();

        assert!(hub.expire_turn(1, stamp).await.unwrap().is_none());
        let snapshot = hub.snapshot(1).await.unwrap();
        assert_eq!(snapshot.picks.len(), 1);
        assert_eq!(snapshot.picks[0].picked_by.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn timer_auto_resolves_idle_turn() {
        let (_pool, hub, _rx) = setup().await;
        let mut timed = scenario();
        timed.timer_enabled = true;
        timed.time_per_turn = 1;
        hub.configure(1, timed).await.unwrap();

        let (mut events, _) = hub.subscribe(1).await.unwrap();
        hub.start(1).await.unwrap();

        loop {
            let event = next_event(&mut events).await;
            if event["type"] == "turn_timed_out" {
                assert!(event["pick"]["picked_by"].is_null());
                assert_eq!(event["pick"]["pick_order"], 0);
                assert_eq!(event["pick"]["type"], "ban");
                break;
            }
        }

        let snapshot = hub.snapshot(1).await.unwrap();
        assert!(!snapshot.picks.is_empty());
        assert!(snapshot.picks[0].picked_by.is_none());
        hub.cancel(1).await.unwrap();
    }

    #[tokio::test]
    async fn events_follow_commit_order() {
        let (_pool, hub, _rx) = setup().await;
        hub.configure(1, scenario()).await.unwrap();
        let (mut events, _) = hub.subscribe(1).await.unwrap();

        hub.start(1).await.unwrap();
        assert_eq!(next_event(&mut events).await["type"], "session_started");
        let turn = next_event(&mut events).await;
        assert_eq!(turn["type"], "turn_advanced");
        assert_eq!(turn["turn"]["team"], "radiant");
        assert!(turn["turn"]["time_remaining"].is_null());

        hub.pick(1, "a1", Team::Radiant, 1).await.unwrap();
        let applied = next_event(&mut events).await;
        assert_eq!(applied["type"], "pick_applied");
        assert_eq!(applied["pick"]["hero_id"], 1);
        assert_eq!(applied["state"]["available_heroes"].as_array().unwrap().len(), 9);
        assert_eq!(next_event(&mut events).await["turn"]["team"], "dire");
    }

    #[tokio::test]
    async fn completion_is_handed_off() {
        let (_pool, hub, mut completed_rx) = setup().await;
        hub.configure(1, config(vec![(PhaseType::Pick, vec![Team::Radiant, Team::Dire])]))
            .await
            .unwrap();
        let (mut events, _) = hub.subscribe(1).await.unwrap();
        hub.start(1).await.unwrap();

        hub.pick(1, "a1", Team::Radiant, 3).await.unwrap();
        hub.pick(1, "b1", Team::Dire, 4).await.unwrap();

        let completed = completed_rx.recv().await.unwrap();
        assert_eq!(completed.lobby_id, 1);
        assert_eq!(completed.picks.iter().map(|p| p.hero_id).collect::<Vec<_>>(), vec![3, 4]);

        let mut kinds = vec![];
        while let Ok(msg) = events.try_recv() {
            let event: serde_json::Value = serde_json::from_str(&msg).unwrap();
            kinds.push(event["type"].as_str().unwrap().to_string());
        }
        assert_eq!(kinds.last().map(String::as_str), Some("session_completed"));

        let err = hub.pick(1, "a1", Team::Radiant, 5).await.unwrap_err();
        assert!(matches!(err, DraftError::SessionNotActive));
    }

    #[tokio::test]
    async fn cancel_wins_over_later_picks_and_keeps_history() {
        let (_pool, hub, _rx) = setup().await;
        hub.configure(1, scenario()).await.unwrap();
        hub.start(1).await.unwrap();
        hub.pick(1, "a1", Team::Radiant, 1).await.unwrap();

        let snapshot = hub.cancel(1).await.unwrap();
        assert_eq!(snapshot.session.status, SessionStatus::Cancelled);

        let err = hub.pick(1, "b1", Team::Dire, 2).await.unwrap_err();
        assert!(matches!(err, DraftError::SessionNotActive));
        assert!(matches!(hub.cancel(1).await, Err(DraftError::SessionNotActive)));

        let snapshot = hub.snapshot(1).await.unwrap();
        assert_eq!(snapshot.picks.len(), 1);
        assert!(snapshot.current_turn.is_none());
    }

    #[tokio::test]
    async fn restarted_hub_resyncs_from_database() {
        let (pool, hub, _rx) = setup().await;
        hub.configure(1, scenario()).await.unwrap();
        hub.start(1).await.unwrap();
        hub.pick(1, "a1", Team::Radiant, 1).await.unwrap();
        hub.pick(1, "b1", Team::Dire, 2).await.unwrap();

        let (completed_tx, _completed_rx) = mpsc::unbounded_channel();
        let fresh = DraftHub::launch(pool, completed_tx);
        assert_eq!(fresh.resume_active().await.unwrap(), 1);

        let snapshot = fresh.snapshot(1).await.unwrap();
        assert_eq!(snapshot.session.status, SessionStatus::Active);
        assert_eq!(snapshot.picks.iter().map(|p| p.hero_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(snapshot.available_heroes.len(), 8);
        assert_eq!(snapshot.current_turn.unwrap().flat_index, 2);

        fresh.pick(1, "a1", Team::Radiant, 3).await.unwrap();
    }

    #[tokio::test]
    async fn lobbies_do_not_block_each_other() {
        let (_pool, hub, _rx) = setup().await;
        hub.configure(1, scenario()).await.unwrap();
        hub.configure(2, scenario()).await.unwrap();
        hub.start(1).await.unwrap();
        hub.start(2).await.unwrap();

        // The same hero is free in every lobby.
        hub.pick(1, "a1", Team::Radiant, 1).await.unwrap();
        hub.pick(2, "x1", Team::Radiant, 1).await.unwrap();

        assert_eq!(hub.snapshot(2).await.unwrap().picks.len(), 1);
    }

    #[tokio::test]
    async fn failed_timeout_commit_is_retried() {
        let (pool, hub, _rx) = setup().await;
        let mut timed = scenario();
        timed.timer_enabled = true;
        timed.time_per_turn = 1;
        hub.configure(1, timed).await.unwrap();
        let (mut events, _) = hub.subscribe(1).await.unwrap();
        hub.start(1).await.unwrap();

        // Occupy the first pick slot so the first auto-resolve cannot be stored.
        sqlx::query(
            "INSERT INTO draft_picks (lobby_id, pick_order, hero_id, team, type, picked_by, picked_at) \
             VALUES (1, 0, 99, NULL, 'ban', NULL, '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(hub.snapshot(1).await.unwrap().picks.is_empty());
        sqlx::query("DELETE FROM draft_picks WHERE lobby_id = 1")
            .execute(&pool)
            .await
            .unwrap();

        loop {
            let event = next_event(&mut events).await;
            if event["type"] == "turn_timed_out" {
                assert_eq!(event["pick"]["pick_order"], 0);
                break;
            }
        }

        let snapshot = hub.snapshot(1).await.unwrap();
        assert_eq!(snapshot.picks[0].pick_order, 0);
        assert_ne!(snapshot.picks[0].hero_id, 99);
        hub.cancel(1).await.unwrap();
    }

    #[tokio::test]
    async fn reads_of_unknown_lobbies_leave_no_slots() {
        let (_pool, hub, _rx) = setup().await;

        for lobby_id in 100..200 {
            assert!(matches!(hub.snapshot(lobby_id).await, Err(DraftError::NotFound(_))));
        }
        assert!(matches!(hub.pick(7, "a1", Team::Radiant, 1).await, Err(DraftError::NotFound(_))));

        assert!(hub.lobbies.lock().await.is_empty());
    }

    #[tokio::test]
    async fn finished_lobbies_are_released_once_unwatched() {
        let (_pool, hub, _rx) = setup().await;
        hub.configure(1, scenario()).await.unwrap();
        hub.configure(2, scenario()).await.unwrap();
        hub.start(1).await.unwrap();
        hub.start(2).await.unwrap();
        hub.pick(1, "a1", Team::Radiant, 1).await.unwrap();
        assert_eq!(hub.lobbies.lock().await.len(), 2);

        hub.cancel(1).await.unwrap();
        assert_eq!(hub.lobbies.lock().await.len(), 1);

        // History is still served, without keeping the lobby resident.
        let snapshot = hub.snapshot(1).await.unwrap();
        assert_eq!(snapshot.session.status, SessionStatus::Cancelled);
        assert_eq!(snapshot.picks.len(), 1);
        assert!(!hub.lobbies.lock().await.contains_key(&1));

        // A watched lobby stays until its last subscriber leaves.
        let (events, _) = hub.subscribe(2).await.unwrap();
        hub.cancel(2).await.unwrap();
        assert!(hub.lobbies.lock().await.contains_key(&2));

        drop(events);
        hub.release_idle(2).await;
        assert!(hub.lobbies.lock().await.is_empty());
    }

    #[tokio::test]
    async fn subscription_snapshot_precedes_live_events() {
        let (_pool, hub, _rx) = setup().await;
        hub.configure(1, scenario()).await.unwrap();
        hub.start(1).await.unwrap();
        hub.pick(1, "a1", Team::Radiant, 1).await.unwrap();

        let (mut events, state) = hub.subscribe(1).await.unwrap();
        let state = state.unwrap();
        assert_eq!(state.picks.len(), 1);
        assert_eq!(state.current_turn.as_ref().unwrap().team, Team::Dire);

        hub.pick(1, "b1", Team::Dire, 2).await.unwrap();
        let applied = next_event(&mut events).await;
        assert_eq!(applied["type"], "pick_applied");
        assert_eq!(applied["pick"]["pick_order"], 1);
    }

    #[tokio::test]
    async fn subscribing_during_a_pick_never_repeats_it() {
        let (_pool, hub, _rx) = setup().await;
        hub.configure(1, scenario()).await.unwrap();
        hub.start(1).await.unwrap();

        let (subscribed, picked) = tokio::join!(hub.subscribe(1), hub.pick(1, "a1", Team::Radiant, 1));
        picked.unwrap();
        let (mut events, state) = subscribed.unwrap();
        let seen = state.unwrap().picks.len();

        let mut applied = vec![];
        while let Ok(msg) = events.try_recv() {
            let event: serde_json::Value = serde_json::from_str(&msg).unwrap();
            if event["type"] == "pick_applied" {
                applied.push(event["pick"]["pick_order"].as_u64().unwrap() as usize);
            }
        }

        // Either the snapshot holds the pick or the stream delivers it, not both.
        assert_eq!(seen + applied.len(), 1);
        assert!(applied.iter().all(|order| *order >= seen));
    }

    #[tokio::test]
    async fn subscribing_before_configuration_has_no_snapshot() {
        let (_pool, hub, _rx) = setup().await;

        let (mut events, state) = hub.subscribe(3).await.unwrap();
        assert!(state.is_none());

        hub.configure(3, scenario()).await.unwrap();
        assert_eq!(next_event(&mut events).await["type"], "config_updated");
    }
}
