use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{debug, error};

use crate::error::DraftError;
use crate::services::{draft_hub::DraftHub, draft_machine::TurnStamp};

#[derive(Debug, Clone, Copy)]
pub struct TimerFire {
    pub lobby_id: i64,
    pub stamp: TurnStamp,
}

/**
 * Arms per-turn countdowns. A countdown never touches draft state itself: it
 * only reports the stamp it was armed with, and the dispatcher feeds that back
 * through the hub where it is re-checked against the current turn.
 */
#[derive(Clone)]
pub struct TurnTimer {
    fire_tx: mpsc::UnboundedSender<TimerFire>,
}

impl TurnTimer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFire>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        (Self { fire_tx }, fire_rx)
    }

    pub fn arm(&self, lobby_id: i64, stamp: TurnStamp, deadline: DateTime<Utc>) -> JoinHandle<()> {
        let wait = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let fire_tx = self.fire_tx.clone();

        tokio::spawn(async move {
            sleep(wait).await;
            let _ = fire_tx.send(TimerFire { lobby_id, stamp });
        })
    }
}

pub async fn run_dispatch(hub: Arc<DraftHub>, mut fire_rx: mpsc::UnboundedReceiver<TimerFire>) {
    while let Some(fire) = fire_rx.recv().await {
        let hub = hub.clone();
        tokio::spawn(async move {
            match hub.expire_turn(fire.lobby_id, fire.stamp).await {
                Ok(Some(pick)) => {
                    debug!("Turn {} in lobby {} timed out onto hero {}", pick.pick_order, fire.lobby_id, pick.hero_id)
                }
                Ok(None) | Err(DraftError::SessionNotActive) => {
                    debug!("Ignoring stale timer for lobby {} turn {}", fire.lobby_id, fire.stamp.flat_index)
                }
                Err(e) => error!("Failed to resolve timed out turn in lobby {}: {}", fire.lobby_id, e),
            }
        });
    }
}
