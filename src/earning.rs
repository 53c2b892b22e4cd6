use std::sync::{Arc, Mutex};
use std::time::Duration;

use nostr_sdk::prelude::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Terms of a listening-reward promo for one track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoDetails {
    pub promo_id: String,
    pub content_id: String,
    /// Seconds of continuous listening per reward.
    pub interval_secs: u64,
    /// Payout per completed interval, in millisats.
    pub msat_per_interval: u64,
    /// Total promo budget for this listener, in millisats.
    pub budget_msat: u64,
}

/// Accumulated reward state for one session.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RewardTotals {
    pub elapsed_secs: u64,
    pub last_reward_at: Option<u64>,
    pub total_earned_msat: u64,
}

/// Events emitted by the earning timer loop.
#[derive(Debug, Clone)]
pub enum RewardEvent {
    Earned {
        promo_id: String,
        amount_msat: u64,
        total_earned_msat: u64,
    },
    BudgetExhausted {
        promo_id: String,
    },
}

/// Reward state for one listening session.
///
/// All mutable reward state lives here, owned by the controller that created
/// it — nothing is process-wide, so two sessions can never bleed into each
/// other.
#[derive(Debug)]
pub struct EarningSession {
    promo: PromoDetails,
    totals: RewardTotals,
}

impl EarningSession {
    pub fn new(promo: PromoDetails) -> Self {
        Self {
            promo,
            totals: RewardTotals::default(),
        }
    }

    pub fn promo(&self) -> &PromoDetails {
        &self.promo
    }

    pub fn totals(&self) -> RewardTotals {
        self.totals
    }

    /// One timer tick at `now_secs`.
    ///
    /// Accrues listening time and pays out one interval's reward, clamped to
    /// the remaining budget. A tick that fires less than a full interval
    /// after the previous payout pays nothing, so an early or duplicated
    /// tick cannot double-pay.
    pub fn tick(&mut self, now_secs: u64) -> Option<RewardEvent> {
        self.totals.elapsed_secs = self
            .totals
            .elapsed_secs
            .saturating_add(self.promo.interval_secs);

        if let Some(last) = self.totals.last_reward_at {
            if now_secs.saturating_sub(last) < self.promo.interval_secs {
                return None;
            }
        }

        let remaining = self
            .promo
            .budget_msat
            .saturating_sub(self.totals.total_earned_msat);
        if remaining == 0 {
            return Some(RewardEvent::BudgetExhausted {
                promo_id: self.promo.promo_id.clone(),
            });
        }

        let amount = self.promo.msat_per_interval.min(remaining);
        self.totals.total_earned_msat += amount;
        self.totals.last_reward_at = Some(now_secs);
        Some(RewardEvent::Earned {
            promo_id: self.promo.promo_id.clone(),
            amount_msat: amount,
            total_earned_msat: self.totals.total_earned_msat,
        })
    }
}

/// Owns one [`EarningSession`] and its timer task.
///
/// `start` spawns an interval loop that ticks the session and broadcasts
/// [`RewardEvent`]s; `stop` (or dropping the controller) aborts it.
pub struct EarningController {
    session: Arc<Mutex<EarningSession>>,
    tx: broadcast::Sender<RewardEvent>,
    handle: Option<JoinHandle<()>>,
}

impl EarningController {
    /// Create a controller for a new session.
    ///
    /// Returns the controller and a broadcast receiver for reward events.
    pub fn new(promo: PromoDetails) -> (Self, broadcast::Receiver<RewardEvent>) {
        let (tx, rx) = broadcast::channel(64);
        (
            Self {
                session: Arc::new(Mutex::new(EarningSession::new(promo))),
                tx,
                handle: None,
            },
            rx,
        )
    }

    /// Get an additional broadcast receiver for reward events.
    pub fn subscribe(&self) -> broadcast::Receiver<RewardEvent> {
        self.tx.subscribe()
    }

    /// Spawn the timer loop. No-op if already running.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let session = self.session.clone();
        let tx = self.tx.clone();
        let interval_secs = match self.session.lock() {
            // interval(0) would panic
            Ok(s) => s.promo.interval_secs.max(1),
            Err(_) => return,
        };

        self.handle = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(Duration::from_secs(interval_secs));
            // The first tick completes immediately; skip it so the session
            // only accrues completed intervals.
            timer.tick().await;
            loop {
                timer.tick().await;
                let event = {
                    let Ok(mut session) = session.lock() else {
                        break;
                    };
                    session.tick(Timestamp::now().as_u64())
                };
                match event {
                    Some(event @ RewardEvent::BudgetExhausted { .. }) => {
                        let _ = tx.send(event);
                        break;
                    }
                    Some(event) => {
                        let _ = tx.send(event);
                    }
                    None => {}
                }
            }
        }));
    }

    /// Abort the timer loop. Accumulated totals remain readable.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn totals(&self) -> Result<RewardTotals> {
        self.session
            .lock()
            .map(|s| s.totals())
            .map_err(|_| Error::StatePoisoned)
    }
}

impl Drop for EarningController {
    fn drop(&mut self) {
        self.stop();
    }
}
