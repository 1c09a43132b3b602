use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};
use voyage_waitlist::{PromotionEngine, ReminderSweeper};

use crate::state::AppState;

/// Reclaims lapsed offers and passes their rooms down each waiting list
pub async fn run_expiry_sweeper(engine: PromotionEngine, every: Duration) {
    info!("Expiry sweeper started, running every {:?}", every);
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = engine.sweep_expired().await {
            error!("Expiry sweep failed: {}", e);
        }
    }
}

pub async fn run_reminder_sweeper(sweeper: Arc<ReminderSweeper>, every: Duration) {
    info!("Reminder sweeper started, running every {:?}", every);
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = sweeper.run_once().await {
            error!("Reminder sweep failed: {}", e);
        }
    }
}

pub fn spawn_background_workers(state: &AppState, expiry_every: Duration, reminder_every: Duration) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(run_expiry_sweeper(state.engine.clone(), expiry_every)),
        tokio::spawn(run_reminder_sweeper(state.reminders.clone(), reminder_every)),
    ]
}
