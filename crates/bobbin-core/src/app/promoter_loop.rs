//! Promoter loop: moves due scheduled jobs into their queues on a fixed period.
//!
//! # Flow
//! 1. Tick every `promote_interval` (missed ticks are delayed, not bunched)
//! 2. `Engine::promote_due_jobs()`: `retrying` entries flip to `pending`
//!    first, then every due entry is enqueued
//! 3. A job that cannot be promoted stays scheduled for the next tick

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::engine::Engine;

pub struct PromoterHandle {
    shutdown: Arc<watch::Sender<bool>>,
    join: JoinHandle<()>,
}

impl PromoterHandle {
    pub(crate) fn spawn(engine: Engine, interval: Duration, shutdown: Arc<watch::Sender<bool>>) -> Self {
        let rx = shutdown.subscribe();
        let join = tokio::spawn(promoter_loop(engine, interval, rx));
        Self { shutdown, join }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// The promoter never runs handlers, so this returns promptly.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn promoter_loop(engine: Engine, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_ms = interval.as_millis() as u64, "promoter started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match engine.promote_due_jobs().await {
            Ok(0) => {}
            Ok(moved) => debug!(moved, "promoted due jobs"),
            Err(e) => error!(error = %e, "promotion failed"),
        }
    }
    info!("promoter stopped");
}
