use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use utilities::logger::{Instrument, Level, error, info, span};

use super::NamenodeState;

/// Runs the liveness sweep on its own timer so slow client requests never
/// delay failure detection.
pub struct StateMaintainer {
    namenode_state: Arc<NamenodeState>,
    sweep_interval: Duration,
    heartbeat_timeout: Duration,
}

impl StateMaintainer {
    pub fn new(
        namenode_state: Arc<NamenodeState>,
        sweep_interval: Duration,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            namenode_state,
            sweep_interval,
            heartbeat_timeout,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let span = span!(Level::INFO, "namenode_liveness_sweep");
                let report = self
                    .namenode_state
                    .sweep_liveness(self.heartbeat_timeout)
                    .instrument(span)
                    .await;
                if !report.newly_dead.is_empty() {
                    info!(newly_dead = ?report.newly_dead, "Datanodes marked dead");
                }
                if !report.repair.lost.is_empty() {
                    error!(lost_blocks = report.repair.lost.len(), "Blocks without any live replica");
                }
            }
        })
    }
}
