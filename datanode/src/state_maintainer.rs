use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use utilities::logger::error;

use crate::namenode::service::NamenodeService;

/// Keeps this datanode alive in the namenode registry.
pub struct StateMaintainer {
    namenode_service: NamenodeService,
}

impl StateMaintainer {
    pub fn new(namenode_service: NamenodeService) -> Self {
        Self { namenode_service }
    }

    pub fn start_heart_beat_loop(self, duration: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.namenode_service.send_heart_beat().await {
                    error!("Error while sending heartbeat to namenode {e}");
                }
            }
        })
    }
}
