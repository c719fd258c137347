pub mod datanode_details;

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use proto::tree::DatanodeStatus;
use tokio::{sync::Mutex, time::Instant};
use utilities::logger::{info, instrument, tracing, warn};

use crate::{error::RegistryError, namespace::node::BlockId};
use datanode_details::{DatanodeEndpoint, DatanodeId, DatanodeRecord, DatanodeState};

/// Known datanodes and their liveness. One lock guards every record so a
/// heartbeat and a sweep touching the same node are always serialized, and
/// `now` is read while holding it.
#[derive(Debug, Default)]
pub struct DatanodeRegistry {
    datanodes: Mutex<HashMap<DatanodeId, DatanodeRecord>>,
}

impl DatanodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes a record. Blocks already attributed to the node
    /// are kept, a restarted datanode still has them on disk.
    #[instrument(name = "registry_register", skip(self))]
    pub async fn register(&self, id: &str, address: &str, port: u16) -> bool {
        let mut datanodes = self.datanodes.lock().await;
        let now = Instant::now();
        match datanodes.get_mut(id) {
            Some(record) => {
                record.address = address.to_owned();
                record.port = port;
                record.mark_heartbeat(now);
                info!("Datanode re-registered");
                false
            }
            None => {
                datanodes.insert(id.to_owned(), DatanodeRecord::new(id, address, port, now));
                info!("Datanode registered");
                true
            }
        }
    }

    /// Returns true when the node was dead and rejoined.
    pub async fn heartbeat(&self, id: &str) -> Result<bool, RegistryError> {
        let mut datanodes = self.datanodes.lock().await;
        let now = Instant::now();
        let record = datanodes
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDataNode(id.to_owned()))?;
        let rejoined = record.mark_heartbeat(now);
        if rejoined {
            info!(datanode_id = %id, "Dead datanode rejoined");
        }
        Ok(rejoined)
    }

    /// Marks every active node silent for longer than `timeout` as dead and
    /// returns the ids that transitioned in this call.
    pub async fn sweep_liveness(&self, timeout: Duration) -> Vec<DatanodeId> {
        let mut datanodes = self.datanodes.lock().await;
        let now = Instant::now();
        let mut newly_dead: Vec<DatanodeId> = datanodes
            .values_mut()
            .filter(|record| record.is_active() && record.is_stale(now, timeout))
            .map(|record| {
                record.state = DatanodeState::Dead;
                warn!(datanode_id = %record.id, "Datanode missed its heartbeats, marked dead");
                record.id.clone()
            })
            .collect();
        newly_dead.sort();
        newly_dead
    }

    /// Snapshot of the active nodes ordered by ascending id. Only valid for
    /// the operation that asked for it.
    pub async fn list_active(&self) -> Vec<DatanodeEndpoint> {
        let datanodes = self.datanodes.lock().await;
        let mut active: Vec<DatanodeEndpoint> = datanodes
            .values()
            .filter(|record| record.is_active())
            .map(DatanodeRecord::endpoint)
            .collect();
        active.sort();
        active
    }

    pub async fn dead_ids(&self) -> Vec<DatanodeId> {
        let datanodes = self.datanodes.lock().await;
        let mut dead: Vec<DatanodeId> = datanodes
            .values()
            .filter(|record| !record.is_active())
            .map(|record| record.id.clone())
            .collect();
        dead.sort();
        dead
    }

    pub async fn get(&self, id: &str) -> Option<DatanodeRecord> {
        self.datanodes.lock().await.get(id).cloned()
    }

    pub async fn held_blocks(&self, id: &str) -> HashSet<BlockId> {
        self.datanodes
            .lock()
            .await
            .get(id)
            .map(|record| record.held_block_ids.clone())
            .unwrap_or_default()
    }

    pub async fn add_held_block(&self, id: &str, block_id: &str) {
        if let Some(record) = self.datanodes.lock().await.get_mut(id) {
            record.held_block_ids.insert(block_id.to_owned());
        }
    }

    pub async fn forget_blocks(&self, block_ids: &[BlockId]) {
        let mut datanodes = self.datanodes.lock().await;
        for record in datanodes.values_mut() {
            for block_id in block_ids {
                record.held_block_ids.remove(block_id);
            }
        }
    }

    pub async fn statuses(&self) -> Vec<DatanodeStatus> {
        let datanodes = self.datanodes.lock().await;
        let now = Instant::now();
        let mut statuses: Vec<DatanodeStatus> =
            datanodes.values().map(|record| record.status(now)).collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    pub async fn len(&self) -> usize {
        self.datanodes.lock().await.len()
    }
}
