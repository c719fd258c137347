use std::{collections::HashSet, time::Duration};

use proto::tree::{DatanodeStatus, NodeState};
use tokio::time::Instant;

use crate::namespace::node::BlockId;

pub type DatanodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatanodeState {
    Active,
    Dead,
}

/// Where a datanode can be reached, the unit handed to placement decisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatanodeEndpoint {
    pub id: DatanodeId,
    pub address: String,
    pub port: u16,
}

impl DatanodeEndpoint {
    pub fn tcp_addrs(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct DatanodeRecord {
    pub id: DatanodeId,
    pub address: String,
    pub port: u16,
    pub state: DatanodeState,
    pub last_heartbeat_at: Instant,
    pub held_block_ids: HashSet<BlockId>,
}

impl DatanodeRecord {
    pub fn new(id: &str, address: &str, port: u16, now: Instant) -> Self {
        Self {
            id: id.to_owned(),
            address: address.to_owned(),
            port,
            state: DatanodeState::Active,
            last_heartbeat_at: now,
            held_block_ids: HashSet::default(),
        }
    }
    /// Returns true when the heartbeat brought a dead node back.
    pub fn mark_heartbeat(&mut self, now: Instant) -> bool {
        self.last_heartbeat_at = now;
        let rejoined = self.state == DatanodeState::Dead;
        self.state = DatanodeState::Active;
        rejoined
    }
    pub fn is_active(&self) -> bool {
        self.state == DatanodeState::Active
    }
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat_at) > timeout
    }
    pub fn endpoint(&self) -> DatanodeEndpoint {
        DatanodeEndpoint {
            id: self.id.clone(),
            address: self.address.clone(),
            port: self.port,
        }
    }
    pub fn status(&self, now: Instant) -> DatanodeStatus {
        DatanodeStatus {
            id: self.id.clone(),
            address: self.address.clone(),
            port: self.port,
            state: match self.state {
                DatanodeState::Active => NodeState::Active,
                DatanodeState::Dead => NodeState::Dead,
            },
            held_blocks: self.held_block_ids.len(),
            secs_since_heartbeat: now.saturating_duration_since(self.last_heartbeat_at).as_secs(),
        }
    }
}
