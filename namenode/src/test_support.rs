//! In-memory stand-ins for remote datanodes.
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use storage::error::StoreError;

use crate::{
    datanode::service::BlockTransport,
    registry::{
        DatanodeRegistry,
        datanode_details::{DatanodeEndpoint, DatanodeId},
    },
};

#[derive(Debug, Default)]
pub struct MemoryTransport {
    blocks: Mutex<HashMap<(DatanodeId, String), Vec<u8>>>,
    failing: Mutex<HashSet<DatanodeId>>,
}

impl MemoryTransport {
    /// Every transfer to or from `datanode_id` fails from now on.
    pub fn fail(&self, datanode_id: &str) {
        self.failing.lock().unwrap().insert(datanode_id.to_owned());
    }

    pub fn holders(&self, block_id: &str) -> Vec<DatanodeId> {
        let mut holders: Vec<DatanodeId> = self
            .blocks
            .lock()
            .unwrap()
            .keys()
            .filter(|(_, id)| id == block_id)
            .map(|(datanode_id, _)| datanode_id.clone())
            .collect();
        holders.sort();
        holders
    }

    /// Copies stored across all datanodes.
    pub fn stored_blocks(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    fn check(&self, datanode_id: &str, block_id: &str) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(datanode_id) {
            return Err(StoreError::io(
                block_id,
                std::io::Error::other(format!("{datanode_id} unreachable")),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BlockTransport for MemoryTransport {
    async fn store_block(
        &self,
        target: &DatanodeEndpoint,
        block_id: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        self.check(&target.id, block_id)?;
        self.blocks
            .lock()
            .unwrap()
            .insert((target.id.clone(), block_id.to_owned()), data.to_vec());
        Ok(())
    }

    async fn fetch_block(
        &self,
        source: &DatanodeEndpoint,
        block_id: &str,
    ) -> Result<Vec<u8>, StoreError> {
        self.check(&source.id, block_id)?;
        self.blocks
            .lock()
            .unwrap()
            .get(&(source.id.clone(), block_id.to_owned()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(block_id.to_owned()))
    }

    async fn delete_block(
        &self,
        target: &DatanodeEndpoint,
        block_id: &str,
    ) -> Result<bool, StoreError> {
        self.check(&target.id, block_id)?;
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .remove(&(target.id.clone(), block_id.to_owned()))
            .is_some())
    }
}

pub async fn registry_with(ids: &[&str]) -> Arc<DatanodeRegistry> {
    let registry = Arc::new(DatanodeRegistry::new());
    for (i, id) in ids.iter().enumerate() {
        registry.register(id, "127.0.0.1", 6000 + i as u16).await;
    }
    registry
}
