pub mod block_generator;

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use futures::future::join_all;
use storage::error::StoreError;
use tokio::sync::Mutex;
use utilities::logger::{debug, error, info, instrument, tracing, warn};

use crate::{
    datanode::{
        selection_policy::{
            DatanodeSelectionPolicy, default_selection_policy::DefaultDatanodeSelectionPolicy,
        },
        service::BlockTransport,
    },
    error::{NamenodeError, PlacementError},
    namespace::node::BlockId,
    registry::{
        DatanodeRegistry,
        datanode_details::{DatanodeEndpoint, DatanodeId},
    },
};
use block_generator::{BlockBoundary, get_blocks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementSettings {
    pub block_size: u64,
    pub replication_factor: usize,
}

impl PlacementSettings {
    pub fn new(block_size: u64, replication_factor: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            replication_factor: replication_factor.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPlacement {
    pub block_id: BlockId,
    pub replica_locations: HashSet<DatanodeId>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct BlockWritePlan {
    pub boundary: BlockBoundary,
    pub primary: DatanodeEndpoint,
    pub replicas: Vec<DatanodeEndpoint>,
}

impl BlockWritePlan {
    pub fn block_id(&self) -> &str {
        &self.boundary.block_id
    }
}

#[derive(Debug, Clone)]
pub struct WritePlan {
    pub block_size: u64,
    pub blocks: Vec<BlockWritePlan>,
}

impl WritePlan {
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .map(|block| block.boundary.block_id.clone())
            .collect()
    }
}

/// Outcome of re-checking the blocks of one or more dead datanodes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub replicas_created: usize,
    pub under_replicated: BTreeSet<BlockId>,
    pub lost: BTreeSet<BlockId>,
}

impl RepairReport {
    pub fn merge(&mut self, other: RepairReport) {
        self.replicas_created += other.replicas_created;
        self.under_replicated.extend(other.under_replicated);
        self.lost.extend(other.lost);
    }
}

/// Replica view of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
    pub block_id: BlockId,
    pub size_bytes: u64,
    /// every recorded holder, sorted, dead ones included
    pub replicas: Vec<DatanodeId>,
    pub live_replicas: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationHealth {
    pub blocks: usize,
    pub under_replicated: usize,
    pub lost: usize,
}

/// Maps blocks to the datanodes holding them and keeps the replica count up
/// when datanodes die. The placement table has its own lock. It is never
/// held together with the registry lock nor across network IO.
pub struct PlacementEngine {
    replication_factor: usize,
    placements: Mutex<HashMap<BlockId, BlockPlacement>>,
    registry: Arc<DatanodeRegistry>,
    transport: Arc<dyn BlockTransport>,
    policy: Box<dyn DatanodeSelectionPolicy>,
}

impl PlacementEngine {
    pub fn new(
        replication_factor: usize,
        registry: Arc<DatanodeRegistry>,
        transport: Arc<dyn BlockTransport>,
    ) -> Self {
        Self::with_policy(
            replication_factor,
            registry,
            transport,
            Box::new(DefaultDatanodeSelectionPolicy),
        )
    }

    pub fn with_policy(
        replication_factor: usize,
        registry: Arc<DatanodeRegistry>,
        transport: Arc<dyn BlockTransport>,
        policy: Box<dyn DatanodeSelectionPolicy>,
    ) -> Self {
        Self {
            replication_factor: replication_factor.max(1),
            placements: Mutex::new(HashMap::new()),
            registry,
            transport,
            policy,
        }
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Splits a file into blocks and picks a primary and replicas for each
    /// one out of a single snapshot of the active datanodes.
    #[instrument(name = "placement_plan_write", skip(self))]
    pub async fn plan_write(
        &self,
        file_size: u64,
        block_size: u64,
        replication_factor: usize,
    ) -> Result<WritePlan, PlacementError> {
        let active = self.registry.list_active().await;
        if active.is_empty() {
            return Err(PlacementError::NoAvailableDataNodes);
        }
        let replica_count = replication_factor.max(1).min(active.len()) - 1;
        let mut blocks = Vec::new();
        for boundary in get_blocks(file_size, block_size) {
            let primary = self
                .policy
                .select_primary(&active, boundary.index)
                .ok_or(PlacementError::NoAvailableDataNodes)?
                .clone();
            let candidates: Vec<DatanodeEndpoint> = active
                .iter()
                .filter(|datanode| datanode.id != primary.id)
                .cloned()
                .collect();
            let replicas = self.policy.select_replicas(&candidates, replica_count);
            debug!(block_id = %boundary.block_id, primary = %primary.id, replicas = replicas.len(), "Planned block");
            blocks.push(BlockWritePlan {
                boundary,
                primary,
                replicas,
            });
        }
        Ok(WritePlan {
            block_size: block_size.max(1),
            blocks,
        })
    }

    /// Stores one block on its primary, then on its replicas. Only the primary
    /// write has to succeed. Returns how many copies were stored.
    #[instrument(name = "placement_commit_write", skip(self, plan, data), fields(block_id = %plan.block_id(), size = data.len()))]
    pub async fn commit_write(
        &self,
        plan: &BlockWritePlan,
        data: &[u8],
    ) -> Result<usize, StoreError> {
        let block_id = plan.block_id();
        let size = data.len() as u64;
        self.transport
            .store_block(&plan.primary, block_id, data)
            .await?;
        self.record_replica(block_id, &plan.primary.id, size).await;

        let replica_writes = plan
            .replicas
            .iter()
            .map(|target| self.transport.store_block(target, block_id, data));
        let results = join_all(replica_writes).await;
        let mut stored = 1;
        for (target, result) in plan.replicas.iter().zip(results) {
            match result {
                Ok(()) => {
                    self.record_replica(block_id, &target.id, size).await;
                    stored += 1;
                }
                Err(e) => {
                    warn!(datanode_id = %target.id, error = %e, "Replica write failed, block keeps fewer copies");
                }
            }
        }
        Ok(stored)
    }

    pub async fn record_replica(&self, block_id: &str, datanode_id: &str, size_bytes: u64) {
        {
            let mut placements = self.placements.lock().await;
            placements
                .entry(block_id.to_owned())
                .or_insert_with(|| BlockPlacement {
                    block_id: block_id.to_owned(),
                    replica_locations: HashSet::new(),
                    size_bytes,
                })
                .replica_locations
                .insert(datanode_id.to_owned());
        }
        self.registry.add_held_block(datanode_id, block_id).await;
    }

    /// Drops the placements of blocks whose file never made it into the
    /// namespace and asks their active holders to delete the bytes. Deletes
    /// are best effort, a failure only leaves an orphaned block file behind.
    #[instrument(name = "placement_discard", skip(self, block_ids), fields(blocks = block_ids.len()))]
    pub async fn discard(&self, block_ids: &[BlockId]) {
        let removed: Vec<BlockPlacement> = {
            let mut placements = self.placements.lock().await;
            block_ids
                .iter()
                .filter_map(|block_id| placements.remove(block_id))
                .collect()
        };
        self.registry.forget_blocks(block_ids).await;

        let active: HashMap<DatanodeId, DatanodeEndpoint> = self
            .registry
            .list_active()
            .await
            .into_iter()
            .map(|datanode| (datanode.id.clone(), datanode))
            .collect();
        let mut deletes = Vec::new();
        for placement in &removed {
            for datanode_id in &placement.replica_locations {
                if let Some(holder) = active.get(datanode_id) {
                    deletes.push(async move {
                        let result = self.transport.delete_block(holder, &placement.block_id).await;
                        (holder, &placement.block_id, result)
                    });
                }
            }
        }
        for (holder, block_id, result) in join_all(deletes).await {
            if let Err(e) = result {
                warn!(datanode_id = %holder.id, %block_id, error = %e, "Could not delete discarded block");
            }
        }
    }

    pub async fn placement(&self, block_id: &str) -> Option<BlockPlacement> {
        self.placements.lock().await.get(block_id).cloned()
    }

    /// Active holders of a block in the order they should be read from.
    pub async fn read_candidates(
        &self,
        block_id: &str,
    ) -> Result<Vec<DatanodeEndpoint>, PlacementError> {
        let active = self.registry.list_active().await;
        let locations = self
            .placement(block_id)
            .await
            .map(|placement| placement.replica_locations)
            .unwrap_or_default();
        let holders: Vec<DatanodeEndpoint> = active
            .into_iter()
            .filter(|datanode| locations.contains(&datanode.id))
            .collect();
        if holders.is_empty() {
            return Err(PlacementError::NoReplicaAvailable(block_id.to_owned()));
        }
        Ok(self.policy.order_for_read(holders))
    }

    pub async fn plan_read(&self, block_id: &str) -> Result<DatanodeEndpoint, PlacementError> {
        let mut candidates = self.read_candidates(block_id).await?;
        Ok(candidates.remove(0))
    }

    /// Reads a block from the preferred live holder, falling back to the
    /// other live holders when a transfer fails or comes back short.
    #[instrument(name = "placement_fetch_block", skip(self))]
    pub async fn fetch_block(
        &self,
        block_id: &str,
        expected_len: u64,
    ) -> Result<Vec<u8>, NamenodeError> {
        let mut last_error = None;
        for source in self.read_candidates(block_id).await? {
            match self.transport.fetch_block(&source, block_id).await {
                Ok(data) if data.len() as u64 == expected_len => return Ok(data),
                Ok(data) => {
                    warn!(datanode_id = %source.id, got = data.len(), expected_len, "Datanode returned a block of the wrong length");
                }
                Err(e) => {
                    warn!(datanode_id = %source.id, error = %e, "Block fetch failed, trying next replica");
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(e) => e.into(),
            None => PlacementError::NoReplicaAvailable(block_id.to_owned()).into(),
        })
    }

    /// Re-checks every block the dead datanode was holding and copies blocks
    /// that fell below the replication factor onto other active datanodes.
    #[instrument(name = "placement_on_datanode_dead", skip(self))]
    pub async fn on_datanode_dead(&self, datanode_id: &str) -> RepairReport {
        let mut held: Vec<BlockId> = self
            .registry
            .held_blocks(datanode_id)
            .await
            .into_iter()
            .collect();
        held.sort();
        let mut report = RepairReport::default();
        for block_id in held {
            self.repair_block(&block_id, &mut report).await;
        }
        if report.replicas_created > 0 {
            info!(replicas_created = report.replicas_created, "Re-replicated blocks of dead datanode");
        }
        report
    }

    async fn repair_block(&self, block_id: &str, report: &mut RepairReport) {
        let Some(placement) = self.placement(block_id).await else {
            return;
        };
        let active = self.registry.list_active().await;
        let (live, candidates): (Vec<DatanodeEndpoint>, Vec<DatanodeEndpoint>) = active
            .iter()
            .cloned()
            .partition(|datanode| placement.replica_locations.contains(&datanode.id));
        if live.is_empty() {
            error!(block_id, "Block has no live replica left, data is lost until a holder rejoins");
            report.lost.insert(block_id.to_owned());
            return;
        }
        let target = self.replication_factor.min(active.len());
        let mut live_count = live.len();
        if live_count < target {
            let new_targets = self.policy.select_replicas(&candidates, target - live_count);
            match self.copy_from_holders(block_id, &live).await {
                Ok(data) => {
                    for new_target in new_targets {
                        match self
                            .transport
                            .store_block(&new_target, block_id, &data)
                            .await
                        {
                            Ok(()) => {
                                self.record_replica(block_id, &new_target.id, placement.size_bytes)
                                    .await;
                                info!(block_id, datanode_id = %new_target.id, "Block re-replicated");
                                report.replicas_created += 1;
                                live_count += 1;
                            }
                            Err(e) => {
                                warn!(block_id, datanode_id = %new_target.id, error = %e, "Re-replication write failed");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(block_id, error = %e, "Could not read block from any live holder");
                }
            }
        }
        if live_count < self.replication_factor {
            let e = PlacementError::InsufficientReplicationFactor {
                block_id: block_id.to_owned(),
                required: self.replication_factor,
                available: live_count,
            };
            warn!(error = %e, "Block stays under replicated until the next sweep");
            report.under_replicated.insert(block_id.to_owned());
        }
    }

    async fn copy_from_holders(
        &self,
        block_id: &str,
        holders: &[DatanodeEndpoint],
    ) -> Result<Vec<u8>, StoreError> {
        let mut last_error = StoreError::NotFound(block_id.to_owned());
        for holder in self.policy.order_for_read(holders.to_vec()) {
            match self.transport.fetch_block(&holder, block_id).await {
                Ok(data) => return Ok(data),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    /// Per-block view used by tree listings. Unknown blocks come back with no
    /// replicas.
    pub async fn summaries(&self, block_ids: &[BlockId]) -> Vec<BlockSummary> {
        let active: HashSet<DatanodeId> = self
            .registry
            .list_active()
            .await
            .into_iter()
            .map(|datanode| datanode.id)
            .collect();
        let placements = self.placements.lock().await;
        block_ids
            .iter()
            .map(|block_id| {
                let (mut replicas, size_bytes) = placements
                    .get(block_id)
                    .map(|placement| {
                        (
                            placement.replica_locations.iter().cloned().collect::<Vec<_>>(),
                            placement.size_bytes,
                        )
                    })
                    .unwrap_or_default();
                replicas.sort();
                let live_replicas = replicas.iter().filter(|id| active.contains(*id)).count();
                BlockSummary {
                    block_id: block_id.clone(),
                    size_bytes,
                    replicas,
                    live_replicas,
                }
            })
            .collect()
    }

    /// Replica health of the given blocks. A block with no placement counts
    /// as lost.
    pub async fn health(&self, block_ids: &[BlockId]) -> ReplicationHealth {
        let mut health = ReplicationHealth {
            blocks: block_ids.len(),
            ..Default::default()
        };
        for summary in self.summaries(block_ids).await {
            if summary.live_replicas == 0 {
                health.lost += 1;
            } else if summary.live_replicas < self.replication_factor {
                health.under_replicated += 1;
            }
        }
        health
    }

    /// Number of blocks with a placement, including those of uploads that
    /// are still in flight.
    pub async fn tracked_blocks(&self) -> usize {
        self.placements.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::advance;

    use super::*;
    use crate::test_support::{MemoryTransport, registry_with};

    fn engine(
        replication_factor: usize,
        registry: &Arc<DatanodeRegistry>,
        transport: &Arc<MemoryTransport>,
    ) -> PlacementEngine {
        PlacementEngine::new(replication_factor, registry.clone(), transport.clone())
    }

    async fn write_all(engine: &PlacementEngine, data: &[u8], block_size: u64) -> WritePlan {
        let plan = engine
            .plan_write(data.len() as u64, block_size, engine.replication_factor())
            .await
            .unwrap();
        for block in &plan.blocks {
            let range = block.boundary.start_offset as usize..block.boundary.end_offset as usize;
            engine.commit_write(block, &data[range]).await.unwrap();
        }
        plan
    }

    #[tokio::test]
    async fn plan_write_fails_without_active_datanodes() {
        let registry = registry_with(&[]).await;
        let transport = Arc::new(MemoryTransport::default());
        let engine = engine(2, &registry, &transport);
        assert_eq!(
            engine.plan_write(10, 4, 2).await.unwrap_err(),
            PlacementError::NoAvailableDataNodes
        );
    }

    #[tokio::test]
    async fn primaries_rotate_over_active_datanodes_by_id() {
        let registry = registry_with(&["dn-3", "dn-1", "dn-2"]).await;
        let transport = Arc::new(MemoryTransport::default());
        let engine = engine(1, &registry, &transport);
        let plan = engine.plan_write(40, 10, 1).await.unwrap();
        let primaries: Vec<&str> = plan.blocks.iter().map(|b| b.primary.id.as_str()).collect();
        assert_eq!(primaries, vec!["dn-1", "dn-2", "dn-3", "dn-1"]);
        assert!(plan.blocks.iter().all(|b| b.replicas.is_empty()));
    }

    #[tokio::test]
    async fn three_replicas_with_enough_datanodes() {
        let registry = registry_with(&["dn-1", "dn-2", "dn-3", "dn-4"]).await;
        let transport = Arc::new(MemoryTransport::default());
        let engine = engine(3, &registry, &transport);
        let plan = write_all(&engine, &[7u8; 50], 16).await;
        for block_id in plan.block_ids() {
            let placement = engine.placement(&block_id).await.unwrap();
            assert_eq!(placement.replica_locations.len(), 3);
            assert_eq!(transport.holders(&block_id).len(), 3);
        }
    }

    #[tokio::test]
    async fn replicas_capped_by_active_datanodes() {
        let registry = registry_with(&["dn-1", "dn-2"]).await;
        let transport = Arc::new(MemoryTransport::default());
        let engine = engine(3, &registry, &transport);
        let plan = write_all(&engine, &[1u8; 30], 16).await;
        for block_id in plan.block_ids() {
            assert_eq!(engine.placement(&block_id).await.unwrap().replica_locations.len(), 2);
        }
    }

    #[tokio::test]
    async fn replica_failure_does_not_fail_the_write() {
        let registry = registry_with(&["dn-1", "dn-2"]).await;
        let transport = Arc::new(MemoryTransport::default());
        transport.fail("dn-2");
        let engine = engine(2, &registry, &transport);
        let plan = engine.plan_write(8, 8, 2).await.unwrap();
        let block = &plan.blocks[0];
        assert_eq!(block.primary.id, "dn-1");
        assert_eq!(engine.commit_write(block, &[0u8; 8]).await.unwrap(), 1);

        let failing_primary = engine.plan_write(16, 8, 2).await.unwrap();
        assert_eq!(failing_primary.blocks[1].primary.id, "dn-2");
        assert!(
            engine
                .commit_write(&failing_primary.blocks[1], &[0u8; 8])
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn plan_read_prefers_lowest_live_holder() {
        let registry = registry_with(&["dn-1", "dn-2", "dn-3"]).await;
        let transport = Arc::new(MemoryTransport::default());
        let engine = engine(3, &registry, &transport);
        let plan = write_all(&engine, b"hello", 8).await;
        let block_id = &plan.block_ids()[0];
        assert_eq!(engine.plan_read(block_id).await.unwrap().id, "dn-1");
        assert_eq!(
            engine.plan_read("missing").await.unwrap_err(),
            PlacementError::NoReplicaAvailable("missing".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dead_datanode_blocks_are_re_replicated() {
        let registry = registry_with(&["dn-1", "dn-2", "dn-3"]).await;
        let transport = Arc::new(MemoryTransport::default());
        let engine = engine(2, &registry, &transport);
        let plan = engine.plan_write(4, 4, 2).await.unwrap();
        let block = &plan.blocks[0];
        engine.commit_write(block, b"data").await.unwrap();
        let block_id = block.block_id().to_owned();
        let victim = block.primary.id.clone();

        advance(Duration::from_secs(11)).await;
        for datanode in ["dn-1", "dn-2", "dn-3"] {
            if datanode != victim {
                registry.heartbeat(datanode).await.unwrap();
            }
        }
        assert_eq!(registry.sweep_liveness(Duration::from_secs(10)).await, vec![victim.clone()]);

        let report = engine.on_datanode_dead(&victim).await;
        assert_eq!(report.replicas_created, 1);
        assert!(report.under_replicated.is_empty());
        assert_eq!(engine.summaries(&[block_id.clone()]).await[0].live_replicas, 2);
        assert_eq!(transport.holders(&block_id).len(), 3);
        assert_eq!(engine.fetch_block(&block_id, 4).await.unwrap(), b"data");
    }

    #[tokio::test(start_paused = true)]
    async fn repair_is_capped_by_active_datanodes_and_loss_is_reported() {
        let registry = registry_with(&["dn-1", "dn-2"]).await;
        let transport = Arc::new(MemoryTransport::default());
        let engine = engine(2, &registry, &transport);
        let plan = write_all(&engine, b"abcd", 4).await;
        let block_id = plan.block_ids().remove(0);

        advance(Duration::from_secs(11)).await;
        registry.heartbeat("dn-2").await.unwrap();
        registry.sweep_liveness(Duration::from_secs(10)).await;
        let report = engine.on_datanode_dead("dn-1").await;
        assert_eq!(report.replicas_created, 0);
        assert!(report.under_replicated.contains(&block_id));
        assert_eq!(engine.health(&plan.block_ids()).await.under_replicated, 1);

        advance(Duration::from_secs(11)).await;
        registry.sweep_liveness(Duration::from_secs(10)).await;
        let report = engine.on_datanode_dead("dn-2").await;
        assert!(report.lost.contains(&block_id));
        assert_eq!(engine.health(&plan.block_ids()).await.lost, 1);
        // placements are kept so the block can come back with its holder
        assert!(engine.placement(&block_id).await.is_some());
    }

    #[tokio::test]
    async fn discard_forgets_placements_and_deletes_stored_copies() {
        let registry = registry_with(&["dn-1", "dn-2"]).await;
        let transport = Arc::new(MemoryTransport::default());
        let engine = engine(2, &registry, &transport);
        let plan = write_all(&engine, b"xyz", 2).await;
        assert_eq!(transport.stored_blocks(), 4);
        engine.discard(&plan.block_ids()).await;
        assert_eq!(engine.tracked_blocks().await, 0);
        assert!(registry.held_blocks("dn-1").await.is_empty());
        assert_eq!(transport.stored_blocks(), 0);
        assert_eq!(engine.health(&plan.block_ids()).await.lost, 2);
    }

    #[tokio::test]
    async fn discard_survives_unreachable_holders() {
        let registry = registry_with(&["dn-1", "dn-2"]).await;
        let transport = Arc::new(MemoryTransport::default());
        let engine = engine(2, &registry, &transport);
        let plan = write_all(&engine, b"abcd", 4).await;
        transport.fail("dn-2");
        engine.discard(&plan.block_ids()).await;
        assert_eq!(engine.tracked_blocks().await, 0);
        assert_eq!(transport.holders(&plan.block_ids()[0]), vec!["dn-2".to_string()]);
    }

    #[tokio::test]
    async fn health_only_counts_the_given_blocks() {
        let registry = registry_with(&["dn-1"]).await;
        let transport = Arc::new(MemoryTransport::default());
        let engine = engine(2, &registry, &transport);
        let first = write_all(&engine, b"ab", 2).await;
        write_all(&engine, b"cdef", 2).await;
        assert_eq!(engine.tracked_blocks().await, 3);
        let health = engine.health(&first.block_ids()).await;
        assert_eq!((health.blocks, health.under_replicated, health.lost), (1, 1, 0));
    }
}
