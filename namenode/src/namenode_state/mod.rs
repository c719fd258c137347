//! Process-wide namenode state. Every wire action maps onto exactly one async
//! method here, so any front end can drive the namenode without knowing the
//! byte layout of the protocol.
pub mod state_maintainer;

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use proto::tree::{ClusterStatus, TreeNode};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
    sync::RwLock,
};
use utilities::logger::{info, instrument, tracing, warn};

use crate::{
    datanode::service::BlockTransport,
    error::{NamenodeError, Result},
    namespace::{
        Namespace,
        node::{BlockId, Directory, NamespaceNode},
    },
    placement::{BlockSummary, PlacementEngine, PlacementSettings, RepairReport},
    registry::{DatanodeRegistry, datanode_details::DatanodeId},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub dfs_path: String,
    pub size_bytes: u64,
    pub blocks: usize,
    /// blocks that ended up with fewer copies than the replication factor
    pub under_replicated_blocks: usize,
}

impl UploadReport {
    pub fn message(&self, replication_factor: usize) -> String {
        let mut message = format!(
            "Uploaded {} ({} bytes, {} blocks)",
            self.dfs_path, self.size_bytes, self.blocks
        );
        if self.under_replicated_blocks > 0 {
            message.push_str(&format!(
                ", {} blocks stored with fewer than {replication_factor} replicas",
                self.under_replicated_blocks
            ));
        }
        message
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub newly_dead: Vec<DatanodeId>,
    pub repair: RepairReport,
}

pub struct NamenodeState {
    settings: PlacementSettings,
    namespace: RwLock<Namespace>,
    registry: Arc<DatanodeRegistry>,
    placement: PlacementEngine,
}

impl NamenodeState {
    pub fn new(settings: PlacementSettings, transport: Arc<dyn BlockTransport>) -> Self {
        let registry = Arc::new(DatanodeRegistry::new());
        let placement =
            PlacementEngine::new(settings.replication_factor, registry.clone(), transport);
        Self {
            settings,
            namespace: RwLock::new(Namespace::new()),
            registry,
            placement,
        }
    }

    pub fn settings(&self) -> PlacementSettings {
        self.settings
    }
    pub fn registry(&self) -> &DatanodeRegistry {
        &self.registry
    }
    pub fn placement(&self) -> &PlacementEngine {
        &self.placement
    }

    pub async fn register(&self, id: &str, address: &str, port: u16) -> String {
        if self.registry.register(id, address, port).await {
            format!("Datanode {id} registered at {address}:{port}")
        } else {
            format!("Datanode {id} re-registered at {address}:{port}")
        }
    }

    pub async fn heartbeat(&self, id: &str) -> Result<String> {
        self.registry.heartbeat(id).await?;
        Ok(format!("Heartbeat from {id} acknowledged"))
    }

    pub async fn create_directory(&self, parent_path: &str, name: &str) -> Result<String> {
        let path = self
            .namespace
            .write()
            .await
            .create_directory(parent_path, name)?;
        info!(path = %path, "Directory created");
        Ok(path)
    }

    pub async fn delete_directory(&self, path: &str) -> Result<()> {
        self.namespace.write().await.delete_directory(path)?;
        info!(path, "Directory deleted");
        Ok(())
    }

    pub async fn move_file(&self, source_path: &str, destination_path: &str) -> Result<()> {
        self.namespace
            .write()
            .await
            .move_file(source_path, destination_path)?;
        info!(source_path, destination_path, "File moved");
        Ok(())
    }

    /// Reads `local_path` on the namenode host, writes its blocks in order and
    /// only then makes the file visible at `dfs_path`.
    #[instrument(name = "namenode_upload_file", skip(self))]
    pub async fn upload_file(&self, local_path: &str, dfs_path: &str) -> Result<UploadReport> {
        self.namespace.read().await.check_file_creatable(dfs_path)?;
        let mut file = File::open(local_path)
            .await
            .map_err(|e| NamenodeError::local_io(local_path, e))?;
        let size_bytes = file
            .metadata()
            .await
            .map_err(|e| NamenodeError::local_io(local_path, e))?
            .len();
        let plan = self
            .placement
            .plan_write(
                size_bytes,
                self.settings.block_size,
                self.settings.replication_factor,
            )
            .await?;

        let mut under_replicated_blocks = 0;
        let mut buffer = Vec::new();
        for block in &plan.blocks {
            buffer.resize(block.boundary.len() as usize, 0);
            let stored = match file.read_exact(&mut buffer).await {
                Ok(_) => self
                    .placement
                    .commit_write(block, &buffer)
                    .await
                    .map_err(NamenodeError::from),
                Err(e) => Err(NamenodeError::local_io(local_path, e)),
            };
            match stored {
                Ok(copies) if copies < self.settings.replication_factor => {
                    under_replicated_blocks += 1
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(block_id = %block.block_id(), error = %e, "Upload aborted, discarding written blocks");
                    self.placement.discard(&plan.block_ids()).await;
                    return Err(e);
                }
            }
        }

        let created = self.namespace.write().await.create_file(
            dfs_path,
            size_bytes,
            plan.block_size,
            plan.block_ids(),
        );
        if let Err(e) = created {
            self.placement.discard(&plan.block_ids()).await;
            return Err(e.into());
        }
        let report = UploadReport {
            dfs_path: dfs_path.to_owned(),
            size_bytes,
            blocks: plan.blocks.len(),
            under_replicated_blocks,
        };
        if under_replicated_blocks > 0 {
            warn!(under_replicated_blocks, "File stored below the replication factor");
        }
        info!(size_bytes, blocks = report.blocks, "File uploaded");
        Ok(report)
    }

    /// Assembles the file into `{local_path}.part` and renames it into place
    /// once every block has arrived. Returns the number of bytes written.
    #[instrument(name = "namenode_download_file", skip(self))]
    pub async fn download_file(&self, dfs_path: &str, local_path: &str) -> Result<u64> {
        let meta = self.namespace.read().await.file(dfs_path)?.clone();
        let part_path = format!("{local_path}.part");
        let mut part = File::create(&part_path)
            .await
            .map_err(|e| NamenodeError::local_io(&part_path, e))?;
        for (index, block_id) in meta.block_ids.iter().enumerate() {
            let written = match self
                .placement
                .fetch_block(block_id, meta.block_len(index))
                .await
            {
                Ok(data) => part
                    .write_all(&data)
                    .await
                    .map_err(|e| NamenodeError::local_io(&part_path, e)),
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                drop(part);
                let _ = fs::remove_file(&part_path).await;
                return Err(e);
            }
        }
        part.flush()
            .await
            .map_err(|e| NamenodeError::local_io(&part_path, e))?;
        drop(part);
        fs::rename(&part_path, local_path)
            .await
            .map_err(|e| NamenodeError::local_io(local_path, e))?;
        info!(size_bytes = meta.size_bytes, "File downloaded");
        Ok(meta.size_bytes)
    }

    /// Block counts cover blocks referenced by namespace files only. Blocks of
    /// an upload still in flight show up once the file is created.
    pub async fn status(&self) -> ClusterStatus {
        let (files, directories, block_ids) = {
            let namespace = self.namespace.read().await;
            let (files, directories) = namespace.count_nodes();
            let mut block_ids = Vec::new();
            if let Ok(root) = namespace.traverse_directory("/") {
                collect_block_ids(root, &mut block_ids);
            }
            (files, directories, block_ids)
        };
        let health = self.placement.health(&block_ids).await;
        ClusterStatus {
            replication_factor: self.settings.replication_factor,
            block_size: self.settings.block_size,
            files,
            directories,
            blocks: health.blocks,
            under_replicated_blocks: health.under_replicated,
            lost_blocks: health.lost,
            datanodes: self.registry.statuses().await,
        }
    }

    pub async fn list_directory_contents(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.namespace.read().await.list_directory_contents(path)?)
    }

    /// Copies the subtree out under the read lock, then annotates its files
    /// with replica locations.
    pub async fn traverse_directory(&self, path: &str) -> Result<TreeNode> {
        let subtree = self.namespace.read().await.traverse_directory(path)?.clone();
        let mut block_ids = Vec::new();
        collect_block_ids(&subtree, &mut block_ids);
        let summaries: HashMap<BlockId, BlockSummary> = self
            .placement
            .summaries(&block_ids)
            .await
            .into_iter()
            .map(|summary| (summary.block_id.clone(), summary))
            .collect();
        Ok(to_tree(
            &subtree,
            &summaries,
            self.settings.replication_factor,
        ))
    }

    /// Marks silent datanodes dead, then re-checks the blocks of every dead
    /// datanode. Blocks that could not be repaired are retried next sweep.
    #[instrument(name = "namenode_sweep_liveness", skip(self))]
    pub async fn sweep_liveness(&self, timeout: Duration) -> SweepReport {
        let newly_dead = self.registry.sweep_liveness(timeout).await;
        let mut repair = RepairReport::default();
        for datanode_id in self.registry.dead_ids().await {
            repair.merge(self.placement.on_datanode_dead(&datanode_id).await);
        }
        SweepReport { newly_dead, repair }
    }
}

fn collect_block_ids(directory: &Directory, block_ids: &mut Vec<BlockId>) {
    for child in directory.children.values() {
        match child {
            NamespaceNode::Directory(sub_directory) => collect_block_ids(sub_directory, block_ids),
            NamespaceNode::File(file) => block_ids.extend(file.block_ids.iter().cloned()),
        }
    }
}

fn to_tree(
    directory: &Directory,
    summaries: &HashMap<BlockId, BlockSummary>,
    replication_factor: usize,
) -> TreeNode {
    let mut children: Vec<TreeNode> = directory
        .children
        .values()
        .map(|child| match child {
            NamespaceNode::Directory(sub_directory) => {
                to_tree(sub_directory, summaries, replication_factor)
            }
            NamespaceNode::File(file) => {
                let mut data_nodes = BTreeSet::new();
                let mut under_replicated_blocks = 0;
                let mut lost_blocks = 0;
                for block_id in &file.block_ids {
                    let live_replicas = match summaries.get(block_id) {
                        Some(summary) => {
                            data_nodes.extend(summary.replicas.iter().cloned());
                            summary.live_replicas
                        }
                        None => 0,
                    };
                    if live_replicas == 0 {
                        lost_blocks += 1;
                    } else if live_replicas < replication_factor {
                        under_replicated_blocks += 1;
                    }
                }
                TreeNode::File {
                    name: file.name.clone(),
                    size: file.size_bytes,
                    block_size: file.block_size_bytes,
                    blocks: file.block_ids.len(),
                    under_replicated_blocks,
                    lost_blocks,
                    data_nodes: data_nodes.into_iter().collect(),
                }
            }
        })
        .collect();
    children.sort_by(|a, b| a.name().cmp(b.name()));
    TreeNode::Directory {
        name: directory.name.clone(),
        children,
    }
}
