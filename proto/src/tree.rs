use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Snapshot of a namespace subtree as returned by `traverse_directory`.
/// Children are ordered by name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Directory {
        name: String,
        children: Vec<TreeNode>,
    },
    File {
        name: String,
        size: u64,
        block_size: u64,
        blocks: usize,
        /// blocks with at least one but fewer than replication factor live copies
        under_replicated_blocks: usize,
        /// blocks with no live copy left
        lost_blocks: usize,
        /// every datanode holding at least one replica of the file, sorted
        data_nodes: Vec<String>,
    },
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Directory { name, .. } | TreeNode::File { name, .. } => name,
        }
    }
    /// Looks a direct child up by name.
    pub fn child(&self, child_name: &str) -> Option<&TreeNode> {
        match self {
            TreeNode::Directory { children, .. } => {
                children.iter().find(|child| child.name() == child_name)
            }
            TreeNode::File { .. } => None,
        }
    }
    fn render(&self, f: &mut Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            TreeNode::Directory { name, children } => {
                writeln!(f, "{indent}{name}/")?;
                for child in children {
                    child.render(f, depth + 1)?;
                }
                Ok(())
            }
            TreeNode::File {
                name,
                size,
                block_size,
                blocks,
                under_replicated_blocks,
                lost_blocks,
                data_nodes,
            } => {
                write!(
                    f,
                    "{indent}{name} ({size} bytes, {blocks} blocks of {block_size}, on [{}])",
                    data_nodes.join(", ")
                )?;
                if *lost_blocks > 0 {
                    write!(f, " {lost_blocks} blocks lost")?;
                } else if *under_replicated_blocks > 0 {
                    write!(f, " {under_replicated_blocks} blocks under replicated")?;
                }
                writeln!(f)
            }
        }
    }
}

impl Display for TreeNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Active,
    Dead,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DatanodeStatus {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub state: NodeState,
    pub held_blocks: usize,
    pub secs_since_heartbeat: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClusterStatus {
    pub replication_factor: usize,
    pub block_size: u64,
    pub files: usize,
    pub directories: usize,
    pub blocks: usize,
    pub under_replicated_blocks: usize,
    pub lost_blocks: usize,
    pub datanodes: Vec<DatanodeStatus>,
}

impl Display for ClusterStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let health = if self.lost_blocks > 0 {
            "DATA LOSS"
        } else if self.under_replicated_blocks > 0 {
            "DEGRADED"
        } else {
            "OK"
        };
        writeln!(f, "DFS Status: {health}")?;
        writeln!(
            f,
            "files: {}, directories: {}, blocks: {} (under replicated: {}, lost: {})",
            self.files,
            self.directories,
            self.blocks,
            self.under_replicated_blocks,
            self.lost_blocks
        )?;
        writeln!(
            f,
            "replication factor: {}, block size: {}",
            self.replication_factor, self.block_size
        )?;
        for datanode in &self.datanodes {
            writeln!(
                f,
                "  {} {}:{} {:?} blocks={} last heartbeat {}s ago",
                datanode.id,
                datanode.address,
                datanode.port,
                datanode.state,
                datanode.held_blocks,
                datanode.secs_since_heartbeat
            )?;
        }
        Ok(())
    }
}
