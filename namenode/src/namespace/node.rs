use std::collections::HashMap;

pub type BlockId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceNode {
    Directory(Directory),
    File(FileMeta),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Directory {
    pub name: String,
    pub children: HashMap<String, NamespaceNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub size_bytes: u64,
    pub block_size_bytes: u64,
    /// covers `[0, size_bytes)` in order
    pub block_ids: Vec<BlockId>,
}

impl NamespaceNode {
    pub fn name(&self) -> &str {
        match self {
            NamespaceNode::Directory(directory) => &directory.name,
            NamespaceNode::File(file) => &file.name,
        }
    }
    pub fn set_name(&mut self, name: &str) {
        match self {
            NamespaceNode::Directory(directory) => directory.name = name.to_owned(),
            NamespaceNode::File(file) => file.name = name.to_owned(),
        }
    }
}

impl Directory {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            children: HashMap::default(),
        }
    }
    /// Counts (files, directories) below this directory, itself excluded.
    pub fn count_nodes(&self) -> (usize, usize) {
        self.children
            .values()
            .fold((0, 0), |(files, directories), child| match child {
                NamespaceNode::File(_) => (files + 1, directories),
                NamespaceNode::Directory(directory) => {
                    let (sub_files, sub_directories) = directory.count_nodes();
                    (files + sub_files, directories + sub_directories + 1)
                }
            })
    }
}

impl FileMeta {
    pub fn expected_block_count(size_bytes: u64, block_size_bytes: u64) -> usize {
        if block_size_bytes == 0 {
            return 0;
        }
        size_bytes.div_ceil(block_size_bytes) as usize
    }
    /// Byte length of the block at `index`, the last one may be short.
    pub fn block_len(&self, index: usize) -> u64 {
        let start = index as u64 * self.block_size_bytes;
        self.size_bytes.saturating_sub(start).min(self.block_size_bytes)
    }
}
