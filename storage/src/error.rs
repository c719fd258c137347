use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO failure on block {block_id}: {source}")]
    IoFailure {
        block_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Block not found: {0}")]
    NotFound(String),

    #[error("Invalid block id: {0:?}")]
    InvalidBlockId(String),
}

impl StoreError {
    pub fn io(block_id: &str, source: std::io::Error) -> Self {
        StoreError::IoFailure {
            block_id: block_id.to_owned(),
            source,
        }
    }
    /// For lookups of committed blocks, where a missing file means a missing
    /// block.
    pub fn lookup(block_id: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return StoreError::NotFound(block_id.to_owned());
        }
        Self::io(block_id, source)
    }
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::IoFailure { .. } => "IOFailure",
            StoreError::NotFound(_) => "NotFound",
            StoreError::InvalidBlockId(_) => "IOFailure",
        }
    }
}
