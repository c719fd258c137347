use proto::error::ProtocolError;
use storage::error::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory is not empty: {0}")]
    NotEmpty(String),

    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    #[error("File {path} of {size} bytes needs {expected} blocks, got {found}")]
    InconsistentBlocks {
        path: String,
        size: u64,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("No active datanodes available")]
    NoAvailableDataNodes,

    #[error("No active replica available for block {0}")]
    NoReplicaAvailable(String),

    #[error("Block {block_id} has {available} live replicas, replication factor is {required}")]
    InsufficientReplicationFactor {
        block_id: String,
        required: usize,
        available: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown datanode: {0}")]
    UnknownDataNode(String),
}

#[derive(Error, Debug)]
pub enum NamenodeError {
    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Local file error on {path}: {source}")]
    LocalIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl NamespaceError {
    pub fn kind(&self) -> &'static str {
        match self {
            NamespaceError::NotFound(_) => "NotFound",
            NamespaceError::AlreadyExists(_) => "AlreadyExists",
            NamespaceError::NotEmpty(_) => "NotEmpty",
            NamespaceError::InvalidPath(_) | NamespaceError::InconsistentBlocks { .. } => {
                "InvalidPath"
            }
        }
    }
}

impl PlacementError {
    pub fn kind(&self) -> &'static str {
        match self {
            PlacementError::NoAvailableDataNodes => "NoAvailableDataNodes",
            PlacementError::NoReplicaAvailable(_) => "NoReplicaAvailable",
            PlacementError::InsufficientReplicationFactor { .. } => "InsufficientReplicationFactor",
        }
    }
}

impl NamenodeError {
    pub fn local_io(path: &str, source: std::io::Error) -> Self {
        NamenodeError::LocalIo {
            path: path.to_owned(),
            source,
        }
    }
    /// Stable tag sent back to callers in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            NamenodeError::Namespace(e) => e.kind(),
            NamenodeError::Placement(e) => e.kind(),
            NamenodeError::Registry(RegistryError::UnknownDataNode(_)) => "UnknownDataNode",
            NamenodeError::Store(e) => e.kind(),
            NamenodeError::Protocol(e) => e.kind(),
            NamenodeError::LocalIo { .. } => "IOFailure",
        }
    }
}

pub type Result<T> = std::result::Result<T, NamenodeError>;
