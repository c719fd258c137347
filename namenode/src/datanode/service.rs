use std::{fmt::Display, time::Duration};

use async_trait::async_trait;
use proto::block::{BlockReply, BlockRequest};
use storage::error::StoreError;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    time::timeout,
};
use utilities::{
    logger::{instrument, tracing},
    tcp_pool::TcpPool,
};

use crate::registry::datanode_details::DatanodeEndpoint;

/// The block store of a remote datanode as seen from the namenode.
#[async_trait]
pub trait BlockTransport: Send + Sync {
    async fn store_block(
        &self,
        target: &DatanodeEndpoint,
        block_id: &str,
        data: &[u8],
    ) -> Result<(), StoreError>;
    async fn fetch_block(
        &self,
        source: &DatanodeEndpoint,
        block_id: &str,
    ) -> Result<Vec<u8>, StoreError>;
    /// Returns whether the datanode still had the block.
    async fn delete_block(
        &self,
        target: &DatanodeEndpoint,
        block_id: &str,
    ) -> Result<bool, StoreError>;
}

fn transport_error(block_id: &str, e: impl Display) -> StoreError {
    StoreError::IoFailure {
        block_id: block_id.to_owned(),
        source: std::io::Error::other(e.to_string()),
    }
}

/// Talks to the datanode block server, one connection per transfer.
#[derive(Clone, Copy, Debug)]
pub struct DatanodeService {
    tcp_pool: TcpPool,
    io_timeout: Duration,
}

impl DatanodeService {
    pub fn new(io_timeout: Duration) -> Self {
        Self {
            tcp_pool: TcpPool::new(io_timeout),
            io_timeout,
        }
    }

    async fn store(
        &self,
        target: &DatanodeEndpoint,
        block_id: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        let err = |e| transport_error(block_id, e);
        let mut stream = self
            .tcp_pool
            .get_connection(&target.tcp_addrs())
            .await
            .map_err(err)?;
        BlockRequest::Store {
            block_id: block_id.to_owned(),
            size: data.len() as u64,
        }
        .write_to(&mut stream)
        .await
        .map_err(err)?;
        stream.write_all(data).await.map_err(err_io(block_id))?;
        stream.flush().await.map_err(err_io(block_id))?;
        match BlockReply::read_from(&mut stream)
            .await
            .map_err(|e| transport_error(block_id, e))?
        {
            BlockReply::Stored { bytes_received } if bytes_received == data.len() as u64 => Ok(()),
            BlockReply::Stored { bytes_received } => Err(transport_error(
                block_id,
                format!(
                    "datanode {} stored {bytes_received} of {} bytes",
                    target.id,
                    data.len()
                ),
            )),
            BlockReply::Error { kind, message } => Err(transport_error(
                block_id,
                format!("datanode {} refused block [{kind}] {message}", target.id),
            )),
            _ => Err(transport_error(block_id, "unexpected reply to store")),
        }
    }

    async fn fetch(&self, source: &DatanodeEndpoint, block_id: &str) -> Result<Vec<u8>, StoreError> {
        let err = |e| transport_error(block_id, e);
        let mut stream = self
            .tcp_pool
            .get_connection(&source.tcp_addrs())
            .await
            .map_err(err)?;
        BlockRequest::Fetch {
            block_id: block_id.to_owned(),
        }
        .write_to(&mut stream)
        .await
        .map_err(err)?;
        match BlockReply::read_from(&mut stream)
            .await
            .map_err(|e| transport_error(block_id, e))?
        {
            BlockReply::Found { size } => {
                let mut data = Vec::new();
                (&mut stream)
                    .take(size)
                    .read_to_end(&mut data)
                    .await
                    .map_err(err_io(block_id))?;
                if data.len() as u64 != size {
                    return Err(transport_error(
                        block_id,
                        format!("datanode {} sent {} of {size} bytes", source.id, data.len()),
                    ));
                }
                Ok(data)
            }
            BlockReply::Error { kind, .. } if kind == "NotFound" => {
                Err(StoreError::NotFound(block_id.to_owned()))
            }
            BlockReply::Error { kind, message } => Err(transport_error(
                block_id,
                format!("datanode {} failed to serve block [{kind}] {message}", source.id),
            )),
            _ => Err(transport_error(block_id, "unexpected reply to fetch")),
        }
    }

    async fn delete(&self, target: &DatanodeEndpoint, block_id: &str) -> Result<bool, StoreError> {
        let err = |e| transport_error(block_id, e);
        let mut stream = self
            .tcp_pool
            .get_connection(&target.tcp_addrs())
            .await
            .map_err(err)?;
        BlockRequest::Delete {
            block_id: block_id.to_owned(),
        }
        .write_to(&mut stream)
        .await
        .map_err(err)?;
        match BlockReply::read_from(&mut stream)
            .await
            .map_err(|e| transport_error(block_id, e))?
        {
            BlockReply::Deleted { existed } => Ok(existed),
            BlockReply::Error { kind, message } => Err(transport_error(
                block_id,
                format!("datanode {} failed to delete block [{kind}] {message}", target.id),
            )),
            _ => Err(transport_error(block_id, "unexpected reply to delete")),
        }
    }
}

fn err_io(block_id: &str) -> impl Fn(std::io::Error) -> StoreError + '_ {
    move |e| StoreError::io(block_id, e)
}

#[async_trait]
impl BlockTransport for DatanodeService {
    #[instrument(name = "service_datanode_store_block", skip(self, target, data), fields(datanode_id = %target.id, size = data.len()))]
    async fn store_block(
        &self,
        target: &DatanodeEndpoint,
        block_id: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        timeout(self.io_timeout, self.store(target, block_id, data))
            .await
            .map_err(|_| transport_error(block_id, format!("timed out storing on {}", target.id)))?
    }

    #[instrument(name = "service_datanode_fetch_block", skip(self, source), fields(datanode_id = %source.id))]
    async fn fetch_block(
        &self,
        source: &DatanodeEndpoint,
        block_id: &str,
    ) -> Result<Vec<u8>, StoreError> {
        timeout(self.io_timeout, self.fetch(source, block_id))
            .await
            .map_err(|_| {
                transport_error(block_id, format!("timed out fetching from {}", source.id))
            })?
    }

    #[instrument(name = "service_datanode_delete_block", skip(self, target), fields(datanode_id = %target.id))]
    async fn delete_block(
        &self,
        target: &DatanodeEndpoint,
        block_id: &str,
    ) -> Result<bool, StoreError> {
        timeout(self.io_timeout, self.delete(target, block_id))
            .await
            .map_err(|_| transport_error(block_id, format!("timed out deleting on {}", target.id)))?
    }
}
