use std::{io, time::Duration};

use proto::block::{BlockReply, BlockRequest};
use storage::{error::StoreError, file_storage::FileStorage, storage::Storage};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, copy},
    net::TcpListener,
    time::timeout,
};
use utilities::{
    logger::{Instrument, Level, Span, error, info, span, trace},
    result::Result,
};

/// Serves block stores and fetches from the namenode, one block per
/// connection.
pub struct TCPService {
    listener: TcpListener,
    store: FileStorage,
    io_timeout: Duration,
}

impl TCPService {
    pub async fn new(address: &str, store: FileStorage, io_timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(TCPService {
            listener,
            store,
            io_timeout,
        })
    }

    pub async fn start_and_accept(&self) -> Result<()> {
        loop {
            let (tcp_stream, _) = self.listener.accept().await?;
            let store = self.store.clone();
            let io_timeout = self.io_timeout;
            let span = Span::current();
            tokio::spawn(
                async move {
                    if let Err(e) = handle_connection(tcp_stream, store, io_timeout).await {
                        error!("error while handling the tcp connection {e}");
                    }
                }
                .instrument(span),
            );
        }
    }
}

pub async fn handle_connection(
    mut stream: impl AsyncRead + AsyncWrite + Unpin,
    store: FileStorage,
    io_timeout: Duration,
) -> Result<()> {
    let request = match timeout(io_timeout, BlockRequest::read_from(&mut stream)).await {
        Err(_) => return Err("Timed out waiting for the block request".into()),
        Ok(Err(e)) => {
            BlockReply::error(e.kind(), e.to_string())
                .write_to(&mut stream)
                .await?;
            return Err(e.into());
        }
        Ok(Ok(request)) => request,
    };
    let span = span!(Level::INFO, "service_tcp_block", block_id = %request.block_id());
    async {
        match request {
            BlockRequest::Store { block_id, size } => {
                let reply = store_block(&mut stream, &store, &block_id, size, io_timeout).await;
                reply.write_to(&mut stream).await?;
            }
            BlockRequest::Fetch { block_id } => {
                fetch_block(&mut stream, &store, &block_id, io_timeout).await?;
            }
            BlockRequest::Delete { block_id } => {
                delete_block(&store, &block_id).await.write_to(&mut stream).await?;
            }
        }
        stream.shutdown().await?;
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    }
    .instrument(span)
    .await
}

/// Stages exactly `size` bytes from the stream and commits them. A short or
/// failed transfer leaves nothing behind.
async fn store_block(
    stream: &mut (impl AsyncRead + Unpin),
    store: &FileStorage,
    block_id: &str,
    size: u64,
    io_timeout: Duration,
) -> BlockReply {
    trace!(size, "Mode set to write");
    let mut limited_stream = stream.take(size);
    let written = match timeout(io_timeout, store.write(block_id, &mut limited_stream)).await {
        Err(_) => Err(StoreError::io(
            block_id,
            io::Error::new(io::ErrorKind::TimedOut, "timed out receiving block"),
        )),
        Ok(Ok(bytes_received)) if bytes_received == size => {
            store.commit(block_id).await.map(|_| bytes_received)
        }
        Ok(Ok(bytes_received)) => Err(StoreError::io(
            block_id,
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("received {bytes_received} of {size} bytes"),
            ),
        )),
        Ok(Err(e)) => Err(e),
    };
    match written {
        Ok(bytes_received) => {
            info!(bytes_received, "Block stored");
            BlockReply::Stored { bytes_received }
        }
        Err(e) => {
            error!(error = %e, "Block store failed");
            if let Err(e) = store.discard(block_id).await {
                error!(error = %e, "Could not discard staged block");
            }
            BlockReply::error(e.kind(), e.to_string())
        }
    }
}

async fn fetch_block(
    stream: &mut (impl AsyncWrite + Unpin),
    store: &FileStorage,
    block_id: &str,
    io_timeout: Duration,
) -> Result<()> {
    trace!("Mode set to read");
    let opened = match store.get_block_size(block_id).await {
        Ok(size) => store.read(block_id).await.map(|reader| (size, reader)),
        Err(e) => Err(e),
    };
    let (size, reader) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            error!(error = %e, "Block fetch failed");
            BlockReply::error(e.kind(), e.to_string())
                .write_to(stream)
                .await?;
            return Ok(());
        }
    };
    BlockReply::Found { size }.write_to(stream).await?;
    let mut limited_reader = reader.take(size);
    let sent = timeout(io_timeout, copy(&mut limited_reader, stream))
        .await
        .map_err(|_| "Timed out sending the block")??;
    stream.flush().await?;
    info!(sent, "Block served");
    Ok(())
}

async fn delete_block(store: &FileStorage, block_id: &str) -> BlockReply {
    match store.delete(block_id).await {
        Ok(existed) => {
            info!(existed, "Block deleted");
            BlockReply::Deleted { existed }
        }
        Err(e) => {
            error!(error = %e, "Block delete failed");
            BlockReply::error(e.kind(), e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, duplex};

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn serve(store: &FileStorage) -> DuplexStream {
        let (client, server) = duplex(64 * 1024);
        let store = store.clone();
        tokio::spawn(async move {
            let _ = handle_connection(server, store, TIMEOUT).await;
        });
        client
    }

    async fn store_request(store: &FileStorage, block_id: &str, data: &[u8]) -> BlockReply {
        let mut client = serve(store).await;
        BlockRequest::Store {
            block_id: block_id.into(),
            size: data.len() as u64,
        }
        .write_to(&mut client)
        .await
        .unwrap();
        client.write_all(data).await.unwrap();
        BlockReply::read_from(&mut client).await.unwrap()
    }

    #[tokio::test]
    async fn stored_block_is_served_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::new(dir.path()).await.unwrap();
        let reply = store_request(&store, "blk-1", b"some block bytes").await;
        assert_eq!(reply, BlockReply::Stored { bytes_received: 16 });

        let mut client = serve(&store).await;
        BlockRequest::Fetch {
            block_id: "blk-1".into(),
        }
        .write_to(&mut client)
        .await
        .unwrap();
        assert_eq!(
            BlockReply::read_from(&mut client).await.unwrap(),
            BlockReply::Found { size: 16 }
        );
        let mut data = Vec::new();
        client.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"some block bytes");
    }

    #[tokio::test]
    async fn short_transfer_is_not_committed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::new(dir.path()).await.unwrap();
        let mut client = serve(&store).await;
        BlockRequest::Store {
            block_id: "blk-2".into(),
            size: 10,
        }
        .write_to(&mut client)
        .await
        .unwrap();
        client.write_all(b"abcd").await.unwrap();
        client.shutdown().await.unwrap();
        let reply = BlockReply::read_from(&mut client).await.unwrap();
        assert!(matches!(reply, BlockReply::Error { ref kind, .. } if kind == "IOFailure"));
        assert!(store.available_blocks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_block_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::new(dir.path()).await.unwrap();
        let mut client = serve(&store).await;
        BlockRequest::Fetch {
            block_id: "nope".into(),
        }
        .write_to(&mut client)
        .await
        .unwrap();
        let reply = BlockReply::read_from(&mut client).await.unwrap();
        assert!(matches!(reply, BlockReply::Error { ref kind, .. } if kind == "NotFound"));
    }

    #[tokio::test]
    async fn deleted_block_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::new(dir.path()).await.unwrap();
        store_request(&store, "blk-3", b"doomed").await;
        for existed in [true, false] {
            let mut client = serve(&store).await;
            BlockRequest::Delete {
                block_id: "blk-3".into(),
            }
            .write_to(&mut client)
            .await
            .unwrap();
            assert_eq!(
                BlockReply::read_from(&mut client).await.unwrap(),
                BlockReply::Deleted { existed }
            );
        }
        assert!(store.available_blocks().await.unwrap().is_empty());
    }
}
