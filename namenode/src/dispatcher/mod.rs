pub mod handler;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use proto::{request::Request, response::Response};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    time::timeout,
};
use utilities::{
    logger::{Instrument, Level, debug, error, span, warn},
    result::Result,
};

use crate::namenode_state::NamenodeState;
use handler::RequestHandler;

/// Accepts client and datanode connections. Each connection carries exactly
/// one request and one response and is handled on its own task.
pub struct Dispatcher {
    listener: TcpListener,
    handler: RequestHandler,
    io_timeout: Duration,
}

impl Dispatcher {
    pub async fn new(
        address: &str,
        state: Arc<NamenodeState>,
        io_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            handler: RequestHandler::new(state),
            io_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn start_and_accept(&self) -> Result<()> {
        loop {
            let (tcp_stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Error while accepting connection {e}");
                    continue;
                }
            };
            let handler = self.handler.clone();
            let io_timeout = self.io_timeout;
            let span = span!(Level::INFO, "dispatcher_connection", %peer);
            tokio::spawn(
                async move {
                    if let Err(e) = handle_connection(tcp_stream, handler, io_timeout).await {
                        error!("Error while handling the connection {e}");
                    }
                }
                .instrument(span),
            );
        }
    }
}

/// Reads one request, answers it and closes the stream. Undecodable requests
/// still get an error response.
pub async fn handle_connection(
    mut stream: impl AsyncRead + AsyncWrite + Unpin,
    handler: RequestHandler,
    io_timeout: Duration,
) -> Result<()> {
    let response = match timeout(io_timeout, Request::read_from(&mut stream)).await {
        Err(_) => return Err("Timed out waiting for the request".into()),
        Ok(Err(e)) => {
            warn!(kind = e.kind(), "Rejecting request {e}");
            Response::from(e)
        }
        Ok(Ok(request)) => {
            debug!(action = request.action(), "Request received");
            handler.handle(request).await
        }
    };
    timeout(io_timeout, response.write_to(&mut stream))
        .await
        .map_err(|_| "Timed out writing the response")??;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{placement::PlacementSettings, test_support::MemoryTransport};
    use proto::tree::{ClusterStatus, TreeNode};
    use tokio::io::duplex;
    use utilities::data_packet::DataPacket;

    fn handler() -> RequestHandler {
        RequestHandler::new(Arc::new(NamenodeState::new(
            PlacementSettings::new(1024, 2),
            Arc::new(MemoryTransport::default()),
        )))
    }

    async fn exchange(packet: DataPacket) -> Response {
        let (mut client, server) = duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server, handler(), Duration::from_secs(5)));
        packet.write_to(&mut client).await.unwrap();
        let response = Response::read_from(&mut client).await.unwrap();
        task.await.unwrap().unwrap();
        response
    }

    #[tokio::test]
    async fn unknown_action_gets_invalid_action() {
        let packet = DataPacket::new()
            .with("version", "1")
            .with("action", "format_disk");
        let response = exchange(packet).await;
        assert!(matches!(response, Response::Error { ref kind, .. } if kind == "InvalidAction"));
    }

    #[tokio::test]
    async fn missing_fields_and_versions_are_rejected() {
        let packet = DataPacket::new()
            .with("version", "1")
            .with("action", "move_file")
            .with("source_path", "/a");
        let response = exchange(packet).await;
        assert!(matches!(response, Response::Error { ref kind, .. } if kind == "MalformedRequest"));

        let packet = DataPacket::new().with("version", "9").with("action", "status");
        let response = exchange(packet).await;
        assert!(
            matches!(response, Response::Error { ref kind, .. } if kind == "UnsupportedVersion")
        );
    }

    #[tokio::test]
    async fn garbage_bytes_get_a_malformed_request_response() {
        let (mut client, server) = duplex(1024);
        let task = tokio::spawn(handle_connection(server, handler(), Duration::from_secs(5)));
        let mut raw = Vec::new();
        raw.extend_from_slice(&5_u32.to_le_bytes());
        raw.extend_from_slice(b"nosep");
        client.write_all(&raw).await.unwrap();
        let response = Response::read_from(&mut client).await.unwrap();
        assert!(matches!(response, Response::Error { ref kind, .. } if kind == "MalformedRequest"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn status_round_trips_over_the_stream() {
        let response = exchange(Request::Status.to_packet()).await;
        let Response::Status(ClusterStatus {
            replication_factor,
            block_size,
            directories,
            ..
        }) = response
        else {
            panic!("expected a status response, got {response:?}");
        };
        assert_eq!((replication_factor, block_size, directories), (2, 1024, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let (_client, server) = duplex(1024);
        let result = handle_connection(server, handler(), Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tree_of_a_file_with_many_blocks_fits_the_response() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("big.bin");
        tokio::fs::write(&local, vec![7u8; 50_000 * 16]).await.unwrap();
        let state = Arc::new(NamenodeState::new(
            PlacementSettings::new(16, 1),
            Arc::new(MemoryTransport::default()),
        ));
        state.register("dn-1", "127.0.0.1", 7001).await;
        state.register("dn-2", "127.0.0.1", 7002).await;
        let report = state
            .upload_file(&local.to_string_lossy(), "/big.bin")
            .await
            .unwrap();
        assert_eq!(report.blocks, 50_000);

        let (mut client, server) = duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(
            server,
            RequestHandler::new(state),
            Duration::from_secs(5),
        ));
        Request::TraverseDirectory {
            dfs_path: "/".into(),
        }
        .to_packet()
        .write_to(&mut client)
        .await
        .unwrap();
        let response = Response::read_from(&mut client).await.unwrap();
        task.await.unwrap().unwrap();

        let Response::Tree(tree) = response else {
            panic!("expected a tree, got {response:?}");
        };
        let Some(TreeNode::File {
            blocks,
            lost_blocks,
            data_nodes,
            ..
        }) = tree.child("big.bin").cloned()
        else {
            panic!("big.bin missing from {tree:?}");
        };
        assert_eq!((blocks, lost_blocks), (50_000, 0));
        assert_eq!(data_nodes, vec!["dn-1".to_string(), "dn-2".to_string()]);
    }
}
