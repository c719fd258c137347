//! Headers of the namenode <-> datanode block transfer. Raw block bytes
//! follow a `Store` request and a `Found` reply on the same stream. `Delete`
//! carries no bytes either way.
use tokio::io::{AsyncRead, AsyncWrite};
use utilities::{data_packet::DataPacket, result::Result};

use crate::{PROTOCOL_VERSION, VERSION_FIELD, error::ProtocolError, request::check_version};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRequest {
    Store { block_id: String, size: u64 },
    Fetch { block_id: String },
    Delete { block_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReply {
    Stored { bytes_received: u64 },
    Found { size: u64 },
    Deleted { existed: bool },
    Error { kind: String, message: String },
}

fn malformed_request(e: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::MalformedRequest(e.to_string())
}
fn malformed_reply(e: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::MalformedResponse(e.to_string())
}

impl BlockRequest {
    pub fn block_id(&self) -> &str {
        match self {
            BlockRequest::Store { block_id, .. }
            | BlockRequest::Fetch { block_id }
            | BlockRequest::Delete { block_id } => block_id,
        }
    }
    pub fn to_packet(&self) -> DataPacket {
        let packet = DataPacket::new().with(VERSION_FIELD, PROTOCOL_VERSION.to_string());
        match self {
            BlockRequest::Store { block_id, size } => packet
                .with("action", "store_block")
                .with("block_id", block_id)
                .with("size", size.to_string()),
            BlockRequest::Fetch { block_id } => packet
                .with("action", "fetch_block")
                .with("block_id", block_id),
            BlockRequest::Delete { block_id } => packet
                .with("action", "delete_block")
                .with("block_id", block_id),
        }
    }
    pub fn from_packet(packet: &DataPacket) -> std::result::Result<Self, ProtocolError> {
        check_version(packet)?;
        let block_id = packet.get("block_id").map_err(malformed_request)?.to_owned();
        match packet.get("action").map_err(malformed_request)? {
            "store_block" => Ok(BlockRequest::Store {
                block_id,
                size: packet.get_parsed("size").map_err(malformed_request)?,
            }),
            "fetch_block" => Ok(BlockRequest::Fetch { block_id }),
            "delete_block" => Ok(BlockRequest::Delete { block_id }),
            other => Err(ProtocolError::InvalidAction(other.to_owned())),
        }
    }
    pub async fn read_from(
        stream: &mut (impl AsyncRead + Unpin),
    ) -> std::result::Result<Self, ProtocolError> {
        let packet = DataPacket::decode(stream)
            .await
            .map_err(malformed_request)?;
        Self::from_packet(&packet)
    }
    pub async fn write_to(&self, stream: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
        self.to_packet().write_to(stream).await
    }
}

impl BlockReply {
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        BlockReply::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }
    pub fn to_packet(&self) -> DataPacket {
        let packet = DataPacket::new().with(VERSION_FIELD, PROTOCOL_VERSION.to_string());
        match self {
            BlockReply::Stored { bytes_received } => packet
                .with("status", "stored")
                .with("bytes_received", bytes_received.to_string()),
            BlockReply::Found { size } => packet
                .with("status", "found")
                .with("size", size.to_string()),
            BlockReply::Deleted { existed } => packet
                .with("status", "deleted")
                .with("existed", existed.to_string()),
            BlockReply::Error { kind, message } => packet
                .with("status", "error")
                .with("error", kind)
                .with("message", message),
        }
    }
    pub fn from_packet(packet: &DataPacket) -> std::result::Result<Self, ProtocolError> {
        check_version(packet)?;
        match packet.get("status").map_err(malformed_reply)? {
            "stored" => Ok(BlockReply::Stored {
                bytes_received: packet
                    .get_parsed("bytes_received")
                    .map_err(malformed_reply)?,
            }),
            "found" => Ok(BlockReply::Found {
                size: packet.get_parsed("size").map_err(malformed_reply)?,
            }),
            "deleted" => Ok(BlockReply::Deleted {
                existed: packet.get_parsed("existed").map_err(malformed_reply)?,
            }),
            "error" => Ok(BlockReply::error(
                packet.get("error").map_err(malformed_reply)?,
                packet.get("message").unwrap_or_default(),
            )),
            other => Err(malformed_reply(format!("unknown status {other}"))),
        }
    }
    pub async fn read_from(
        stream: &mut (impl AsyncRead + Unpin),
    ) -> std::result::Result<Self, ProtocolError> {
        let packet = DataPacket::decode(stream).await.map_err(malformed_reply)?;
        Self::from_packet(&packet)
    }
    pub async fn write_to(&self, stream: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
        self.to_packet().write_to(stream).await
    }
}
