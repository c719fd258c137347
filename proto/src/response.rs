use std::fmt::{self, Display, Formatter};

use tokio::io::{AsyncRead, AsyncWrite};
use utilities::{data_packet::DataPacket, result::Result};

use crate::{
    PROTOCOL_VERSION, VERSION_FIELD,
    error::ProtocolError,
    request::check_version,
    tree::{ClusterStatus, TreeNode},
};

/// Cap on a single response field. Tree and status payloads grow with the
/// namespace and the cluster, requests stay at the packet default.
pub const MAX_RESPONSE_FIELD_SIZE: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Message(String),
    Listing(Vec<String>),
    Tree(TreeNode),
    Status(ClusterStatus),
    Error { kind: String, message: String },
}

fn malformed(e: impl Display) -> ProtocolError {
    ProtocolError::MalformedResponse(e.to_string())
}

impl Response {
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    pub fn to_packet(&self) -> std::result::Result<DataPacket, ProtocolError> {
        let packet = DataPacket::new().with(VERSION_FIELD, PROTOCOL_VERSION.to_string());
        let packet = match self {
            Response::Message(message) => packet
                .with("status", "ok")
                .with("kind", "message")
                .with("payload", message),
            Response::Listing(names) => packet
                .with("status", "ok")
                .with("kind", "listing")
                .with("payload", serde_json::to_string(names).map_err(malformed)?),
            Response::Tree(tree) => packet
                .with("status", "ok")
                .with("kind", "tree")
                .with("payload", serde_json::to_string(tree).map_err(malformed)?),
            Response::Status(status) => packet
                .with("status", "ok")
                .with("kind", "status")
                .with("payload", serde_json::to_string(status).map_err(malformed)?),
            Response::Error { kind, message } => packet
                .with("status", "error")
                .with("error", kind)
                .with("message", message),
        };
        Ok(packet)
    }

    pub fn from_packet(packet: &DataPacket) -> std::result::Result<Self, ProtocolError> {
        check_version(packet)?;
        let get = |key: &str| packet.get(key).map_err(malformed);
        match get("status")? {
            "error" => Ok(Response::error(get("error")?, get("message")?)),
            "ok" => {
                let payload = get("payload")?;
                match get("kind")? {
                    "message" => Ok(Response::Message(payload.to_owned())),
                    "listing" => Ok(Response::Listing(
                        serde_json::from_str(payload).map_err(malformed)?,
                    )),
                    "tree" => Ok(Response::Tree(
                        serde_json::from_str(payload).map_err(malformed)?,
                    )),
                    "status" => Ok(Response::Status(
                        serde_json::from_str(payload).map_err(malformed)?,
                    )),
                    other => Err(malformed(format!("unknown payload kind {other}"))),
                }
            }
            other => Err(malformed(format!("unknown status {other}"))),
        }
    }

    pub async fn read_from(
        stream: &mut (impl AsyncRead + Unpin),
    ) -> std::result::Result<Self, ProtocolError> {
        let packet = DataPacket::decode_with_limit(stream, MAX_RESPONSE_FIELD_SIZE)
            .await
            .map_err(malformed)?;
        Self::from_packet(&packet)
    }

    pub async fn write_to(&self, stream: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
        self.to_packet()?.write_to(stream).await
    }
}

impl From<ProtocolError> for Response {
    fn from(value: ProtocolError) -> Self {
        Response::error(value.kind(), value.to_string())
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Response::Message(message) => write!(f, "{message}"),
            Response::Listing(names) => write!(f, "{}", names.join("\n")),
            Response::Tree(tree) => write!(f, "{tree}"),
            Response::Status(status) => write!(f, "{status}"),
            Response::Error { kind, message } => write!(f, "Error [{kind}] {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listing_survives_the_stream() {
        let response = Response::Listing(vec!["docs".into(), "a, b.txt".into()]);
        let (mut client, mut server) = tokio::io::duplex(4096);
        response.write_to(&mut server).await.unwrap();
        assert_eq!(Response::read_from(&mut client).await.unwrap(), response);
    }

    #[tokio::test]
    async fn payload_above_the_request_cap_is_accepted() {
        let names: Vec<String> = (0..300_000).map(|i| format!("file-{i:08}.bin")).collect();
        let response = Response::Listing(names);
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let writer = tokio::spawn(async move {
            response.write_to(&mut server).await.unwrap();
            response
        });
        let read = Response::read_from(&mut client).await.unwrap();
        let response = writer.await.unwrap();
        assert_eq!(read, response);
    }

    #[test]
    fn error_keeps_kind_and_message() {
        let packet = Response::error("NotEmpty", "directory /docs is not empty")
            .to_packet()
            .unwrap();
        assert_eq!(packet.get("status").unwrap(), "error");
        assert_eq!(
            Response::from_packet(&packet).unwrap(),
            Response::error("NotEmpty", "directory /docs is not empty")
        );
    }

    #[test]
    fn garbage_payload_is_malformed() {
        let packet = DataPacket::new()
            .with(VERSION_FIELD, PROTOCOL_VERSION.to_string())
            .with("status", "ok")
            .with("kind", "tree")
            .with("payload", "{not json");
        assert!(matches!(
            Response::from_packet(&packet),
            Err(ProtocolError::MalformedResponse(_))
        ));
    }
}
