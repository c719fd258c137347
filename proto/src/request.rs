use tokio::io::{AsyncRead, AsyncWrite};
use utilities::{data_packet::DataPacket, result::Result};

use crate::{PROTOCOL_VERSION, VERSION_FIELD, error::ProtocolError};

pub const ACTION_FIELD: &str = "action";

/// One request to the namenode. The action tag and field names are the wire
/// names, see [`Request::action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register {
        data_node_id: String,
        data_node_address: String,
        data_node_port: u16,
    },
    Heartbeat {
        data_node_id: String,
    },
    CreateDirectory {
        parent_path: String,
        directory_name: String,
    },
    DeleteDirectory {
        directory_path: String,
    },
    MoveFile {
        source_path: String,
        destination_path: String,
    },
    UploadFile {
        local_path: String,
        dfs_path: String,
    },
    DownloadFile {
        dfs_path: String,
        local_path: String,
    },
    Status,
    ListDirectoryContents {
        dfs_path: String,
    },
    TraverseDirectory {
        dfs_path: String,
    },
}

pub fn check_version(packet: &DataPacket) -> std::result::Result<(), ProtocolError> {
    match packet.fields.get(VERSION_FIELD) {
        Some(version) if version.parse::<u32>().ok() == Some(PROTOCOL_VERSION) => Ok(()),
        Some(version) => Err(ProtocolError::UnsupportedVersion(version.to_owned())),
        None => Err(ProtocolError::UnsupportedVersion("<missing>".to_owned())),
    }
}

fn field(packet: &DataPacket, key: &str) -> std::result::Result<String, ProtocolError> {
    packet
        .fields
        .get(key)
        .cloned()
        .ok_or_else(|| ProtocolError::MalformedRequest(format!("missing field {key}")))
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::Register { .. } => "register",
            Request::Heartbeat { .. } => "heartbeat",
            Request::CreateDirectory { .. } => "create_directory",
            Request::DeleteDirectory { .. } => "delete_directory",
            Request::MoveFile { .. } => "move_file",
            Request::UploadFile { .. } => "upload_file",
            Request::DownloadFile { .. } => "download_file",
            Request::Status => "status",
            Request::ListDirectoryContents { .. } => "list_directory_contents",
            Request::TraverseDirectory { .. } => "traverse_directory",
        }
    }

    pub fn to_packet(&self) -> DataPacket {
        let packet = DataPacket::new()
            .with(VERSION_FIELD, PROTOCOL_VERSION.to_string())
            .with(ACTION_FIELD, self.action());
        match self {
            Request::Register {
                data_node_id,
                data_node_address,
                data_node_port,
            } => packet
                .with("data_node_id", data_node_id)
                .with("data_node_address", data_node_address)
                .with("data_node_port", data_node_port.to_string()),
            Request::Heartbeat { data_node_id } => packet.with("data_node_id", data_node_id),
            Request::CreateDirectory {
                parent_path,
                directory_name,
            } => packet
                .with("parent_path", parent_path)
                .with("directory_name", directory_name),
            Request::DeleteDirectory { directory_path } => {
                packet.with("directory_path", directory_path)
            }
            Request::MoveFile {
                source_path,
                destination_path,
            } => packet
                .with("source_path", source_path)
                .with("destination_path", destination_path),
            Request::UploadFile {
                local_path,
                dfs_path,
            } => packet
                .with("local_path", local_path)
                .with("dfs_path", dfs_path),
            Request::DownloadFile {
                dfs_path,
                local_path,
            } => packet
                .with("dfs_path", dfs_path)
                .with("local_path", local_path),
            Request::Status => packet,
            Request::ListDirectoryContents { dfs_path } => packet.with("dfs_path", dfs_path),
            Request::TraverseDirectory { dfs_path } => packet.with("dfs_path", dfs_path),
        }
    }

    pub fn from_packet(packet: &DataPacket) -> std::result::Result<Self, ProtocolError> {
        check_version(packet)?;
        let action = field(packet, ACTION_FIELD)?;
        let request = match action.as_str() {
            "register" => {
                let raw_port = field(packet, "data_node_port")?;
                let data_node_port = raw_port.parse::<u16>().map_err(|e| {
                    ProtocolError::MalformedRequest(format!(
                        "invalid data_node_port {raw_port:?} : {e}"
                    ))
                })?;
                Request::Register {
                    data_node_id: field(packet, "data_node_id")?,
                    data_node_address: field(packet, "data_node_address")?,
                    data_node_port,
                }
            }
            "heartbeat" => Request::Heartbeat {
                data_node_id: field(packet, "data_node_id")?,
            },
            "create_directory" => Request::CreateDirectory {
                parent_path: field(packet, "parent_path")?,
                directory_name: field(packet, "directory_name")?,
            },
            "delete_directory" => Request::DeleteDirectory {
                directory_path: field(packet, "directory_path")?,
            },
            "move_file" => Request::MoveFile {
                source_path: field(packet, "source_path")?,
                destination_path: field(packet, "destination_path")?,
            },
            "upload_file" => Request::UploadFile {
                local_path: field(packet, "local_path")?,
                dfs_path: field(packet, "dfs_path")?,
            },
            "download_file" => Request::DownloadFile {
                dfs_path: field(packet, "dfs_path")?,
                local_path: field(packet, "local_path")?,
            },
            "status" => Request::Status,
            "list_directory_contents" => Request::ListDirectoryContents {
                dfs_path: field(packet, "dfs_path")?,
            },
            "traverse_directory" => Request::TraverseDirectory {
                dfs_path: field(packet, "dfs_path")?,
            },
            unknown => return Err(ProtocolError::InvalidAction(unknown.to_owned())),
        };
        Ok(request)
    }

    pub async fn read_from(
        stream: &mut (impl AsyncRead + Unpin),
    ) -> std::result::Result<Self, ProtocolError> {
        let packet = DataPacket::decode(stream)
            .await
            .map_err(|e| ProtocolError::MalformedRequest(e.to_string()))?;
        Self::from_packet(&packet)
    }

    pub async fn write_to(&self, stream: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
        self.to_packet().write_to(stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_port_must_be_numeric() {
        let packet = Request::Register {
            data_node_id: "dn-1".into(),
            data_node_address: "127.0.0.1".into(),
            data_node_port: 6001,
        }
        .to_packet()
        .with("data_node_port", "not-a-port");
        assert!(matches!(
            Request::from_packet(&packet),
            Err(ProtocolError::MalformedRequest(_))
        ));
    }

    #[test]
    fn unknown_action_is_reported() {
        let packet = DataPacket::new()
            .with(VERSION_FIELD, PROTOCOL_VERSION.to_string())
            .with(ACTION_FIELD, "format_disk");
        assert_eq!(
            Request::from_packet(&packet),
            Err(ProtocolError::InvalidAction("format_disk".into()))
        );
    }

    #[test]
    fn missing_fields_are_malformed() {
        let packet = DataPacket::new()
            .with(VERSION_FIELD, PROTOCOL_VERSION.to_string())
            .with(ACTION_FIELD, "move_file")
            .with("source_path", "/a");
        assert!(matches!(
            Request::from_packet(&packet),
            Err(ProtocolError::MalformedRequest(_))
        ));
    }

    #[test]
    fn foreign_version_is_rejected() {
        let packet = Request::Status.to_packet().with(VERSION_FIELD, "7");
        assert_eq!(
            Request::from_packet(&packet),
            Err(ProtocolError::UnsupportedVersion("7".into()))
        );
        let mut packet = Request::Status.to_packet();
        packet.remove(VERSION_FIELD);
        assert!(matches!(
            Request::from_packet(&packet),
            Err(ProtocolError::UnsupportedVersion(_))
        ));
    }

    #[tokio::test]
    async fn request_survives_the_stream() {
        let request = Request::MoveFile {
            source_path: "/docs/a.txt".into(),
            destination_path: "/archive/a.txt".into(),
        };
        let (mut client, mut server) = tokio::io::duplex(4096);
        request.write_to(&mut client).await.unwrap();
        assert_eq!(Request::read_from(&mut server).await.unwrap(), request);
    }
}
