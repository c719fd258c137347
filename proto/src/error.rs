use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ProtocolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::MalformedRequest(_) => "MalformedRequest",
            ProtocolError::InvalidAction(_) => "InvalidAction",
            ProtocolError::UnsupportedVersion(_) => "UnsupportedVersion",
            ProtocolError::MalformedResponse(_) => "MalformedResponse",
        }
    }
}
