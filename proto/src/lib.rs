//! Wire schema shared by the namenode, the datanodes and the client.
//!
//! Every message is a [`utilities::data_packet::DataPacket`]: flat string
//! fields, one of which (`version`) pins the schema. Structured payloads are
//! carried as JSON text inside a field, so decoding never does more than
//! parse strings into known types.
pub mod block;
pub mod error;
pub mod request;
pub mod response;
pub mod tree;

pub const PROTOCOL_VERSION: u32 = 1;
pub const VERSION_FIELD: &str = "version";
