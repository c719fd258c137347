use crate::result::Result;
use std::{collections::HashMap, io::Cursor, str::FromStr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// a single field above this size is treated as a malformed packet
pub const MAX_FIELD_SIZE: u32 = 4 * 1024 * 1024;
pub const MAX_FIELD_COUNT: usize = 64;

/// A flat record of `key:value` string fields. On the wire every field is
/// prefixed by its `u32` little endian length and the record ends with a
/// zero length field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataPacket {
    pub fields: HashMap<String, String>,
}

// methods regarding the creation of headers
impl DataPacket {
    pub fn new() -> Self {
        Self {
            fields: HashMap::default(),
        }
    }
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }
    pub fn get(&self, key: &str) -> Result<&str> {
        // using results for easy error mapping
        match self.fields.get(key) {
            Some(v) => Ok(v),
            None => Err(format!("Can't find value of field {}.", key).into()),
        }
    }
    pub fn get_parsed<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.get(key)?;
        raw.parse::<T>()
            .map_err(|e| format!("Invalid value {raw:?} for field {key} : {e}").into())
    }
}

// regarding the stream encoding and decoding
impl DataPacket {
    pub async fn decode(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        Self::decode_with_limit(stream, MAX_FIELD_SIZE).await
    }
    /// Same as `decode` with a caller chosen cap on a single field.
    pub async fn decode_with_limit(
        stream: &mut (impl AsyncRead + Unpin),
        max_field_size: u32,
    ) -> Result<Self> {
        let mut fields = HashMap::new();
        loop {
            let field_size = stream.read_u32_le().await?;
            if field_size == 0 {
                break;
            }
            if field_size > max_field_size {
                return Err(format!("Field of {field_size} bytes exceeds the packet limit").into());
            }
            if fields.len() == MAX_FIELD_COUNT {
                return Err("Packet has too many fields".into());
            }
            let mut field_raw = vec![0u8; field_size as usize];
            stream.read_exact(&mut field_raw).await?;
            let field_str = String::from_utf8(field_raw)?;
            match field_str.split_once(':') {
                Some((field_title, field_value)) => {
                    fields.insert(field_title.to_owned(), field_value.to_owned());
                }
                None => {
                    return Err("Invalid packet structure splitter: not found".into());
                }
            }
        }
        Ok(DataPacket { fields })
    }
    pub fn encode(&self) -> impl AsyncRead + Unpin + use<> {
        let mut buf = Vec::new();
        self.fields.iter().for_each(|(key, value)| {
            buf.extend_from_slice(&((key.len() + value.len() + 1) as u32).to_le_bytes());
            buf.extend_from_slice(key.as_bytes());
            buf.extend_from_slice(b":");
            buf.extend_from_slice(value.as_bytes());
        });
        buf.extend_from_slice(&0_u32.to_le_bytes());
        Cursor::new(buf)
    }
    pub async fn write_to(&self, stream: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
        tokio::io::copy(&mut self.encode(), stream).await?;
        stream.flush().await?;
        Ok(())
    }
}
