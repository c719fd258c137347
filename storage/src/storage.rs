use tokio::io;

pub use crate::error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Local persistence of block bytes addressed only by block id. A block
/// becomes readable once `commit` moved it out of staging, so readers never
/// observe a half written block.
pub trait Storage {
    async fn write(
        &self,
        block_id: &str,
        block_stream: &mut (impl io::AsyncRead + Unpin),
    ) -> Result<u64>;
    async fn commit(&self, block_id: &str) -> Result<()>;
    async fn discard(&self, block_id: &str) -> Result<()>;
    async fn read(&self, block_id: &str) -> Result<Box<dyn io::AsyncRead + Unpin + Send>>;
    async fn get_block_size(&self, block_id: &str) -> Result<u64>;
    async fn delete(&self, block_id: &str) -> Result<bool>;
    async fn available_blocks(&self) -> Result<Vec<String>>;
}

// block ids end up in file names
pub fn validate_block_id(block_id: &str) -> Result<()> {
    let valid = !block_id.is_empty()
        && block_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidBlockId(block_id.to_owned()))
    }
}
