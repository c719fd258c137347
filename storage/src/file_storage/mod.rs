use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

use crate::storage::{Result, Storage, StoreError, validate_block_id};
use tokio::{
    fs::{self, File},
    io::{AsyncWriteExt, copy},
};

const BLOCK_SUFFIX: &str = ".blk";

#[derive(Clone, Debug)]
pub struct FileStorage {
    root: PathBuf,
}
impl FileStorage {
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let staged = root.join("staged");
        fs::create_dir_all(&staged).await.map_err(|e| {
            error!(root=%root.display(),error=%e,"Error while creating the root for storage");
            StoreError::io("<root>", e)
        })?;
        info!(root=%root.display(),"Created root and staging dir for storage");
        Ok(FileStorage { root })
    }
    fn get_committed_path(&self, block_id: &str) -> PathBuf {
        self.root.join(format!("{block_id}{BLOCK_SUFFIX}"))
    }
    fn get_staged_path(&self, block_id: &str) -> PathBuf {
        self.root.join("staged").join(block_id)
    }
}
impl Storage for FileStorage {
    #[instrument(name = "file_storage_write", skip(self, block_stream))]
    async fn write(
        &self,
        block_id: &str,
        block_stream: &mut (impl tokio::io::AsyncRead + Unpin),
    ) -> Result<u64> {
        validate_block_id(block_id)?;
        let block_path = self.get_staged_path(block_id);
        let mut block_file = File::create(block_path)
            .await
            .map_err(|e| StoreError::io(block_id, e))?;
        let written_byte_count = copy(block_stream, &mut block_file)
            .await
            .map_err(|e| StoreError::io(block_id, e))?;
        block_file
            .sync_all()
            .await
            .map_err(|e| StoreError::io(block_id, e))?;
        block_file
            .shutdown()
            .await
            .map_err(|e| StoreError::io(block_id, e))?;
        info!(%block_id, written_byte_count, "data staged successfully");
        Ok(written_byte_count)
    }
    #[instrument(name = "file_storage_commit", skip(self))]
    async fn commit(&self, block_id: &str) -> Result<()> {
        validate_block_id(block_id)?;
        let staged_path = self.get_staged_path(block_id);
        let committed_path = self.get_committed_path(block_id);
        if fs::try_exists(&staged_path)
            .await
            .map_err(|e| StoreError::io(block_id, e))?
        {
            // rename is atomic so readers see either nothing or the whole block
            fs::rename(staged_path, committed_path)
                .await
                .map_err(|e| StoreError::io(block_id, e))?;
        } else if !fs::try_exists(&committed_path)
            .await
            .map_err(|e| StoreError::io(block_id, e))?
        {
            return Err(StoreError::NotFound(block_id.to_owned()));
        }
        Ok(())
    }
    async fn discard(&self, block_id: &str) -> Result<()> {
        validate_block_id(block_id)?;
        match fs::remove_file(self.get_staged_path(block_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(block_id, e)),
        }
    }
    #[instrument(name = "file_storage_read", skip(self))]
    async fn read(&self, block_id: &str) -> Result<Box<dyn tokio::io::AsyncRead + Unpin + Send>> {
        validate_block_id(block_id)?;
        let block_path = self.get_committed_path(block_id);
        let block_file = File::open(block_path)
            .await
            .map_err(|e| StoreError::lookup(block_id, e))?;
        Ok(Box::new(block_file))
    }
    #[instrument(name = "file_storage_block_size", skip(self))]
    async fn get_block_size(&self, block_id: &str) -> Result<u64> {
        validate_block_id(block_id)?;
        let metadata = fs::metadata(self.get_committed_path(block_id))
            .await
            .map_err(|e| StoreError::lookup(block_id, e))?;
        Ok(metadata.len())
    }
    async fn delete(&self, block_id: &str) -> Result<bool> {
        validate_block_id(block_id)?;
        match fs::remove_file(self.get_committed_path(block_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(block_id, e)),
        }
    }
    #[instrument(name = "file_storage_available_blocks", skip(self))]
    async fn available_blocks(&self) -> Result<Vec<String>> {
        let mut dir_enteries = fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::io("<root>", e))?;
        let mut block_ids = vec![];
        while let Some(entry) = dir_enteries
            .next_entry()
            .await
            .map_err(|e| StoreError::io("<root>", e))?
        {
            // staging dir and foreign files are skipped
            if let Some(block_id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_suffix(BLOCK_SUFFIX))
            {
                block_ids.push(block_id.to_owned());
            }
        }
        block_ids.sort();
        Ok(block_ids)
    }
}
