use std::path::PathBuf;

use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{info, warn};

/// On-disk storage for in-progress uploads (temp dir) and completed files
/// (upload dir), mirroring the reference `Storage` type's shape: one flat
/// file per id, sequential/random-write I/O, no buffering tricks.
pub struct Storage {
    upload_dir: PathBuf,
    temp_dir: PathBuf,
}

impl Storage {
    pub async fn new(upload_dir: PathBuf, temp_dir: PathBuf, wipe_on_start: bool) -> anyhow::Result<Self> {
        if wipe_on_start {
            let _ = fs::remove_dir_all(&upload_dir).await;
            let _ = fs::remove_dir_all(&temp_dir).await;
        }
        fs::create_dir_all(&upload_dir).await?;
        fs::create_dir_all(&temp_dir).await?;
        info!(
            "Storage ready: uploads={} temp={}",
            upload_dir.display(),
            temp_dir.display()
        );
        Ok(Self { upload_dir, temp_dir })
    }

    pub fn temp_path(&self, upload_id: &str) -> PathBuf {
        self.temp_dir.join(upload_id)
    }

    pub fn file_path(&self, file_id: &str) -> PathBuf {
        self.upload_dir.join(file_id)
    }

    pub fn temp_dir(&self) -> &std::path::Path {
        &self.temp_dir
    }

    /// Create an empty tempfile for a newly-initialized upload session.
    pub async fn create_tempfile(&self, upload_id: &str) -> anyhow::Result<()> {
        fs::File::create(self.temp_path(upload_id)).await?;
        Ok(())
    }

    /// Write a chunk body at a byte offset into the session's tempfile.
    /// Idempotent: re-writing the same bytes at the same offset is a no-op
    /// in effect (spec.md §8 round-trip law).
    pub async fn write_chunk_at(&self, upload_id: &str, offset: u64, data: &[u8]) -> anyhow::Result<()> {
        let path = self.temp_path(upload_id);
        let mut file = fs::OpenOptions::new().write(true).open(&path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn tempfile_size(&self, upload_id: &str) -> anyhow::Result<u64> {
        let metadata = fs::metadata(self.temp_path(upload_id)).await?;
        Ok(metadata.len())
    }

    pub async fn delete_tempfile(&self, upload_id: &str) -> anyhow::Result<()> {
        match fs::remove_file(self.temp_path(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a completed session's tempfile into the upload dir under its
    /// freshly-minted `fileId`.
    pub async fn finalize(&self, upload_id: &str, file_id: &str) -> anyhow::Result<u64> {
        let from = self.temp_path(upload_id);
        let to = self.file_path(file_id);
        fs::rename(&from, &to).await?;
        let size = fs::metadata(&to).await?.len();
        Ok(size)
    }

    pub async fn delete_file(&self, file_id: &str) -> anyhow::Result<()> {
        match fs::remove_file(self.file_path(file_id)).await {
            Ok(()) => {
                info!("Deleted file {}", file_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("File {} already gone", file_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
