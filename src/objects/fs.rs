use crate::error::{PipelineError, Result};
use crate::objects::ObjectStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem-backed object store over the configured staging and archive
/// directories. Relocation tries an atomic rename first and falls back to
/// copy-then-remove for cross-device moves.
pub struct FsObjectStore {
    staging_dir: PathBuf,
    archive_dir: PathBuf,
}

impl FsObjectStore {
    pub fn new(staging_dir: PathBuf, archive_dir: PathBuf) -> Self {
        Self {
            staging_dir,
            archive_dir,
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn fetch(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }

    async fn put_staging(&self, artifact_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.staging_dir)?;
        let path = self.staging_dir.join(artifact_name);
        fs::write(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "staging artifact written");
        Ok(path)
    }

    async fn archive(&self, path: &Path, archived_at: DateTime<Utc>) -> Result<PathBuf> {
        let relocate = || -> io::Result<PathBuf> {
            fs::create_dir_all(&self.archive_dir)?;
            let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "source has no file name")
            })?;
            let archived_name =
                format!("{}_{}", archived_at.format("%Y%m%d_%H%M%S"), file_name);
            let destination = self.archive_dir.join(archived_name);
            if fs::rename(path, &destination).is_err() {
                fs::copy(path, &destination)?;
                fs::remove_file(path)?;
            }
            Ok(destination)
        };
        let destination = relocate().map_err(|e| PipelineError::Relocation {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(from = %path.display(), to = %destination.display(), "file archived");
        Ok(destination)
    }

    async fn delete_staging(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
