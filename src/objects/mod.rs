pub mod fs;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub use fs::FsObjectStore;

/// Object operations the pipeline needs across its three locations: read
/// from landing, write artifacts to staging, relocate settled files to the
/// archive.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads the full contents of an incoming file.
    async fn fetch(&self, path: &Path) -> Result<Vec<u8>>;

    /// Writes (or overwrites) a staging artifact, returning its path.
    async fn put_staging(&self, artifact_name: &str, bytes: &[u8]) -> Result<PathBuf>;

    /// Moves a landed file into the archive under a timestamped name and
    /// returns the archive path. The source no longer exists afterwards.
    async fn archive(&self, path: &Path, archived_at: DateTime<Utc>) -> Result<PathBuf>;

    /// Removes a staging artifact. A missing artifact is not an error.
    async fn delete_staging(&self, path: &Path) -> Result<()>;
}
