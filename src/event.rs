use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extensions the sweep will pick up from the landing location.
pub const ELIGIBLE_EXTENSIONS: &[&str] = &["csv"];

/// A single observed arrival of a file in the landing location.
///
/// Identity is the path; the version marker is the modification timestamp.
/// Redelivery of the same version produces a byte-identical event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvent {
    pub file_path: PathBuf,
    pub file_name: String,
    pub size_bytes: i64,
    pub last_modified: DateTime<Utc>,
    /// Monotonically increasing version token for the object, carried
    /// opaquely from the trigger. Filesystem-derived events use the mtime in
    /// milliseconds, which grows across rewrites the way an object-store
    /// generation number does.
    pub generation: i64,
}

impl FileEvent {
    /// Builds an event by stat-ing a path.
    ///
    /// The modification time is truncated to millisecond precision so repeated
    /// observations of the same version compare equal regardless of filesystem
    /// timestamp granularity.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )
            .into());
        }
        let modified: DateTime<Utc> = metadata.modified()?.into();
        let last_modified = Utc
            .timestamp_millis_opt(modified.timestamp_millis())
            .single()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unrepresentable mtime for {}", path.display()),
                )
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path has no file name: {}", path.display()),
                )
            })?;
        // Canonicalize so "./drop/x.csv" and "drop/x.csv" share one ledger
        // identity no matter how the invocation spelled the path.
        let file_path = fs::canonicalize(path)?;
        Ok(Self {
            file_path,
            file_name,
            size_bytes: metadata.len() as i64,
            last_modified,
            generation: last_modified.timestamp_millis(),
        })
    }

    /// Ledger identity of this file.
    pub fn path_str(&self) -> String {
        self.file_path.to_string_lossy().to_string()
    }

    /// File name without its final extension, used to derive artifact names.
    pub fn file_stem(&self) -> &str {
        self.file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }

    /// Whether the sweep should hand this file to the pipeline at all.
    /// Hidden files and editor leftovers are ignored without a ledger entry.
    pub fn is_eligible(&self) -> bool {
        !self.file_name.starts_with('.')
            && !self.file_name.ends_with('~')
            && has_eligible_extension(&self.file_path)
    }
}

pub fn has_eligible_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ELIGIBLE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
