use std::io;
use std::path::PathBuf;

use thiserror::Error;

use freight_artifact::ArtifactError;

/// Errors produced by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid checksum {0:?}")]
    InvalidChecksum(String),

    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("commit file {}: not in workspace", .0.display())]
    NotInWorkspace(PathBuf),

    #[error("commit file {}: not a regular file", .0.display())]
    NotARegularFile(PathBuf),

    #[error("commit directory {}: not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("checkout {}: object {checksum} missing from cache", path.display())]
    MissingCacheObject { path: PathBuf, checksum: String },

    #[error("checkout {}: destination already exists", .0.display())]
    DestinationExists(PathBuf),

    #[error("directory manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{tool}: {message}")]
    SyncTool { tool: String, message: String },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl CacheError {
    /// Wrap an I/O error with the operation name and the path it touched.
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { op, path, source }
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
