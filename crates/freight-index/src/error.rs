use std::io;
use std::path::PathBuf;

use thiserror::Error;

use freight_cache::CacheError;
use freight_stage::StageError;

/// Errors produced by index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("stage {0} is already in the index")]
    AlreadyIndexed(String),

    #[error("add stage {0}: path is a lock file, not a stage manifest")]
    IsLockFile(String),

    #[error("add stage {stage}: artifact {artifact} is already owned by {owner}")]
    OwnershipConflict {
        stage: String,
        artifact: String,
        owner: String,
    },

    #[error("cycle detected at stage {0}")]
    Cycle(String),

    #[error("stage {0} is not in the index")]
    UnknownStage(String),

    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("index file {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl IndexError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { op, path, source }
    }
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
