use std::io;
use std::path::PathBuf;

use thiserror::Error;

use freight_artifact::ArtifactError;
use freight_cache::CacheError;

/// Errors produced by stage operations.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("stage file {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("serialize stage: {0}")]
    Serialize(serde_yaml::Error),

    #[error("path {0} declared as both a dependency and an output")]
    PathInBothMaps(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl StageError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { op, path, source }
    }
}

/// Result alias for stage operations.
pub type StageResult<T> = Result<T, StageError>;
