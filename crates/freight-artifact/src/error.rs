use thiserror::Error;

/// Errors produced by artifact validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("artifact {0}: recursive tracking requires a directory artifact")]
    RecursiveNonDir(String),

    #[error("artifact {0}: directory artifacts cannot skip the cache")]
    SkipCacheDir(String),
}

/// Result alias for artifact operations.
pub type ArtifactResult<T> = Result<T, ArtifactError>;
