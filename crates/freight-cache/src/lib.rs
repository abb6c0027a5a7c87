//! Content-addressed local artifact cache.
//!
//! [`LocalCache`] stores immutable objects under a root directory, keyed by
//! their blake2b-256 digest: object `c` lives at `<root>/<c[0:2]>/<c[2:64]>`
//! with mode `0444`. Directory artifacts are represented by a manifest
//! object (canonical JSON) stored in the same layout; the manifest's own
//! checksum is the directory artifact's checksum.
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written; the cache never deletes them.
//! 2. Every write goes through a same-filesystem temp file and an atomic
//!    rename, so the final path appears fully or not at all.
//! 3. Concurrent commits of the same checksum are safe: a race produces
//!    identical bytes and the last rename wins harmlessly.
//! 4. `status` has no side effects on the workspace or the cache.

pub mod error;

mod checkout;
mod commit;
mod remote;
mod status;

use std::fs;
use std::path::{Path, PathBuf};

use freight_artifact::{Artifact, ArtifactStatus, Strategy};

pub use error::{CacheError, CacheResult};

/// A content-addressed on-disk object store.
#[derive(Clone, Debug)]
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    /// Open the cache rooted at `root`, creating the directory if absent.
    pub fn new(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(CacheError::io("create cache root", root.clone()))?;
        Ok(Self { root })
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The object path for a checksum: `<root>/<c[0:2]>/<c[2:64]>`.
    ///
    /// Fails if `checksum` is not exactly 64 lowercase hex characters.
    pub fn path_for_checksum(&self, checksum: &str) -> CacheResult<PathBuf> {
        if !freight_digest::is_valid(checksum) {
            return Err(CacheError::InvalidChecksum(checksum.to_string()));
        }
        Ok(self.root.join(&checksum[..2]).join(&checksum[2..]))
    }

    /// Report the status of `art` relative to the workspace rooted at
    /// `working_dir` and to this cache.
    pub fn status(&self, working_dir: &Path, art: &Artifact) -> CacheResult<ArtifactStatus> {
        if art.is_dir {
            let (status, _) = status::dir_artifact_status(self, working_dir, art)?;
            Ok(status)
        } else {
            status::file_artifact_status(self, working_dir, art)
        }
    }

    /// Checksum the artifact's workspace content, store it in the cache,
    /// and re-materialize it according to `strategy`.
    ///
    /// Sets `art.checksum` on success. Committing an artifact whose
    /// contents already match the cache is a no-op.
    pub fn commit(
        &self,
        working_dir: &Path,
        art: &mut Artifact,
        strategy: Strategy,
    ) -> CacheResult<()> {
        art.validate()?;
        if art.is_dir {
            commit::commit_dir_artifact(self, working_dir, art, strategy)
        } else {
            commit::commit_file_artifact(self, working_dir, art, strategy)
        }
    }

    /// Materialize `art` in the workspace from the cache.
    ///
    /// Fails if the cache object is missing, or if the destination already
    /// exists and `force` is not set.
    pub fn checkout(
        &self,
        working_dir: &Path,
        art: &Artifact,
        strategy: Strategy,
        force: bool,
    ) -> CacheResult<()> {
        if art.is_dir {
            checkout::checkout_dir_artifact(self, working_dir, art, strategy, force)
        } else {
            checkout::checkout_file_artifact(self, working_dir, art, strategy, force)
        }
    }

    /// Download the cache objects reachable from `artifacts` from `remote`
    /// using the external sync tool `sync_tool`.
    pub fn fetch(&self, remote: &str, sync_tool: &str, artifacts: &[Artifact]) -> CacheResult<()> {
        remote::fetch(self, remote, sync_tool, artifacts)
    }

    /// Upload the cache objects reachable from `artifacts` to `remote`
    /// using the external sync tool `sync_tool`.
    pub fn push(&self, remote: &str, sync_tool: &str, artifacts: &[Artifact]) -> CacheResult<()> {
        remote::push(self, remote, sync_tool, artifacts)
    }
}
