//! Status computation for file and directory artifacts.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use freight_artifact::{Artifact, ArtifactStatus, DirectoryManifest};
use freight_fsutil::FileStatus;

use crate::error::{CacheError, CacheResult};
use crate::LocalCache;

/// Everything [`quick_status`] learns about an artifact.
pub(crate) struct QuickStatus {
    pub status: ArtifactStatus,
    /// The cache object path; `None` when the recorded checksum is invalid.
    pub cache_path: Option<PathBuf>,
    pub work_path: PathBuf,
}

/// Shared status prelude: classify the workspace path, test cache object
/// existence, and resolve the symlink quick path.
///
/// Populates every status field except `contents_match` -- with one
/// exception: when the workspace file is a symbolic link and the checksum
/// is cached, comparing the link target against the cache path is a cheap
/// authoritative answer.
pub(crate) fn quick_status(
    cache: &LocalCache,
    working_dir: &Path,
    art: &Artifact,
) -> CacheResult<QuickStatus> {
    let work_path = working_dir.join(&art.path);
    let mut status = ArtifactStatus::default();

    let cache_path = match cache.path_for_checksum(&art.checksum) {
        Ok(path) => {
            status.has_checksum = true;
            status.checksum_in_cache = freight_fsutil::exists(&path, false)
                .map_err(CacheError::io("stat cache object", path.clone()))?;
            Some(path)
        }
        Err(_) => None,
    };

    status.workspace_file_status = freight_fsutil::file_status(&work_path)
        .map_err(CacheError::io("stat workspace path", work_path.clone()))?;

    if status.has_checksum
        && status.checksum_in_cache
        && status.workspace_file_status == FileStatus::Link
    {
        let target = fs::read_link(&work_path)
            .map_err(CacheError::io("read link", work_path.clone()))?;
        status.contents_match = Some(target.as_path()) == cache_path.as_deref();
    }

    Ok(QuickStatus {
        status,
        cache_path,
        work_path,
    })
}

pub(crate) fn file_artifact_status(
    cache: &LocalCache,
    working_dir: &Path,
    art: &Artifact,
) -> CacheResult<ArtifactStatus> {
    let quick = quick_status(cache, working_dir, art)?;
    let mut status = quick.status;

    if status.workspace_file_status != FileStatus::RegularFile {
        // Links were already resolved by the quick path; anything else
        // cannot match.
        return Ok(status);
    }

    if art.skip_cache {
        // No cache object to compare against; recompute the digest.
        if status.has_checksum {
            let file = File::open(&quick.work_path)
                .map_err(CacheError::io("open workspace file", quick.work_path.clone()))?;
            let cksum = freight_digest::checksum(file, 0)
                .map_err(CacheError::io("checksum workspace file", quick.work_path.clone()))?;
            status.contents_match = cksum == art.checksum;
        }
        return Ok(status);
    }

    if status.checksum_in_cache {
        let cache_path = quick.cache_path.as_deref().expect("checksum_in_cache implies cache path");
        status.contents_match = freight_fsutil::same_contents(&quick.work_path, cache_path)
            .map_err(CacheError::io("compare contents", quick.work_path.clone()))?;
    }
    Ok(status)
}

/// Directory status. Returns the manifest loaded from the cache so commit
/// can reuse the checksums of unchanged children.
pub(crate) fn dir_artifact_status(
    cache: &LocalCache,
    working_dir: &Path,
    art: &Artifact,
) -> CacheResult<(ArtifactStatus, Option<DirectoryManifest>)> {
    let quick = quick_status(cache, working_dir, art)?;
    let mut status = quick.status;

    if !(status.has_checksum && status.checksum_in_cache) {
        return Ok((status, None));
    }

    if status.workspace_file_status != FileStatus::Directory {
        // The recorded checksum names a directory but the workspace path is
        // something else; report a mismatch rather than erroring.
        return Ok((status, None));
    }

    let cache_path = quick.cache_path.as_deref().expect("checksum_in_cache implies cache path");
    let manifest = read_dir_manifest(cache_path)?;

    // All tracked children must match; the first mismatch decides.
    for child in manifest.contents.values() {
        let child_status = cache.status(&quick.work_path, child)?;
        if !child_status.contents_match {
            return Ok((status, Some(manifest)));
        }
    }

    // Any untracked file is a mismatch; an untracked directory only counts
    // when the artifact tracks recursively.
    let listing = fs::read_dir(&quick.work_path)
        .map_err(CacheError::io("read directory", quick.work_path.clone()))?;
    for entry in listing {
        let entry = entry.map_err(CacheError::io("read directory", quick.work_path.clone()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if manifest.contents.contains_key(&name) {
            continue;
        }
        let is_dir = entry
            .file_type()
            .map_err(CacheError::io("stat directory entry", entry.path()))?
            .is_dir();
        if !is_dir || art.is_recursive {
            return Ok((status, Some(manifest)));
        }
    }

    status.contents_match = true;
    Ok((status, Some(manifest)))
}

/// Load a directory manifest from its cache object.
pub(crate) fn read_dir_manifest(cache_path: &Path) -> CacheResult<DirectoryManifest> {
    let file = File::open(cache_path)
        .map_err(CacheError::io("open directory manifest", cache_path.to_path_buf()))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| CacheError::Manifest {
        path: cache_path.to_path_buf(),
        source,
    })
}
