//! Checkout: materialize cache objects in the workspace.

use std::fs;
use std::path::Path;

use tracing::warn;

use freight_artifact::{Artifact, Strategy};
use freight_fsutil::FileStatus;

use crate::error::{CacheError, CacheResult};
use crate::status::read_dir_manifest;
use crate::LocalCache;

pub(crate) fn checkout_file_artifact(
    cache: &LocalCache,
    working_dir: &Path,
    art: &Artifact,
    strategy: Strategy,
    force: bool,
) -> CacheResult<()> {
    let src = cache.path_for_checksum(&art.checksum)?;
    let dst = working_dir.join(&art.path);
    if !freight_fsutil::exists(&src, false).map_err(CacheError::io("stat cache object", src.clone()))? {
        return Err(CacheError::MissingCacheObject {
            path: dst,
            checksum: art.checksum.clone(),
        });
    }

    match freight_fsutil::file_status(&dst)
        .map_err(CacheError::io("stat checkout destination", dst.clone()))?
    {
        FileStatus::Absent => {}
        FileStatus::Directory => return Err(CacheError::DestinationExists(dst)),
        _ if force => {
            fs::remove_file(&dst).map_err(CacheError::io("remove destination", dst.clone()))?;
        }
        _ => return Err(CacheError::DestinationExists(dst)),
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .map_err(CacheError::io("create destination directory", parent.to_path_buf()))?;
    }

    match strategy {
        Strategy::Link => {
            let same_fs = freight_fsutil::same_filesystem(&src, &dst)
                .map_err(CacheError::io("checkout", dst.clone()))?;
            if same_fs {
                fs::hard_link(&src, &dst).map_err(CacheError::io("link", dst.clone()))?;
            } else {
                warn!(
                    path = %dst.display(),
                    "link strategy degraded to copy across filesystems"
                );
                fs::copy(&src, &dst).map_err(CacheError::io("copy", dst.clone()))?;
            }
        }
        Strategy::Copy => {
            fs::copy(&src, &dst).map_err(CacheError::io("copy", dst.clone()))?;
        }
    }
    Ok(())
}

pub(crate) fn checkout_dir_artifact(
    cache: &LocalCache,
    working_dir: &Path,
    art: &Artifact,
    strategy: Strategy,
    force: bool,
) -> CacheResult<()> {
    let src = cache.path_for_checksum(&art.checksum)?;
    let dst = working_dir.join(&art.path);
    if !freight_fsutil::exists(&src, false).map_err(CacheError::io("stat cache object", src.clone()))? {
        return Err(CacheError::MissingCacheObject {
            path: dst,
            checksum: art.checksum.clone(),
        });
    }
    let manifest = read_dir_manifest(&src)?;

    match freight_fsutil::file_status(&dst)
        .map_err(CacheError::io("stat checkout destination", dst.clone()))?
    {
        // Children perform their own destination checks inside an existing
        // directory.
        FileStatus::Absent | FileStatus::Directory => {}
        _ if force => {
            fs::remove_file(&dst).map_err(CacheError::io("remove destination", dst.clone()))?;
        }
        _ => return Err(CacheError::DestinationExists(dst)),
    }
    fs::create_dir_all(&dst).map_err(CacheError::io("create directory", dst.clone()))?;

    for child in manifest.contents.values() {
        cache.checkout(&dst, child, strategy, force)?;
    }
    Ok(())
}
