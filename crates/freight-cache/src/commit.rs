//! Commit: checksum workspace content into the cache.
//!
//! File commits stream bytes through the hasher into a temp object and
//! atomically rename it into place. Directory commits fan the children out
//! over a bounded worker pool, reusing the old manifest to skip unchanged
//! entries, then commit the new manifest as an ordinary cache object.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tracing::debug;

use freight_artifact::{Artifact, DirectoryManifest, Strategy};
use freight_digest::HashingReader;
use freight_fsutil::FileStatus;

use crate::error::{CacheError, CacheResult};
use crate::status::{dir_artifact_status, quick_status};
use crate::LocalCache;

/// Size of the directory-commit worker pool. Trades syscall parallelism
/// against open-file-descriptor pressure; not load-bearing.
const NUM_WORKERS: usize = 20;

pub(crate) fn commit_file_artifact(
    cache: &LocalCache,
    working_dir: &Path,
    art: &mut Artifact,
    strategy: Strategy,
) -> CacheResult<()> {
    // The artifact likely carries a stale or empty checksum, so the cache
    // path from the quick status is ignored.
    let quick = quick_status(cache, working_dir, art)?;
    let work_path = quick.work_path;

    if quick.status.workspace_file_status == FileStatus::Absent {
        return Err(CacheError::NotInWorkspace(work_path));
    }
    if quick.status.contents_match {
        return Ok(());
    }
    if quick.status.workspace_file_status != FileStatus::RegularFile {
        return Err(CacheError::NotARegularFile(work_path));
    }

    let src = File::open(&work_path)
        .map_err(CacheError::io("commit file", work_path.clone()))?;

    if art.skip_cache {
        // Checksum only; the bytes never enter the cache.
        art.checksum = freight_digest::checksum(src, 0)
            .map_err(CacheError::io("commit file", work_path.clone()))?;
        return Ok(());
    }

    let same_fs = freight_fsutil::same_filesystem(&work_path, cache.root())
        .map_err(CacheError::io("commit file", work_path.clone()))?;

    // When the workspace shares a filesystem with the cache and the caller
    // wants links anyway, the file can be moved into the cache after
    // checksumming instead of being copied.
    let move_file = (same_fs && strategy == Strategy::Link).then(|| work_path.clone());

    art.checksum = commit_bytes(cache, src, move_file.as_deref())?;
    debug!(path = %work_path.display(), checksum = %art.checksum, "committed file artifact");

    // With the copy strategy the original workspace file still exists, so
    // there is nothing left to materialize.
    if strategy == Strategy::Link {
        if freight_fsutil::exists(&work_path, false)
            .map_err(CacheError::io("commit file", work_path.clone()))?
        {
            fs::remove_file(&work_path)
                .map_err(CacheError::io("commit file", work_path.clone()))?;
        }
        return cache.checkout(working_dir, art, strategy, false);
    }
    Ok(())
}

/// Checksum `reader` and end with those bytes present in the cache.
///
/// With `move_file`, the named workspace file is renamed into the cache
/// after checksumming, eliminating a redundant copy. Otherwise the bytes
/// are teed into a temp file inside the cache root while hashing, and the
/// temp file is atomically renamed to the object path.
pub(crate) fn commit_bytes<R: Read>(
    cache: &LocalCache,
    reader: R,
    move_file: Option<&Path>,
) -> CacheResult<String> {
    match move_file {
        Some(src) => {
            let cksum = freight_digest::checksum(reader, 0)
                .map_err(CacheError::io("checksum", src.to_path_buf()))?;
            let cache_path = cache.path_for_checksum(&cksum)?;
            ensure_parent(&cache_path)?;
            fs::rename(src, &cache_path)
                .map_err(CacheError::io("move into cache", src.to_path_buf()))?;
            set_readonly(&cache_path)?;
            Ok(cksum)
        }
        None => {
            let temp = tempfile::Builder::new()
                .tempfile_in(cache.root())
                .map_err(CacheError::io("create temp object", cache.root().to_path_buf()))?;
            let (file, temp_path) = temp.into_parts();

            let mut reader = HashingReader::new(reader);
            let mut writer = BufWriter::new(file);
            io::copy(&mut reader, &mut writer)
                .map_err(CacheError::io("write temp object", temp_path.to_path_buf()))?;
            writer
                .flush()
                .map_err(CacheError::io("write temp object", temp_path.to_path_buf()))?;
            drop(writer);

            let cksum = reader.finalize();
            let cache_path = cache.path_for_checksum(&cksum)?;
            ensure_parent(&cache_path)?;
            match temp_path.persist_noclobber(&cache_path) {
                Ok(()) => set_readonly(&cache_path)?,
                // Another commit of the same content got there first; the
                // object is identical by construction.
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(CacheError::io("persist cache object", cache_path)(e.error));
                }
            }
            Ok(cksum)
        }
    }
}

fn ensure_parent(path: &Path) -> CacheResult<()> {
    let parent = path.parent().expect("cache object path has a parent");
    fs::create_dir_all(parent).map_err(CacheError::io("create cache directory", parent.to_path_buf()))
}

fn set_readonly(path: &Path) -> CacheResult<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o444))
        .map_err(CacheError::io("chmod cache object", path.to_path_buf()))
}

/// Record the first error and cancel the group; later errors are discarded.
fn record_error(slot: &Mutex<Option<CacheError>>, cancelled: &AtomicBool, err: CacheError) {
    cancelled.store(true, Ordering::Relaxed);
    let mut slot = slot.lock().expect("lock poisoned");
    if slot.is_none() {
        *slot = Some(err);
    }
}

pub(crate) fn commit_dir_artifact(
    cache: &LocalCache,
    working_dir: &Path,
    art: &mut Artifact,
    strategy: Strategy,
) -> CacheResult<()> {
    let (status, old_manifest) = dir_artifact_status(cache, working_dir, art)?;
    if status.contents_match {
        return Ok(());
    }

    let base_dir = working_dir.join(&art.path);
    match status.workspace_file_status {
        FileStatus::Directory => {}
        FileStatus::Absent => return Err(CacheError::NotInWorkspace(base_dir)),
        _ => return Err(CacheError::NotADirectory(base_dir)),
    }

    let old_contents = old_manifest.map(|m| m.contents).unwrap_or_default();
    let is_recursive = art.is_recursive;

    let cancelled = AtomicBool::new(false);
    let first_error: Mutex<Option<CacheError>> = Mutex::new(None);

    // Producer / worker-pool / collector over bounded channels. The
    // producer feeds directory entries to a fixed pool of workers; each
    // worker commits its child (recursing for subdirectories) and emits
    // the resulting artifact; the collector assembles the new manifest.
    let contents = thread::scope(|scope| {
        let (entry_tx, entry_rx) = mpsc::sync_channel::<(String, bool)>(NUM_WORKERS);
        let entry_rx = Arc::new(Mutex::new(entry_rx));
        let (child_tx, child_rx) = mpsc::channel::<Artifact>();

        {
            let base_dir = base_dir.clone();
            let cancelled = &cancelled;
            let first_error = &first_error;
            scope.spawn(move || {
                let listing = match fs::read_dir(&base_dir) {
                    Ok(listing) => listing,
                    Err(e) => {
                        let err = CacheError::io("read directory", base_dir.clone())(e);
                        record_error(first_error, cancelled, err);
                        return;
                    }
                };
                for entry in listing {
                    if cancelled.load(Ordering::Relaxed) {
                        return;
                    }
                    let (name, is_dir) = match entry.and_then(|e| {
                        let is_dir = e.file_type()?.is_dir();
                        Ok((e.file_name().to_string_lossy().into_owned(), is_dir))
                    }) {
                        Ok(pair) => pair,
                        Err(e) => {
                            let err = CacheError::io("read directory", base_dir.clone())(e);
                            record_error(first_error, cancelled, err);
                            return;
                        }
                    };
                    // A send error means every worker has exited.
                    if entry_tx.send((name, is_dir)).is_err() {
                        return;
                    }
                }
            });
        }

        for _ in 0..NUM_WORKERS {
            let entry_rx = Arc::clone(&entry_rx);
            let child_tx = child_tx.clone();
            let base_dir = &base_dir;
            let old_contents = &old_contents;
            let cancelled = &cancelled;
            let first_error = &first_error;
            scope.spawn(move || {
                loop {
                    if cancelled.load(Ordering::Relaxed) {
                        return;
                    }
                    let received = entry_rx.lock().expect("lock poisoned").recv();
                    let (name, entry_is_dir) = match received {
                        Ok(pair) => pair,
                        Err(_) => return, // producer done, channel drained
                    };

                    // Recover the child from the old manifest when possible
                    // so an unchanged child's own status check short-circuits
                    // its commit.
                    let mut child = old_contents
                        .get(&name)
                        .cloned()
                        .unwrap_or_else(|| Artifact::new_file(name.clone()));

                    let result = if entry_is_dir {
                        if !is_recursive {
                            continue;
                        }
                        child.is_dir = true;
                        child.is_recursive = true;
                        commit_dir_artifact(cache, base_dir, &mut child, strategy)
                    } else {
                        commit_file_artifact(cache, base_dir, &mut child, strategy)
                    };

                    match result {
                        Ok(()) => {
                            if child_tx.send(child).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            record_error(first_error, cancelled, e);
                            return;
                        }
                    }
                }
            });
        }
        drop(child_tx);

        let mut contents = BTreeMap::new();
        for child in child_rx {
            contents.insert(child.path.clone(), child);
        }
        contents
    });

    if let Some(err) = first_error.into_inner().expect("lock poisoned") {
        return Err(err);
    }

    let manifest = DirectoryManifest {
        path: base_dir.display().to_string(),
        contents,
    };
    let bytes = manifest.to_canonical_json().map_err(|source| CacheError::Manifest {
        path: base_dir.clone(),
        source,
    })?;
    art.checksum = commit_bytes(cache, Cursor::new(bytes), None)?;
    debug!(path = %base_dir.display(), checksum = %art.checksum, "committed directory artifact");
    Ok(())
}
