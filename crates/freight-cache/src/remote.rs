//! Fetch and push: synchronize cache objects with a remote through an
//! external copy tool.
//!
//! The core only enumerates the object paths to transfer; the transport
//! itself is the sync tool's business. Object paths are passed relative to
//! the cache root via a `--files-from` list so a single invocation moves a
//! whole batch.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use tracing::{debug, warn};

use freight_artifact::Artifact;

use crate::error::{CacheError, CacheResult};
use crate::status::read_dir_manifest;
use crate::LocalCache;

/// Upload every cache object reachable from `artifacts`.
///
/// Directory manifests are local, so the whole transitive set is
/// enumerated up front and shipped in one invocation.
pub(crate) fn push(
    cache: &LocalCache,
    remote: &str,
    sync_tool: &str,
    artifacts: &[Artifact],
) -> CacheResult<()> {
    let mut objects = BTreeSet::new();
    for art in artifacts {
        collect_objects(cache, art, &mut objects)?;
    }
    if objects.is_empty() {
        debug!("push: no cache objects to transfer");
        return Ok(());
    }
    let local = root_spec(cache.root());
    run_sync(sync_tool, &local, remote, &objects)
}

/// Download the cache objects for `artifacts` from the remote.
///
/// A directory artifact's children can only be enumerated once its
/// manifest is local, so fetch proceeds level by level: transfer the
/// current level's objects, then read the freshly fetched manifests to
/// discover the next level.
pub(crate) fn fetch(
    cache: &LocalCache,
    remote: &str,
    sync_tool: &str,
    artifacts: &[Artifact],
) -> CacheResult<()> {
    let local = root_spec(cache.root());
    let mut level: Vec<Artifact> = artifacts.to_vec();
    while !level.is_empty() {
        let mut objects = BTreeSet::new();
        for art in &level {
            if let Some(rel) = object_rel_path(art) {
                objects.insert(rel);
            }
        }
        if !objects.is_empty() {
            run_sync(sync_tool, remote, &local, &objects)?;
        }

        let mut next = Vec::new();
        for art in &level {
            if art.is_dir && art.has_checksum() {
                let manifest = read_dir_manifest(&cache.path_for_checksum(&art.checksum)?)?;
                next.extend(manifest.contents.into_values());
            }
        }
        level = next;
    }
    Ok(())
}

/// The transitive set of object paths (relative to the cache root)
/// reachable from `art`, following directory manifests.
fn collect_objects(
    cache: &LocalCache,
    art: &Artifact,
    out: &mut BTreeSet<String>,
) -> CacheResult<()> {
    let Some(rel) = object_rel_path(art) else {
        warn!(path = %art.path, "skipping artifact with no cache object");
        return Ok(());
    };
    out.insert(rel);
    if art.is_dir {
        let manifest = read_dir_manifest(&cache.path_for_checksum(&art.checksum)?)?;
        for child in manifest.contents.values() {
            collect_objects(cache, child, out)?;
        }
    }
    Ok(())
}

/// `<c[0:2]>/<c[2:64]>`, or `None` when the artifact has no cache object
/// (uncommitted, or committed with `skip_cache`).
fn object_rel_path(art: &Artifact) -> Option<String> {
    if !art.has_checksum() || art.skip_cache {
        return None;
    }
    Some(format!("{}/{}", &art.checksum[..2], &art.checksum[2..]))
}

fn root_spec(root: &Path) -> String {
    root.display().to_string()
}

fn run_sync(tool: &str, src: &str, dst: &str, objects: &BTreeSet<String>) -> CacheResult<()> {
    let mut list = String::new();
    for rel in objects {
        list.push_str(rel);
        list.push('\n');
    }
    let mut files_from = tempfile::NamedTempFile::new().map_err(|e| CacheError::SyncTool {
        tool: tool.to_string(),
        message: format!("failed to create transfer list: {e}"),
    })?;
    files_from
        .write_all(list.as_bytes())
        .map_err(|e| CacheError::SyncTool {
            tool: tool.to_string(),
            message: format!("failed to write transfer list: {e}"),
        })?;

    debug!(tool, src, dst, objects = objects.len(), "invoking sync tool");
    let output = Command::new(tool)
        .arg("--archive")
        .arg("--files-from")
        .arg(files_from.path())
        .arg(format!("{src}/"))
        .arg(format!("{dst}/"))
        .output()
        .map_err(|e| CacheError::SyncTool {
            tool: tool.to_string(),
            message: format!("failed to run: {e}"),
        })?;
    if !output.status.success() {
        return Err(CacheError::SyncTool {
            tool: tool.to_string(),
            message: command_summary(&output),
        });
    }
    Ok(())
}

/// The most useful single line from a failed command: stderr, stdout, or
/// the exit status.
fn command_summary(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if !stdout.is_empty() {
        return stdout;
    }
    format!("exited with {}", out.status)
}
