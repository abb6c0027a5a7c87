//! Lock files: committed snapshots of stages.
//!
//! A stage's lock file lives next to its manifest (`foo.yaml` has
//! `foo.yaml.lock`) and holds the stage with every artifact checksum
//! populated. A stage is "locked" when its lock file parses to a stage
//! equal to the in-memory one.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{StageError, StageResult};
use crate::stage::Stage;

/// The lock file path for a stage manifest: the same name with `.lock`
/// appended.
pub fn lock_path(stage_path: &Path) -> PathBuf {
    let mut name = OsString::from(stage_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Whether `path` names a lock file.
pub fn is_lock_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "lock")
}

/// Load the lock file for `stage_path`, or `None` if it does not exist.
pub fn read_lock(stage_path: &Path) -> StageResult<Option<Stage>> {
    let path = lock_path(stage_path);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StageError::io("read lock file", path)(e)),
    };
    let mut stage: Stage = serde_yaml::from_str(&contents)
        .map_err(|source| StageError::Yaml { path, source })?;
    stage.normalize();
    Ok(Some(stage))
}

/// Write the lock file for `stage_path` via temp file + atomic rename.
pub fn write_lock(stage: &Stage, stage_path: &Path) -> StageResult<()> {
    let path = lock_path(stage_path);
    let yaml = stage.to_yaml()?;
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut temp = tempfile::NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))
        .map_err(StageError::io("create lock temp file", path.clone()))?;
    temp.write_all(yaml.as_bytes())
        .map_err(StageError::io("write lock file", path.clone()))?;
    temp.persist(&path)
        .map_err(|e| StageError::io("persist lock file", path.clone())(e.error))?;
    Ok(())
}

/// Whether the on-disk lock file equals the in-memory stage exactly.
pub fn is_locked(stage: &Stage, stage_path: &Path) -> StageResult<bool> {
    Ok(read_lock(stage_path)?.as_ref() == Some(stage))
}
