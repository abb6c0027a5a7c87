use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use freight_artifact::Strategy;
use freight_cache::LocalCache;
use freight_stage::{lock, Stage, StageStatus};

use crate::entry::IndexEntry;
use crate::error::{IndexError, IndexResult};

/// Status of every visited stage, keyed by stage path.
pub type IndexStatus = BTreeMap<String, StageStatus>;

/// The set of indexed stages, keyed by stage manifest path relative to the
/// workspace root.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by stage path.
    pub fn get(&self, stage_path: &str) -> Option<&IndexEntry> {
        self.entries.get(stage_path)
    }

    /// All stage paths in the index, in sorted order.
    pub fn stage_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    // ---------------------------------------------------------------
    // Add / remove
    // ---------------------------------------------------------------

    /// Load the stage manifests at `paths` and add them to the index.
    ///
    /// Fails if a path is already indexed, names a lock file, fails to
    /// parse, or declares an output already owned by another indexed stage.
    pub fn add_stages_from_paths<I, S>(&mut self, root_dir: &Path, paths: I) -> IndexResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            let path = path.as_ref();
            if self.entries.contains_key(path) {
                return Err(IndexError::AlreadyIndexed(path.to_string()));
            }
            let (stage, is_lock) = Stage::from_file(&root_dir.join(path))?;
            if is_lock {
                return Err(IndexError::IsLockFile(path.to_string()));
            }

            for out in stage.outputs.values() {
                let abs = Path::new(&stage.working_dir).join(&out.path);
                if let Some(owner) = self.owner_of(&abs) {
                    return Err(IndexError::OwnershipConflict {
                        stage: path.to_string(),
                        artifact: abs.display().to_string(),
                        owner,
                    });
                }
            }

            debug!(stage = path, "adding stage to index");
            self.entries.insert(path.to_string(), IndexEntry::new(stage));
        }
        Ok(())
    }

    /// Drop a stage from the index. Does not touch any files.
    pub fn remove(&mut self, stage_path: &str) -> IndexResult<IndexEntry> {
        self.entries
            .remove(stage_path)
            .ok_or_else(|| IndexError::UnknownStage(stage_path.to_string()))
    }

    /// The stage path owning the output at working-dir-joined path `abs`,
    /// if any.
    fn owner_of(&self, abs: &Path) -> Option<String> {
        self.entries.iter().find_map(|(path, entry)| {
            let owns = entry.stage.outputs.values().any(|out| {
                Path::new(&entry.stage.working_dir).join(&out.path) == abs
            });
            owns.then(|| path.clone())
        })
    }

    fn entry(&self, stage_path: &str) -> IndexResult<&IndexEntry> {
        self.entries
            .get(stage_path)
            .ok_or_else(|| IndexError::UnknownStage(stage_path.to_string()))
    }

    // ---------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------

    /// Compute the status of `stage_path` and, recursively, of every stage
    /// owning one of its dependencies.
    ///
    /// `out` doubles as the memo: a stage already present is not revisited,
    /// so a diamond-shaped DAG computes each stage once. `in_progress`
    /// tracks the active recursion for cycle detection.
    pub fn status(
        &mut self,
        stage_path: &str,
        cache: &LocalCache,
        root_dir: &Path,
        out: &mut IndexStatus,
        in_progress: &mut HashSet<String>,
    ) -> IndexResult<()> {
        if out.contains_key(stage_path) {
            return Ok(());
        }
        let stage = self.entry(stage_path)?.stage.clone();
        if !in_progress.insert(stage_path.to_string()) {
            return Err(IndexError::Cycle(stage_path.to_string()));
        }

        for dep in stage.dependencies.values() {
            let abs = Path::new(&stage.working_dir).join(&dep.path);
            if let Some(owner) = self.owner_of(&abs) {
                self.status(&owner, cache, root_dir, out, in_progress)?;
            }
        }

        debug!(stage = stage_path, "computing stage status");
        let stage_status = stage.status(cache, root_dir)?;
        let is_locked = lock::is_locked(&stage, &root_dir.join(stage_path))?;
        if let Some(entry) = self.entries.get_mut(stage_path) {
            entry.is_locked = is_locked;
        }
        out.insert(stage_path.to_string(), stage_status);
        in_progress.remove(stage_path);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Commit
    // ---------------------------------------------------------------

    /// Commit `stage_path` and everything it depends on, dependencies
    /// before dependents.
    ///
    /// On each visit: dependencies owned by other stages are committed
    /// first and their checksums propagated into this stage's dependency
    /// records; unowned (source data) dependencies are committed directly;
    /// outputs whose contents don't match the cache are committed; finally
    /// the lock file is written. `committed` records the completed stages
    /// in commit order.
    pub fn commit(
        &mut self,
        stage_path: &str,
        cache: &LocalCache,
        root_dir: &Path,
        strategy: Strategy,
        committed: &mut Vec<String>,
        in_progress: &mut HashSet<String>,
    ) -> IndexResult<()> {
        if committed.iter().any(|p| p == stage_path) {
            return Ok(());
        }
        let mut stage = self.entry(stage_path)?.stage.clone();
        if !in_progress.insert(stage_path.to_string()) {
            return Err(IndexError::Cycle(stage_path.to_string()));
        }
        let work_dir = root_dir.join(&stage.working_dir);

        for dep in stage.dependencies.values_mut() {
            let abs = Path::new(&stage.working_dir).join(&dep.path);
            match self.owner_of(&abs) {
                Some(owner) => {
                    self.commit(&owner, cache, root_dir, strategy, committed, in_progress)?;
                    self.propagate_checksum(&owner, &abs, dep);
                }
                // A source-data dependency has no producing stage; cache it
                // here so the pipeline input is reproducible.
                None => cache.commit(&work_dir, dep, strategy)?,
            }
        }

        for out in stage.outputs.values_mut() {
            let status = cache.status(&work_dir, out)?;
            if !status.contents_match {
                cache.commit(&work_dir, out, strategy)?;
            }
        }

        lock::write_lock(&stage, &root_dir.join(stage_path))?;
        debug!(stage = stage_path, "committed stage");
        if let Some(entry) = self.entries.get_mut(stage_path) {
            entry.stage = stage;
            entry.is_locked = true;
        }
        committed.push(stage_path.to_string());
        in_progress.remove(stage_path);
        Ok(())
    }

    /// Copy the committed checksum of the owner's output at `abs` into the
    /// dependent stage's dependency record.
    fn propagate_checksum(&self, owner: &str, abs: &Path, dep: &mut freight_artifact::Artifact) {
        let Some(entry) = self.entries.get(owner) else {
            return;
        };
        let working_dir = Path::new(&entry.stage.working_dir);
        if let Some(out) = entry
            .stage
            .outputs
            .values()
            .find(|out| working_dir.join(&out.path) == abs)
        {
            dep.checksum = out.checksum.clone();
            dep.is_dir = out.is_dir;
            dep.is_recursive = out.is_recursive;
            dep.skip_cache = out.skip_cache;
        }
    }

    // ---------------------------------------------------------------
    // Checkout
    // ---------------------------------------------------------------

    /// Materialize `stage_path`'s artifacts from the cache, dependencies
    /// first.
    ///
    /// Artifacts whose workspace contents already match are left alone;
    /// everything else is checked out with `strategy`.
    pub fn checkout(
        &mut self,
        stage_path: &str,
        cache: &LocalCache,
        root_dir: &Path,
        strategy: Strategy,
        done: &mut Vec<String>,
        in_progress: &mut HashSet<String>,
    ) -> IndexResult<()> {
        if done.iter().any(|p| p == stage_path) {
            return Ok(());
        }
        let stage = self.entry(stage_path)?.stage.clone();
        if !in_progress.insert(stage_path.to_string()) {
            return Err(IndexError::Cycle(stage_path.to_string()));
        }
        let work_dir = root_dir.join(&stage.working_dir);

        for dep in stage.dependencies.values() {
            let abs = Path::new(&stage.working_dir).join(&dep.path);
            match self.owner_of(&abs) {
                Some(owner) => {
                    self.checkout(&owner, cache, root_dir, strategy, done, in_progress)?;
                }
                None => checkout_if_needed(cache, &work_dir, dep, strategy)?,
            }
        }
        for out in stage.outputs.values() {
            checkout_if_needed(cache, &work_dir, out, strategy)?;
        }

        debug!(stage = stage_path, "checked out stage");
        done.push(stage_path.to_string());
        in_progress.remove(stage_path);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------

    /// Load an index from `path`; a missing file yields an empty index.
    pub fn load(path: &Path) -> IndexResult<Self> {
        let contents = match fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(IndexError::io("read index", path)(e)),
        };
        serde_json::from_slice(&contents).map_err(|source| IndexError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist the index to `path` via temp file + atomic rename.
    pub fn save(&self, path: &Path) -> IndexResult<()> {
        let json = serde_json::to_vec(self).map_err(|source| IndexError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(IndexError::io("create index temp file", path))?;
        temp.write_all(&json)
            .map_err(IndexError::io("write index", path))?;
        temp.persist(path)
            .map_err(|e| IndexError::io("persist index", path)(e.error))?;
        Ok(())
    }
}

/// Checkout `art` unless the workspace already matches the cache.
fn checkout_if_needed(
    cache: &LocalCache,
    work_dir: &Path,
    art: &freight_artifact::Artifact,
    strategy: Strategy,
) -> IndexResult<()> {
    let status = cache.status(work_dir, art)?;
    if status.contents_match {
        return Ok(());
    }
    cache.checkout(work_dir, art, strategy, false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index() {
        let idx = Index::new();
        assert!(idx.is_empty());
        assert_eq!(idx.len(), 0);
    }

    #[test]
    fn remove_unknown_stage_errors() {
        let mut idx = Index::new();
        let err = idx.remove("ghost.yaml").unwrap_err();
        assert!(matches!(err, IndexError::UnknownStage(_)));
    }

    #[test]
    fn serializes_as_a_plain_map() {
        let mut idx = Index::new();
        idx.entries
            .insert("train.yaml".into(), IndexEntry::new(Stage::default()));
        let value = serde_json::to_value(&idx).unwrap();
        let entry = value.get("train.yaml").expect("keyed by stage path");
        assert!(entry.get("Stage").is_some());
        assert!(entry.get("IsLocked").is_some());
    }
}
