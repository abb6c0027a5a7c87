use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use freight_artifact::{Artifact, ArtifactStatus};
use freight_cache::LocalCache;

use crate::error::{StageError, StageResult};

/// Status of every artifact in a stage, keyed by artifact path.
pub type StageStatus = BTreeMap<String, ArtifactStatus>;

/// A named unit of work: a command producing output artifacts from
/// dependency artifacts.
///
/// # Invariants
///
/// - No path appears in both `dependencies` and `outputs`.
/// - Artifact paths resolve relative to `working_dir`, which is itself
///   relative to the workspace root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Stage {
    /// Directory the command runs in, relative to the workspace root.
    #[serde(default)]
    pub working_dir: String,
    /// Shell command executed to produce the outputs. Opaque to the core.
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, Artifact>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Artifact>,
}

impl Stage {
    /// Load a stage from a YAML manifest or lock file.
    ///
    /// The second return value is `true` when `path` names a lock file
    /// rather than a source manifest, so callers can detect an
    /// accidentally-passed lock path.
    pub fn from_file(path: &Path) -> StageResult<(Self, bool)> {
        let is_lock = path.extension().is_some_and(|ext| ext == "lock");
        let contents =
            fs::read_to_string(path).map_err(StageError::io("read stage file", path))?;
        let mut stage: Stage =
            serde_yaml::from_str(&contents).map_err(|source| StageError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        stage.normalize();
        stage.validate()?;
        Ok((stage, is_lock))
    }

    /// Fill in artifact paths left empty in the manifest from their map
    /// keys, so `Outputs: {foo.bin: {}}` is enough to declare an output.
    pub fn normalize(&mut self) {
        for (path, art) in self.dependencies.iter_mut().chain(self.outputs.iter_mut()) {
            if art.path.is_empty() {
                art.path = path.clone();
            }
        }
    }

    /// Check the structural invariants of the stage and its artifacts.
    pub fn validate(&self) -> StageResult<()> {
        for path in self.dependencies.keys() {
            if self.outputs.contains_key(path) {
                return Err(StageError::PathInBothMaps(path.clone()));
            }
        }
        for art in self.dependencies.values().chain(self.outputs.values()) {
            art.validate()?;
        }
        Ok(())
    }

    /// Every artifact of the stage: dependencies, then outputs.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.dependencies.values().chain(self.outputs.values())
    }

    /// Compute the status of every artifact against `cache`, keyed by
    /// artifact path.
    pub fn status(&self, cache: &LocalCache, root_dir: &Path) -> StageResult<StageStatus> {
        let work_dir = root_dir.join(&self.working_dir);
        let mut status = StageStatus::new();
        for art in self.artifacts() {
            status.insert(art.path.clone(), cache.status(&work_dir, art)?);
        }
        Ok(status)
    }

    /// Serialize the stage as YAML (used for generated manifests and lock
    /// files).
    pub fn to_yaml(&self) -> StageResult<String> {
        serde_yaml::to_string(self).map_err(StageError::Serialize)
    }
}
