use serde::{Deserialize, Serialize};

use freight_fsutil::FileStatus;

/// Status of one artifact relative to the workspace and the cache.
///
/// `contents_match` is only meaningful when the rest of the tuple allows a
/// comparison; the [`Display`](std::fmt::Display) impl collapses the tuple
/// into one of a small closed set of phrases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStatus {
    /// Classification of the path in the workspace.
    pub workspace_file_status: FileStatus,
    /// The artifact's recorded checksum is syntactically valid.
    pub has_checksum: bool,
    /// A cache object exists for the recorded checksum.
    pub checksum_in_cache: bool,
    /// Workspace content equals the recorded content.
    pub contents_match: bool,
}

impl std::fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phrase = if !self.has_checksum {
            "uncommitted"
        } else if self.workspace_file_status == FileStatus::Absent {
            "missing from workspace"
        } else if !self.checksum_in_cache {
            "missing from cache"
        } else if self.contents_match {
            "up-to-date"
        } else {
            "modified"
        };
        write!(f, "{phrase}")
    }
}
