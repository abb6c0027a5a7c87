use serde::{Deserialize, Serialize};

use freight_stage::Stage;

/// One indexed stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexEntry {
    pub stage: Stage,
    /// Whether the on-disk lock file equals the in-memory stage.
    pub is_locked: bool,
}

impl IndexEntry {
    /// A fresh, unlocked entry for `stage`.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            is_locked: false,
        }
    }
}
