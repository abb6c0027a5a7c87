use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

/// Persisted record of a directory artifact's contents, stored in the cache
/// at the parent artifact's checksum.
///
/// `contents` maps child filename to child artifact; children may themselves
/// be directories when the parent is recursive. A `BTreeMap` keeps the keys
/// in lexicographic order so the serialized form (and therefore the
/// directory's checksum) is reproducible.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectoryManifest {
    /// The base directory this manifest was built from. Informational.
    pub path: String,
    pub contents: BTreeMap<String, Artifact>,
}

impl DirectoryManifest {
    /// An empty manifest for `base_dir`.
    pub fn new(base_dir: impl Into<String>) -> Self {
        Self {
            path: base_dir.into(),
            contents: BTreeMap::new(),
        }
    }

    /// Canonical serialized form: compact JSON with lexicographically
    /// ordered `Contents` keys.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a manifest from its serialized form.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
