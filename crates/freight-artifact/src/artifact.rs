use serde::{Deserialize, Serialize};

use crate::error::{ArtifactError, ArtifactResult};

/// A tracked file or directory tree.
///
/// `path` is relative to the enclosing stage's working directory, or, for
/// children inside a directory artifact, relative to the parent artifact.
/// `checksum` is the lowercase hex blake2b-256 digest of the content, empty
/// until the artifact is committed.
///
/// # Invariants
///
/// - `is_recursive` is only meaningful when `is_dir` is set.
/// - `skip_cache` artifacts are checksummed but never copied into the cache;
///   directory artifacts must cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Artifact {
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub is_recursive: bool,
    #[serde(default)]
    pub skip_cache: bool,
}

impl Artifact {
    /// A plain file artifact with no recorded checksum.
    pub fn new_file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// A directory artifact. `recursive` tracks subdirectories as nested
    /// directory artifacts; otherwise only immediate regular files count.
    pub fn new_dir(path: impl Into<String>, recursive: bool) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            is_recursive: recursive,
            ..Default::default()
        }
    }

    /// Check the structural invariants.
    pub fn validate(&self) -> ArtifactResult<()> {
        if self.is_recursive && !self.is_dir {
            return Err(ArtifactError::RecursiveNonDir(self.path.clone()));
        }
        if self.skip_cache && self.is_dir {
            return Err(ArtifactError::SkipCacheDir(self.path.clone()));
        }
        Ok(())
    }

    /// Whether the recorded checksum is syntactically valid.
    pub fn has_checksum(&self) -> bool {
        freight_digest::is_valid(&self.checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_field_names_are_pascal_case() {
        let art = Artifact {
            checksum: "ab".repeat(32),
            path: "data.bin".into(),
            is_dir: false,
            is_recursive: false,
            skip_cache: true,
        };
        let json = serde_json::to_value(&art).unwrap();
        assert!(json.get("Checksum").is_some());
        assert!(json.get("Path").is_some());
        assert!(json.get("IsDir").is_some());
        assert!(json.get("IsRecursive").is_some());
        assert!(json.get("SkipCache").is_some());
    }

    #[test]
    fn missing_fields_default() {
        let art: Artifact = serde_json::from_str(r#"{"Path": "out.txt"}"#).unwrap();
        assert_eq!(art.path, "out.txt");
        assert!(art.checksum.is_empty());
        assert!(!art.is_dir);
        assert!(!art.skip_cache);
    }

    #[test]
    fn recursive_requires_dir() {
        let art = Artifact {
            path: "x".into(),
            is_recursive: true,
            ..Default::default()
        };
        assert_eq!(
            art.validate(),
            Err(ArtifactError::RecursiveNonDir("x".into()))
        );
    }

    #[test]
    fn skip_cache_rejects_dir() {
        let art = Artifact {
            path: "d".into(),
            is_dir: true,
            skip_cache: true,
            ..Default::default()
        };
        assert_eq!(art.validate(), Err(ArtifactError::SkipCacheDir("d".into())));
    }

    #[test]
    fn has_checksum_requires_valid_hex() {
        let mut art = Artifact::new_file("f");
        assert!(!art.has_checksum());
        art.checksum = "zz".repeat(32);
        assert!(!art.has_checksum());
        art.checksum = "0e".repeat(32);
        assert!(art.has_checksum());
    }
}
