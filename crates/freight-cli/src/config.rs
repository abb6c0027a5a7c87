use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Project configuration, read from `.freight/config.yaml`.
///
/// Every key is optional; missing keys take the defaults below.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache root directory.
    pub cache: String,
    /// Remote spec handed to the sync tool for fetch/push.
    pub remote: Option<String>,
    /// Binary used to transfer cache objects.
    pub sync_tool: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: ".freight/cache".into(),
            remote: None,
            sync_tool: "rsync".into(),
        }
    }
}

impl Config {
    /// Load the configuration from `path`, or the defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("read config {}", path.display())),
        };
        serde_yaml::from_str(&contents)
            .with_context(|| format!("parse config {}", path.display()))
    }
}
