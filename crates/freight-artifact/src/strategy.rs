use serde::{Deserialize, Serialize};

/// How a cache object is materialized in the workspace.
///
/// `Link` hard-links when the workspace and cache share a filesystem and
/// degrades to a copy otherwise; `Copy` always copies bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    #[default]
    Link,
    Copy,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Link => write!(f, "link"),
            Self::Copy => write!(f, "copy"),
        }
    }
}
