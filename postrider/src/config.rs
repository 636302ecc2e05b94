use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where accepted messages are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoolConfig {
    /// Directory the spool lives in. Created on startup if missing.
    #[serde(default = "defaults::path")]
    pub path: PathBuf,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            path: defaults::path(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub(super) fn path() -> PathBuf {
        PathBuf::from("./spool")
    }
}
