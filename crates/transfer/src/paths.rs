use serde::{Deserialize, Serialize};

/// Normalizes a path for comparison across client OS conventions.
///
/// Backslashes become forward slashes, a UNC-style run of leading slashes
/// collapses to a single one, and the whole path is lower-cased, so the
/// same network share is recognized identically no matter which machine
/// produced the path.
pub fn posix_path(path: &str) -> String {
    let lowered = path.replace('\\', "/").to_lowercase();
    if let Some(rest) = lowered.strip_prefix('/') {
        format!("/{}", rest.trim_start_matches('/'))
    } else {
        lowered
    }
}

/// Network mounts the storage backend can read directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NasShortcutConfig {
    /// Normalized mount prefixes, e.g. `/allen/`.
    pub mount_prefixes: Vec<String>,
}

impl Default for NasShortcutConfig {
    fn default() -> Self {
        Self {
            mount_prefixes: vec!["/allen/".to_string()],
        }
    }
}

impl NasShortcutConfig {
    /// Returns `true` iff `path` lives under a configured mount, meaning
    /// the backend can ingest the file itself instead of receiving
    /// streamed bytes.
    pub fn should_be_local_nas_upload(&self, path: &str) -> bool {
        let normalized = posix_path(path);
        self.mount_prefixes
            .iter()
            .any(|prefix| normalized.starts_with(&posix_path(prefix)))
    }
}
