//! Upload engine configuration.

use std::time::Duration;

use biofile_transfer::NasShortcutConfig;
use serde::{Deserialize, Serialize};

fn default_chunk_workers() -> usize {
    4
}

fn default_nas_poll_interval_ms() -> u64 {
    2_000
}

/// Tunables for the upload orchestrator. Defaults work without any
/// config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploaderConfig {
    /// Fixed worker-pool size for chunk dispatch. Bounds both the number
    /// of chunk sends in flight and the bytes buffered in memory.
    #[serde(default = "default_chunk_workers")]
    pub chunk_workers: usize,
    /// Poll interval while waiting for the backend to ingest a NAS
    /// shortcut upload.
    #[serde(default = "default_nas_poll_interval_ms")]
    pub nas_poll_interval_ms: u64,
    /// Network mounts eligible for the NAS shortcut path.
    #[serde(default)]
    pub nas: NasShortcutConfig,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_workers: default_chunk_workers(),
            nas_poll_interval_ms: default_nas_poll_interval_ms(),
            nas: NasShortcutConfig::default(),
        }
    }
}

impl UploaderConfig {
    pub fn nas_poll_interval(&self) -> Duration {
        Duration::from_millis(self.nas_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = UploaderConfig::default();
        assert_eq!(config.chunk_workers, 4);
        assert_eq!(config.nas_poll_interval(), Duration::from_millis(2_000));
        assert!(!config.nas.mount_prefixes.is_empty());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: UploaderConfig = serde_json::from_str(r#"{"chunkWorkers": 8}"#).unwrap();
        assert_eq!(config.chunk_workers, 8);
        assert_eq!(config.nas_poll_interval_ms, 2_000);
    }

    #[test]
    fn json_roundtrip() {
        let config = UploaderConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: UploaderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
