use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;

use tutor_core::config::AppConfig;
use tutor_core::registry::Registry;

/// In-memory registry with `entries` added in order, all enabled.
pub fn registry_with(entries: &[(&str, Value)]) -> Registry {
    let mut registry = Registry::in_memory();
    for (name, config) in entries {
        let config = config.as_object().cloned().unwrap_or_default();
        registry.add(name, config).unwrap();
    }
    registry
}

/// Temporary data directory with a config pointing into it.
pub struct TempData {
    dir: TempDir,
}

impl TempData {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    /// Default config with `paths.data_dir` set to this directory.
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.paths.data_dir = self.dir.path().display().to_string();
        config
    }

    /// Write `contents` to `file` under the directory and return its path.
    pub fn write(&self, file: &str, contents: &str) -> PathBuf {
        let path = self.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }
}

impl Default for TempData {
    fn default() -> Self {
        Self::new()
    }
}
