//! Whole-file text backings for the registry and command history.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A place a component persists its full serialized state.
pub trait Storage: Send + 'static {
    /// Read the stored text. `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> io::Result<Option<String>>;

    /// Replace the stored text in one step.
    fn save(&self, contents: &str) -> io::Result<()>;

    /// Human-readable location, used in log lines.
    fn describe(&self) -> String;
}

/// File-backed storage with atomic replace (temp file + rename).
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "storage".into());
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

impl Storage for FileStorage {
    fn load(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, contents: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.temp_path();
        let mut temp_file = File::create(&temp_path)?;
        temp_file.write_all(contents.as_bytes())?;
        temp_file.sync_all()?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory storage. Clones share the same buffer, so a test can keep one
/// handle and inspect what the component wrote through the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    contents: Option<String>,
    saves: usize,
    fail_saves: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with `contents`.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        let storage = Self::default();
        storage.lock().contents = Some(contents.into());
        storage
    }

    /// Current stored text.
    pub fn contents(&self) -> Option<String> {
        self.lock().contents.clone()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    /// Make subsequent saves fail with a permission error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned buffer is still a valid buffer.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.lock().contents.clone())
    }

    fn save(&self, contents: &str) -> io::Result<()> {
        let mut state = self.lock();
        if state.fail_saves {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "memory storage is read-only",
            ));
        }
        state.contents = Some(contents.to_string());
        state.saves += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}
