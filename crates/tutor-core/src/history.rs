use tracing::{debug, warn};

use crate::storage::{FileStorage, MemoryStorage, Storage};

/// Maximum number of entries retained by default.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Persisted log of submitted input lines with up/down navigation.
///
/// Navigation only moves a cursor over the committed entries; the entries
/// themselves change only through [`CommandHistory::add`].
pub struct CommandHistory {
    entries: Vec<String>,
    max_entries: usize,
    /// `None` while not navigating.
    index: Option<usize>,
    /// Input that was in the editor when navigation started.
    draft: String,
    storage: Box<dyn Storage>,
}

impl CommandHistory {
    pub fn load(storage: impl Storage, max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        let mut entries: Vec<String> = match storage.load() {
            Ok(Some(text)) => text.lines().map(str::to_string).collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(path = %storage.describe(), error = %e, "Unreadable command history, starting empty");
                Vec::new()
            }
        };
        trim_front(&mut entries, max_entries);
        debug!(path = %storage.describe(), entries = entries.len(), "Loaded command history");

        Self {
            entries,
            max_entries,
            index: None,
            draft: String::new(),
            storage: Box::new(storage),
        }
    }

    pub fn open(path: impl Into<std::path::PathBuf>, max_entries: usize) -> Self {
        Self::load(FileStorage::new(path), max_entries)
    }

    pub fn in_memory() -> Self {
        Self::load(MemoryStorage::new(), DEFAULT_MAX_ENTRIES)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_navigating(&self) -> bool {
        self.index.is_some()
    }

    /// Record a submitted line. Blank lines are ignored entirely; a repeat of
    /// the last entry is not stored but still resets navigation.
    pub fn add(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if self.entries.last().map(String::as_str) != Some(line) {
            self.entries.push(line.to_string());
            trim_front(&mut self.entries, self.max_entries);
            self.save();
        }
        self.reset_navigation();
    }

    pub fn reset_navigation(&mut self) {
        self.index = None;
        self.draft.clear();
    }

    /// Step to the previous entry. The first step saves `current` as the draft.
    pub fn navigate_up(&mut self, current: &str) -> String {
        if self.entries.is_empty() {
            return current.to_string();
        }
        let index = match self.index {
            None => {
                self.draft = current.to_string();
                self.entries.len() - 1
            }
            Some(i) => i.saturating_sub(1),
        };
        self.index = Some(index);
        self.entries[index].clone()
    }

    /// Step to the next entry, or restore the draft when stepping past the newest.
    pub fn navigate_down(&mut self, current: &str) -> String {
        match self.index {
            None => current.to_string(),
            Some(i) if i + 1 < self.entries.len() => {
                self.index = Some(i + 1);
                self.entries[i + 1].clone()
            }
            Some(_) => {
                self.index = None;
                std::mem::take(&mut self.draft)
            }
        }
    }

    fn save(&self) {
        if let Err(e) = self.storage.save(&self.entries.join("\n")) {
            warn!(path = %self.storage.describe(), error = %e, "Failed to save command history");
        }
    }
}

fn trim_front(entries: &mut Vec<String>, max: usize) {
    if entries.len() > max {
        let excess = entries.len() - max;
        entries.drain(..excess);
    }
}
