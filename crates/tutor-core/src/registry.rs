//! Persistent MCP server registry.
//!
//! The whole registry is written back to its [`Storage`] after every
//! mutation. A missing or unreadable backing file loads as an empty registry.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Result, TutorError};
use crate::expand;
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::types::ServerEntry;

pub const REGISTRY_VERSION: u32 = 1;

/// On-disk shape: `{ "version": 1, "servers": { name: { enabled, config } } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    servers: IndexMap<String, StoredServer>,
}

/// One stored entry. Malformed fields fall back per entry (`enabled` to
/// true, `config` to empty) so one bad entry never drops the rest.
#[derive(Debug, Clone, Serialize)]
struct StoredServer {
    enabled: bool,
    config: Map<String, Value>,
}

impl<'de> Deserialize<'de> for StoredServer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let enabled = raw.get("enabled").and_then(Value::as_bool).unwrap_or(true);
        let config = match raw.get("config") {
            Some(Value::Object(config)) => config.clone(),
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                warn!(config = %other, "Ignoring non-object MCP server config");
                Map::new()
            }
        };
        Ok(Self { enabled, config })
    }
}

fn default_version() -> u32 { REGISTRY_VERSION }

/// Named MCP server configurations with enable flags.
pub struct Registry {
    version: u32,
    servers: IndexMap<String, StoredServer>,
    storage: Box<dyn Storage>,
    last_persist_error: Option<String>,
}

impl Registry {
    /// Load from `storage`, falling back to an empty registry on any failure.
    pub fn load(storage: impl Storage) -> Self {
        let file = match storage.load() {
            Ok(Some(text)) => match serde_json::from_str::<RegistryFile>(&text) {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %storage.describe(), error = %e, "Corrupt MCP registry, starting empty");
                    RegistryFile::empty()
                }
            },
            Ok(None) => RegistryFile::empty(),
            Err(e) => {
                warn!(path = %storage.describe(), error = %e, "Unreadable MCP registry, starting empty");
                RegistryFile::empty()
            }
        };

        debug!(path = %storage.describe(), servers = file.servers.len(), "Loaded MCP registry");

        Self {
            version: file.version,
            servers: file.servers,
            storage: Box::new(storage),
            last_persist_error: None,
        }
    }

    /// Registry backed by a JSON file.
    pub fn open(path: impl Into<std::path::PathBuf>) -> Self {
        Self::load(FileStorage::new(path))
    }

    /// Empty registry that persists to memory only.
    pub fn in_memory() -> Self {
        Self::load(MemoryStorage::new())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    /// All entries in storage order.
    pub fn list(&self) -> Vec<ServerEntry> {
        self.servers
            .iter()
            .map(|(name, stored)| stored.to_entry(name))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<ServerEntry> {
        self.servers.get(name).map(|stored| stored.to_entry(name))
    }

    pub fn enabled_count(&self) -> usize {
        self.servers.values().filter(|s| s.enabled).count()
    }

    /// Insert a new enabled entry. Never overwrites an existing name.
    pub fn add(&mut self, name: &str, config: Map<String, Value>) -> Result<()> {
        if name.is_empty() {
            return Err(TutorError::EmptyName);
        }
        if self.servers.contains_key(name) {
            return Err(TutorError::DuplicateName(name.to_string()));
        }

        self.servers.insert(
            name.to_string(),
            StoredServer {
                enabled: true,
                config,
            },
        );
        info!(server = %name, "MCP server added");
        self.persist();
        Ok(())
    }

    /// Delete an entry. Returns false if it did not exist.
    pub fn remove(&mut self, name: &str) -> bool {
        if self.servers.shift_remove(name).is_none() {
            return false;
        }
        info!(server = %name, "MCP server removed");
        self.persist();
        true
    }

    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(stored) = self.servers.get_mut(name) else {
            return false;
        };
        stored.enabled = enabled;
        info!(server = %name, enabled, "MCP server toggled");
        self.persist();
        true
    }

    /// Enabled servers with `${NAME}` placeholders expanded from the environment.
    pub fn enabled_for_invocation(&self) -> Map<String, Value> {
        self.enabled_with(&expand::env_lookup)
    }

    /// Enabled servers expanded with a caller-supplied lookup.
    pub fn enabled_with<F>(&self, lookup: &F) -> Map<String, Value>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.servers
            .iter()
            .filter(|(_, stored)| stored.enabled)
            .map(|(name, stored)| {
                let raw = Value::Object(stored.config.clone());
                (name.clone(), expand::expand_value(&raw, lookup))
            })
            .collect()
    }

    /// Take the most recent save failure, if any, clearing it.
    pub fn take_persist_error(&mut self) -> Option<String> {
        self.last_persist_error.take()
    }

    fn persist(&mut self) {
        let file = RegistryFileRef {
            version: self.version,
            servers: &self.servers,
        };
        let result = serde_json::to_string_pretty(&file)
            .map_err(TutorError::from)
            .and_then(|text| self.storage.save(&text).map_err(TutorError::from));

        match result {
            Ok(()) => {
                self.last_persist_error = None;
            }
            Err(e) => {
                warn!(path = %self.storage.describe(), error = %e, "Failed to save MCP registry");
                self.last_persist_error = Some(e.to_string());
            }
        }
    }
}

impl RegistryFile {
    fn empty() -> Self {
        Self {
            version: REGISTRY_VERSION,
            servers: IndexMap::new(),
        }
    }
}

#[derive(Serialize)]
struct RegistryFileRef<'a> {
    version: u32,
    servers: &'a IndexMap<String, StoredServer>,
}

impl StoredServer {
    fn to_entry(&self, name: &str) -> ServerEntry {
        ServerEntry {
            name: name.to_string(),
            enabled: self.enabled,
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServerKind;
    use serde_json::json;

    fn http(url: &str) -> Map<String, Value> {
        ServerEntry::build_config(ServerKind::Http, url, &[])
    }

    #[test]
    fn test_add_then_get() {
        let mut registry = Registry::in_memory();
        registry.add("api", http("https://a.test")).unwrap();

        let entry = registry.get("api").unwrap();
        assert!(entry.enabled);
        assert_eq!(entry.kind(), Some(ServerKind::Http));
        assert_eq!(entry.url(), "https://a.test");
    }

    #[test]
    fn test_duplicate_add_rejected_without_overwrite() {
        let mut registry = Registry::in_memory();
        registry.add("api", http("https://first.test")).unwrap();
        registry.disable("api");

        let err = registry.add("api", http("https://second.test")).unwrap_err();
        assert!(matches!(err, TutorError::DuplicateName(ref n) if n == "api"));

        let entry = registry.get("api").unwrap();
        assert_eq!(entry.url(), "https://first.test");
        assert!(!entry.enabled);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = Registry::in_memory();
        assert!(matches!(registry.add("", http("x")), Err(TutorError::EmptyName)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut registry = Registry::in_memory();
        registry.add("Api", http("a")).unwrap();
        registry.add("api", http("b")).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("API").is_none());
    }

    #[test]
    fn test_remove_semantics() {
        let mut registry = Registry::in_memory();
        registry.add("a", http("a")).unwrap();
        registry.add("b", http("b")).unwrap();

        assert!(registry.remove("a"));
        assert!(registry.get("a").is_none());

        assert!(!registry.remove("a"));
        assert!(!registry.remove("zzz"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_enable_disable_existence_contract() {
        let mut registry = Registry::in_memory();
        assert!(!registry.enable("ghost"));
        assert!(!registry.disable("ghost"));

        registry.add("a", http("a")).unwrap();
        assert!(registry.disable("a"));
        assert!(!registry.get("a").unwrap().enabled);
        assert!(registry.enable("a"));
        assert!(registry.get("a").unwrap().enabled);
        assert_eq!(registry.get("a").unwrap().kind(), Some(ServerKind::Http));
    }

    #[test]
    fn test_list_preserves_insertion_order_after_remove() {
        let mut registry = Registry::in_memory();
        for name in ["c", "a", "b", "d"] {
            registry.add(name, http(name)).unwrap();
        }
        registry.remove("a");
        let names: Vec<String> = registry.list().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["c", "b", "d"]);
    }

    #[test]
    fn test_enabled_for_invocation_filters_and_expands() {
        let mut registry = Registry::in_memory();
        registry
            .add(
                "on",
                json!({"type": "http", "url": "https://${HOST}/mcp", "headers": {"x": "${KEY}"}})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .unwrap();
        registry.add("off", http("https://${HOST}/off")).unwrap();
        registry.disable("off");

        let lookup = |name: &str| (name == "HOST").then(|| "h.test".to_string());
        let servers = registry.enabled_with(&lookup);

        assert_eq!(servers.len(), 1);
        assert_eq!(
            servers["on"],
            json!({"type": "http", "url": "https://h.test/mcp", "headers": {"x": ""}})
        );
        // Stored config is untouched.
        assert_eq!(registry.get("on").unwrap().url(), "https://${HOST}/mcp");
    }

    #[test]
    fn test_every_mutation_persists() {
        let storage = MemoryStorage::new();
        let mut registry = Registry::load(storage.clone());

        registry.add("a", http("a")).unwrap();
        registry.disable("a");
        registry.enable("a");
        registry.remove("a");
        assert_eq!(storage.save_count(), 4);

        // Misses do not write.
        registry.remove("a");
        registry.enable("a");
        assert_eq!(storage.save_count(), 4);
    }

    #[test]
    fn test_persisted_format() {
        let storage = MemoryStorage::new();
        let mut registry = Registry::load(storage.clone());
        registry
            .add(
                "fs",
                ServerEntry::build_config(ServerKind::Stdio, "npx", &["-y".into(), "tool".into()]),
            )
            .unwrap();
        registry.disable("fs");

        let written: Value = serde_json::from_str(&storage.contents().unwrap()).unwrap();
        assert_eq!(
            written,
            json!({
                "version": 1,
                "servers": {
                    "fs": {
                        "enabled": false,
                        "config": {"type": "stdio", "command": "npx", "args": ["-y", "tool"]}
                    }
                }
            })
        );
    }

    #[test]
    fn test_corrupt_backing_loads_empty() {
        let registry = Registry::load(MemoryStorage::with_contents("{not json"));
        assert!(registry.is_empty());
        assert_eq!(registry.version(), REGISTRY_VERSION);
    }

    #[test]
    fn test_load_defaults_and_version_carried() {
        let storage = MemoryStorage::with_contents(
            r#"{"version": 7, "servers": {"x": {"config": {"type": "sse", "url": "u"}}, "y": {}}}"#,
        );
        let mut registry = Registry::load(storage.clone());
        assert_eq!(registry.version(), 7);
        assert!(registry.get("x").unwrap().enabled);
        assert!(registry.get("y").unwrap().config.is_empty());

        registry.disable("y");
        let written: Value = serde_json::from_str(&storage.contents().unwrap()).unwrap();
        assert_eq!(written["version"], json!(7));
    }

    #[test]
    fn test_malformed_entry_does_not_drop_others() {
        let storage = MemoryStorage::with_contents(
            r#"{"version": 1, "servers": {
                "good": {"enabled": false, "config": {"type": "http", "url": "https://g"}},
                "bad_config": {"enabled": true, "config": "npx -y tool"},
                "bad_entry": 42,
                "bad_flag": {"enabled": "yes", "config": {"type": "sse", "url": "https://s"}}
            }}"#,
        );
        let mut registry = Registry::load(storage.clone());

        assert_eq!(registry.len(), 4);
        let good = registry.get("good").unwrap();
        assert!(!good.enabled);
        assert_eq!(good.url(), "https://g");
        assert!(registry.get("bad_config").unwrap().config.is_empty());
        assert!(registry.get("bad_entry").unwrap().enabled);
        assert_eq!(registry.get("bad_flag").unwrap().url(), "https://s");

        registry.remove("bad_entry");
        let written: Value = serde_json::from_str(&storage.contents().unwrap()).unwrap();
        assert_eq!(written["servers"]["good"]["config"]["url"], "https://g");
        assert_eq!(written["servers"].as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_save_failure_is_recorded_not_fatal() {
        let storage = MemoryStorage::new();
        storage.set_fail_saves(true);
        let mut registry = Registry::load(storage.clone());

        registry.add("a", http("a")).unwrap();
        assert!(registry.contains("a"));
        let err = registry.take_persist_error().unwrap();
        assert!(err.contains("read-only"));
        assert!(registry.take_persist_error().is_none());

        storage.set_fail_saves(false);
        registry.disable("a");
        assert!(registry.take_persist_error().is_none());
    }
}
