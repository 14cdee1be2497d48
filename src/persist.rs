use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::workspace::DirId;

/// Flat key-value persistence over one JSON file, the localStorage stand-in.
/// Any malformed state, whether the whole file or a single value, falls back
/// to defaults with a warning; corruption never reaches the selection engine.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl StateStore {
    pub fn load(path: PathBuf) -> Self {
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!(path = %path.display(), "malformed state file, starting from defaults");
                    Map::new()
                }
            },
            // A missing file is just a first run.
            Err(_) => Map::new(),
        };
        debug!(path = %path.display(), keys = values.len(), "state loaded");
        StateStore { path, values }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "malformed persisted value, using default");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.values.insert(key.to_string(), v);
            }
            Err(e) => warn!(key, error = %e, "failed to serialize state value"),
        }
    }

    pub fn remove_prefix(&mut self, prefix: &str) {
        self.values.retain(|k, _| !k.starts_with(prefix));
    }

    pub fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&Value::Object(self.values.clone()))
            .unwrap_or_else(|_| "{}".to_string());
        std::fs::write(&self.path, text)
    }
}

pub fn default_state_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("promptpack")
        .join("state.json")
}

fn selected_key(id: &DirId) -> String {
    format!("dir:{id}:selected")
}

fn collapsed_key(id: &DirId) -> String {
    format!("dir:{id}:collapsed")
}

pub const WHITELIST_KEY: &str = "whitelist";
pub const PROMPTS_KEY: &str = "prompts";
pub const INSTRUCTIONS_KEY: &str = "instructions";

/// Per-directory keys, kept together so add/remove stay symmetric.
impl StateStore {
    pub fn load_dir_selection(&self, id: &DirId) -> Vec<PathBuf> {
        self.get::<Vec<PathBuf>>(&selected_key(id)).unwrap_or_default()
    }

    pub fn load_dir_collapsed(&self, id: &DirId) -> HashSet<PathBuf> {
        self.get::<HashSet<PathBuf>>(&collapsed_key(id)).unwrap_or_default()
    }

    pub fn save_dir(&mut self, id: &DirId, selected: &[PathBuf], collapsed: &HashSet<PathBuf>) {
        self.set(&selected_key(id), &selected);
        self.set(&collapsed_key(id), collapsed);
    }

    pub fn clear_dir(&mut self, id: &DirId) {
        self.remove_prefix(&format!("dir:{id}:"));
    }
}

pub fn state_path_or_default(cli_path: Option<&Path>) -> PathBuf {
    cli_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_state_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut store = StateStore::load(path.clone());
        store.set("whitelist", &vec![".rs".to_string()]);
        let id = DirId("/repo".into());
        store.save_dir(&id, &[PathBuf::from("/repo/a.rs")], &HashSet::new());
        store.save().unwrap();

        let reloaded = StateStore::load(path);
        assert_eq!(
            reloaded.get::<Vec<String>>("whitelist").unwrap(),
            vec![".rs"]
        );
        assert_eq!(
            reloaded.load_dir_selection(&id),
            vec![PathBuf::from("/repo/a.rs")]
        );
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json at all").unwrap();
        let store = StateStore::load(path);
        assert!(store.get::<Vec<String>>("whitelist").is_none());
        assert!(store.load_dir_selection(&DirId("x".into())).is_empty());
    }

    #[test]
    fn malformed_value_is_ignored_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"whitelist": 42, "ok": ["y"]}"#).unwrap();
        let store = StateStore::load(path);
        assert!(store.get::<Vec<String>>("whitelist").is_none());
        assert_eq!(store.get::<Vec<String>>("ok").unwrap(), vec!["y"]);
    }

    #[test]
    fn clear_dir_removes_only_that_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::load(dir.path().join("s.json"));
        let a = DirId("/a".into());
        let b = DirId("/b".into());
        store.save_dir(&a, &[PathBuf::from("/a/f")], &HashSet::new());
        store.save_dir(&b, &[PathBuf::from("/b/f")], &HashSet::new());
        store.clear_dir(&a);
        assert!(store.load_dir_selection(&a).is_empty());
        assert_eq!(store.load_dir_selection(&b).len(), 1);
    }
}
