use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::parser::query::{layer_url, query_param, LAYER_PARAM};

/// Durable string key/value storage, the browser's local storage contract.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Storage key names. Pages disagree on naming, so all of them are configurable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub attribute: String,
    pub chart_type: String,
    pub y_key: String,
    pub layer: String,
    /// Key used by the broadcast-style attribute selector
    pub generic_attribute: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            attribute: "selectedKey".to_string(),
            chart_type: "selectedChartType".to_string(),
            y_key: "selectedY".to_string(),
            layer: "selectedSpatialLayer".to_string(),
            generic_attribute: "selectedAttribute".to_string(),
        }
    }
}

/// Non-durable store, lives as long as the value does
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// JSON-file backed store. Every write goes straight to disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file is an empty store. A file that cannot be read or parsed
    /// is logged and also treated as empty; it is overwritten on the next write.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "selection store is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no selection store yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "selection store unreadable, starting empty");
                BTreeMap::new()
            }
        };

        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize selection store")?;
        fs::write(&self.path, text)
            .with_context(|| format!("Failed to write selection store {}", self.path.display()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// What the page should do about the layer selection on load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerResolution {
    /// Navigate away to this URL; nothing else on the page runs
    Redirect(String),
    /// The URL names this layer; it has been remembered
    Active(String),
    /// No layer in the URL or in storage
    Unset,
}

/// Reconcile the URL's layer parameter with the stored layer.
pub fn resolve_layer(
    query: &str,
    store: &mut dyn KeyValueStore,
    key: &str,
) -> Result<LayerResolution> {
    let saved = store.get(key).filter(|v| !v.is_empty());

    match (query_param(query, LAYER_PARAM), saved) {
        (None, Some(saved)) => Ok(LayerResolution::Redirect(layer_url(&saved))),
        (Some(current), _) => {
            store.set(key, &current)?;
            Ok(LayerResolution::Active(current))
        }
        (None, None) => Ok(LayerResolution::Unset),
    }
}

/// Remember a newly chosen layer and return the URL to navigate to.
pub fn choose_layer(layer_id: &str, store: &mut dyn KeyValueStore, key: &str) -> Result<String> {
    store.set(key, layer_id)?;
    Ok(layer_url(layer_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("a"), None);
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a"), Some("1".to_string()));
        store.remove("a").unwrap();
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let mut store = FileStore::open(&path);
            store.set("selectedKey", "zone").unwrap();
        }
        let store = FileStore::open(&path);
        assert_eq!(store.get("selectedKey"), Some("zone".to_string()));
    }

    #[test]
    fn test_file_store_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();
        let mut store = FileStore::open(&path);
        assert_eq!(store.get("selectedKey"), None);
        store.set("selectedKey", "x").unwrap();
        assert_eq!(FileStore::open(&path).get("selectedKey"), Some("x".into()));
    }

    #[test]
    fn test_redirect_when_url_has_no_layer() {
        let mut store = MemoryStore::new();
        store.set("selectedSpatialLayer", "42").unwrap();
        let res = resolve_layer("", &mut store, "selectedSpatialLayer").unwrap();
        assert_eq!(res, LayerResolution::Redirect("?file_id=42".to_string()));
    }

    #[test]
    fn test_url_layer_is_remembered() {
        let mut store = MemoryStore::new();
        store.set("selectedSpatialLayer", "1").unwrap();
        let res = resolve_layer("?file_id=9", &mut store, "selectedSpatialLayer").unwrap();
        assert_eq!(res, LayerResolution::Active("9".to_string()));
        assert_eq!(store.get("selectedSpatialLayer"), Some("9".to_string()));
    }

    #[test]
    fn test_no_layer_anywhere() {
        let mut store = MemoryStore::new();
        let res = resolve_layer("?tab=map", &mut store, "selectedSpatialLayer").unwrap();
        assert_eq!(res, LayerResolution::Unset);
    }

    #[test]
    fn test_choose_layer() {
        let mut store = MemoryStore::new();
        let url = choose_layer("5", &mut store, "selectedSpatialLayer").unwrap();
        assert_eq!(url, "?file_id=5");
        assert_eq!(store.get("selectedSpatialLayer"), Some("5".to_string()));
    }
}
