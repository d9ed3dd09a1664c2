use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use crate::models::HistoryItem;
use crate::quota::{QuotaLimit, QuotaState, UNBOUNDED_SENTINEL};

pub const HISTORY_KEY: &str = "image-gen-history";
pub const LIMIT_KEY: &str = "generationLimit";
pub const COUNT_KEY: &str = "generationCount";

pub trait KeyValueStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<()>;
}

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
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let payload = read_json_object(&self.path)?;
        match payload.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => Ok(Some(raw.clone())),
            Some(other) => Ok(Some(other.to_string())),
        }
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        // Merge with whatever is on disk so another process's keys survive.
        let mut on_disk = if self.path.exists() {
            read_json_object(&self.path).unwrap_or_default()
        } else {
            Map::new()
        };
        on_disk.insert(key.to_string(), Value::String(value.to_string()));
        write_json_object(&self.path, &on_disk)
    }
}

// In-process storage. `failing()` rejects every write.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: BTreeMap<String, String>,
    fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            items: BTreeMap::new(),
            fail_writes: true,
        }
    }

    pub fn with_item(mut self, key: &str, value: &str) -> Self {
        self.items.insert(key.to_string(), value.to_string());
        self
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes {
            bail!("storage quota exceeded");
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub trait StoredRecord: Sized {
    fn encode(&self) -> Result<String>;
    fn decode(raw: &str) -> Result<Self>;
}

impl StoredRecord for Vec<HistoryItem> {
    fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("history is not a valid JSON list")
    }
}

impl StoredRecord for QuotaLimit {
    fn encode(&self) -> Result<String> {
        Ok(self.to_string())
    }

    fn decode(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed == UNBOUNDED_SENTINEL {
            return Ok(QuotaLimit::Unbounded);
        }
        let limit = trimmed
            .parse::<u64>()
            .with_context(|| format!("invalid generation limit '{trimmed}'"))?;
        if limit == 0 {
            bail!("generation limit must be positive");
        }
        Ok(QuotaLimit::Finite(limit))
    }
}

impl StoredRecord for u64 {
    fn encode(&self) -> Result<String> {
        Ok(self.to_string())
    }

    fn decode(raw: &str) -> Result<Self> {
        raw.trim()
            .parse::<u64>()
            .with_context(|| format!("invalid counter '{}'", raw.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub history: Vec<HistoryItem>,
    pub quota: QuotaState,
}

/// Tolerant typed access over a [`KeyValueStorage`].
///
/// Reads fall back to the caller's default on any failure and writes never
/// propagate errors; both are reported through `tracing` only.
#[derive(Debug, Clone)]
pub struct PersistentStore<S: KeyValueStorage> {
    storage: S,
}

impl<S: KeyValueStorage> PersistentStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn load<T: StoredRecord>(&self, key: &str, default: T) -> T {
        let raw = match self.storage.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(err) => {
                tracing::warn!(key, error = %format!("{err:#}"), "failed to read from storage");
                return default;
            }
        };
        match T::decode(&raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, error = %format!("{err:#}"), "failed to parse stored value");
                default
            }
        }
    }

    pub fn save<T: StoredRecord>(&mut self, key: &str, value: &T) {
        self.write(key, value.encode());
    }

    fn write(&mut self, key: &str, encoded: Result<String>) {
        let result = encoded.and_then(|encoded| self.storage.set_item(key, &encoded));
        if let Err(err) = result {
            tracing::warn!(key, error = %format!("{err:#}"), "failed to save to storage");
        }
    }

    pub fn load_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            history: self.load(HISTORY_KEY, Vec::new()),
            quota: QuotaState::new(
                self.load(LIMIT_KEY, QuotaLimit::default()),
                self.load(COUNT_KEY, 0u64),
            ),
        }
    }

    pub fn save_history(&mut self, history: &[HistoryItem]) {
        let encoded = serde_json::to_string(history).map_err(anyhow::Error::from);
        self.write(HISTORY_KEY, encoded);
    }

    pub fn save_quota(&mut self, quota: &QuotaState) {
        self.save(LIMIT_KEY, &quota.limit);
        self.save(COUNT_KEY, &quota.count);
    }
}

fn read_json_object(path: &Path) -> Result<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    let parsed: Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))?;
    match parsed {
        Value::Object(map) => Ok(map),
        _ => bail!("{} does not hold a JSON object", path.display()),
    }
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )
    .with_context(|| format!("failed writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::models::{AspectRatio, GenerationConfig, HistoryItem, ImageRef};
    use crate::quota::{QuotaLimit, QuotaState};

    use super::{
        FileStorage, KeyValueStorage, MemoryStorage, PersistentStore, COUNT_KEY, HISTORY_KEY,
        LIMIT_KEY,
    };

    fn item(id: &str) -> HistoryItem {
        HistoryItem {
            id: id.to_string(),
            prompt: format!("prompt {id}"),
            images: vec![ImageRef::new("data:image/jpeg;base64,AAAA")],
            config: GenerationConfig::new(2, AspectRatio::Landscape4x3),
            timestamp: 42,
            source_image: Some(ImageRef::new("data:image/png;base64,BBBB")),
        }
    }

    #[test]
    fn records_roundtrip_through_file_storage() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("state.json");
        let mut store = PersistentStore::new(FileStorage::new(&path));

        let history = vec![item("b"), item("a")];
        store.save_history(&history);
        store.save_quota(&QuotaState::new(QuotaLimit::Unbounded, 12));

        let reloaded = PersistentStore::new(FileStorage::new(&path)).load_snapshot();
        assert_eq!(reloaded.history, history);
        assert_eq!(reloaded.quota, QuotaState::new(QuotaLimit::Unbounded, 12));
        Ok(())
    }

    #[test]
    fn out_of_range_image_counts_load_clamped() {
        let raw = serde_json::json!([
            {"id": "a", "prompt": "p", "images": [], "timestamp": 1,
             "config": {"numberOfImages": 0, "aspectRatio": "1:1"}},
            {"id": "b", "prompt": "p", "images": [], "timestamp": 2,
             "config": {"numberOfImages": 9, "aspectRatio": "16:9"}},
            {"id": "c", "prompt": "p", "images": [], "timestamp": 3,
             "config": {"numberOfImages": 4096, "aspectRatio": "1:1"}},
        ]);
        let store = PersistentStore::new(MemoryStorage::new().with_item(HISTORY_KEY, &raw.to_string()));
        let counts: Vec<u8> = store
            .load_snapshot()
            .history
            .iter()
            .map(|item| item.config.number_of_images)
            .collect();
        assert_eq!(counts, vec![1, 4, 4]);
    }

    #[test]
    fn unbounded_limit_uses_sentinel() {
        let mut store = PersistentStore::new(MemoryStorage::new());
        store.save(LIMIT_KEY, &QuotaLimit::Unbounded);
        assert_eq!(store.storage().raw(LIMIT_KEY), Some("Infinity"));
        assert_eq!(store.load(LIMIT_KEY, QuotaLimit::Finite(5)), QuotaLimit::Unbounded);

        store.save(LIMIT_KEY, &QuotaLimit::Finite(80));
        assert_eq!(store.storage().raw(LIMIT_KEY), Some("80"));
        assert_eq!(store.load(LIMIT_KEY, QuotaLimit::Finite(5)), QuotaLimit::Finite(80));
    }

    #[test]
    fn missing_and_corrupt_values_fall_back_to_defaults() {
        let store = PersistentStore::new(
            MemoryStorage::new()
                .with_item(HISTORY_KEY, "{not json")
                .with_item(LIMIT_KEY, "lots")
                .with_item(COUNT_KEY, "-3"),
        );
        let snapshot = store.load_snapshot();
        assert!(snapshot.history.is_empty());
        assert_eq!(snapshot.quota, QuotaState::default());

        let empty = PersistentStore::new(MemoryStorage::new()).load_snapshot();
        assert_eq!(empty.quota.count, 0);
        assert_eq!(empty.quota.limit, QuotaLimit::Finite(5));
    }

    #[test]
    fn failed_writes_are_swallowed() {
        let mut store = PersistentStore::new(MemoryStorage::failing());
        store.save_history(&[item("a")]);
        store.save_quota(&QuotaState::new(QuotaLimit::Finite(30), 1));
        assert!(store.load_snapshot().history.is_empty());
    }

    #[test]
    fn corrupt_state_file_degrades_and_is_rewritten() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("state.json");
        std::fs::write(&path, "[1, 2")?;

        let mut store = PersistentStore::new(FileStorage::new(&path));
        assert_eq!(store.load(COUNT_KEY, 7u64), 7);

        store.save(COUNT_KEY, &3u64);
        assert_eq!(store.load(COUNT_KEY, 0u64), 3);
        Ok(())
    }

    #[test]
    fn file_storage_keeps_foreign_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("state.json");
        let mut a = FileStorage::new(&path);
        let mut b = FileStorage::new(&path);

        a.set_item("a", "1")?;
        b.set_item("b", "2")?;
        a.set_item("c", "3")?;

        let reloaded = FileStorage::new(&path);
        assert_eq!(reloaded.get_item("a")?.as_deref(), Some("1"));
        assert_eq!(reloaded.get_item("b")?.as_deref(), Some("2"));
        assert_eq!(reloaded.get_item("c")?.as_deref(), Some("3"));
        assert_eq!(reloaded.get_item("missing")?, None);
        Ok(())
    }
}
