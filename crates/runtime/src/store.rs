//! Key-value stores backing pairing state and the response cache.
//!
//! Values are JSON. [`JsonFileStore`] keeps everything in one file that is
//! rewritten on every change and restricted to the owner, since it holds the
//! pairing token.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

pub trait KeyValueStore: Send + Sync {
	fn get(&self, key: &str) -> Result<Option<Value>>;
	fn set(&self, key: &str, value: Value) -> Result<()>;
	fn remove(&self, key: &str) -> Result<()>;
}

/// Typed access on top of any [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
	/// Reads and decodes `key`. A value that no longer decodes is treated as absent.
	fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
		let Some(value) = self.get(key)? else {
			return Ok(None);
		};
		match serde_json::from_value(value) {
			Ok(decoded) => Ok(Some(decoded)),
			Err(err) => {
				warn!(target = "rt.store", key, error = %err, "ignoring undecodable value");
				Ok(None)
			}
		}
	}

	fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
		self.set(key, serde_json::to_value(value)?)
	}
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// Process-lifetime store.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<Value>> {
		Ok(self.entries.lock().get(key).cloned())
	}

	fn set(&self, key: &str, value: Value) -> Result<()> {
		self.entries.lock().insert(key.to_string(), value);
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<()> {
		self.entries.lock().remove(key);
		Ok(())
	}
}

/// Durable store: a single JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStore {
	path: PathBuf,
	entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
	/// Opens `path`, starting empty when the file is missing or unreadable.
	pub fn open(path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		let entries = load_json(&path).unwrap_or_default();
		Self {
			path,
			entries: Mutex::new(entries),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
		save_private(&self.path, entries)
	}
}

impl KeyValueStore for JsonFileStore {
	fn get(&self, key: &str) -> Result<Option<Value>> {
		Ok(self.entries.lock().get(key).cloned())
	}

	fn set(&self, key: &str, value: Value) -> Result<()> {
		let mut entries = self.entries.lock();
		entries.insert(key.to_string(), value);
		self.flush(&entries)
	}

	fn remove(&self, key: &str) -> Result<()> {
		let mut entries = self.entries.lock();
		if entries.remove(key).is_some() {
			self.flush(&entries)?;
		}
		Ok(())
	}
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
	let content = fs::read_to_string(path).ok()?;
	match serde_json::from_str(&content) {
		Ok(value) => Some(value),
		Err(err) => {
			warn!(target = "rt.store", path = %path.display(), error = %err, "state file is not valid JSON");
			None
		}
	}
}

fn save_private<T: Serialize>(path: &Path, data: &T) -> Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	fs::write(path, serde_json::to_string_pretty(data)?)?;
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn test_memory_store_roundtrip() {
		let store = MemoryStore::new();
		assert_eq!(store.get("a").unwrap(), None);
		store.set("a", json!(1)).unwrap();
		assert_eq!(store.get("a").unwrap(), Some(json!(1)));
		store.remove("a").unwrap();
		assert_eq!(store.get("a").unwrap(), None);
	}

	#[test]
	fn test_file_store_survives_reopen() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("nested/state.json");

		let store = JsonFileStore::open(&path);
		store.save("pairingState", &json!({"token": "t"})).unwrap();
		drop(store);

		let reopened = JsonFileStore::open(&path);
		let value: Option<Value> = reopened.load("pairingState").unwrap();
		assert_eq!(value, Some(json!({"token": "t"})));
	}

	#[test]
	fn test_file_store_missing_file_is_empty() {
		let tmp = TempDir::new().unwrap();
		let store = JsonFileStore::open(tmp.path().join("nonexistent.json"));
		assert_eq!(store.get("anything").unwrap(), None);
	}

	#[test]
	fn test_file_store_ignores_corrupt_file() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("state.json");
		fs::write(&path, "{not json").unwrap();

		let store = JsonFileStore::open(&path);
		assert_eq!(store.get("pairingState").unwrap(), None);
		store.set("k", json!("v")).unwrap();
		assert!(fs::read_to_string(&path).unwrap().contains("\"k\""));
	}

	#[cfg(unix)]
	#[test]
	fn test_file_store_is_owner_only() {
		use std::os::unix::fs::PermissionsExt;

		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("state.json");
		let store = JsonFileStore::open(&path);
		store.set("k", json!(true)).unwrap();

		let mode = fs::metadata(&path).unwrap().permissions().mode();
		assert_eq!(mode & 0o777, 0o600);
	}

	#[test]
	fn test_load_treats_wrong_shape_as_absent() {
		let store = MemoryStore::new();
		store.set("n", json!("not a number")).unwrap();
		let loaded: Option<u64> = store.load("n").unwrap();
		assert_eq!(loaded, None);
	}
}
