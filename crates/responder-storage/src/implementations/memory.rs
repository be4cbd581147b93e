//! In-memory storage backend.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{KeyValueStore, StorageError};

/// Concurrent in-memory store. The default backend; nothing survives a
/// restart.
#[derive(Default)]
pub struct MemoryStore {
	entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl KeyValueStore for MemoryStore {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.entries
			.get(key)
			.map(|entry| entry.value().clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.entries.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.entries.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.entries.contains_key(key))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		Ok(self
			.entries
			.iter()
			.filter(|entry| entry.key().starts_with(prefix))
			.map(|entry| entry.key().clone())
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn bytes_round_trip() {
		let store = MemoryStore::new();
		store.set_bytes("a:1", b"hello".to_vec()).await.unwrap();

		assert_eq!(store.get_bytes("a:1").await.unwrap(), b"hello");
		assert!(store.exists("a:1").await.unwrap());
		assert!(matches!(
			store.get_bytes("a:2").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn list_keys_filters_by_prefix() {
		let store = MemoryStore::new();
		store.set_bytes("a:1", vec![1]).await.unwrap();
		store.set_bytes("a:2", vec![2]).await.unwrap();
		store.set_bytes("b:1", vec![3]).await.unwrap();

		let mut keys = store.list_keys("a:").await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["a:1", "a:2"]);
	}
}
