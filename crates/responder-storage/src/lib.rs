//! Persistence layer for engine records.
//!
//! Emergencies, assignments and volunteer snapshots are stored as JSON
//! under `namespace:id` keys. The engine works against the typed
//! [`StorageService`]; backends only move bytes, so swapping the
//! in-memory store for the file store (or something distributed) never
//! touches engine code.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use implementations::file::FileStore;
pub use implementations::memory::MemoryStore;

/// Errors surfaced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// No value under the requested key.
	#[error("not found")]
	NotFound,
	/// JSON encode/decode failure.
	#[error("serialization error: {0}")]
	Serialization(String),
	/// Backend failure (I/O, etc.).
	#[error("backend error: {0}")]
	Backend(String),
}

/// Low-level byte-oriented backend interface.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
	/// Retrieves the bytes stored under `key`.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores `value` under `key`, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes `key`. Deleting an absent key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Whether `key` currently holds a value.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// All keys starting with `prefix`, in no particular order.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Typed storage over a byte backend. Keys are `namespace:id` and values
/// are JSON.
pub struct StorageService {
	backend: Box<dyn KeyValueStore>,
}

impl StorageService {
	pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Serializes and stores a record.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(namespace, id), bytes).await
	}

	/// Retrieves and deserializes a record.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Loads every record in a namespace, for startup recovery.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<T>, StorageError> {
		let prefix = format!("{}:", namespace);
		let mut records = Vec::new();
		for key in self.backend.list_keys(&prefix).await? {
			let bytes = self.backend.get_bytes(&key).await?;
			let record = serde_json::from_slice(&bytes)
				.map_err(|e| StorageError::Serialization(e.to_string()))?;
			records.push(record);
		}
		Ok(records)
	}

	/// Removes a record. Removing an absent record is not an error.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Whether a record exists.
	pub async fn contains(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}
}
