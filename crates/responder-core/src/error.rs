use thiserror::Error;

use responder_config::ConfigError;
use responder_storage::StorageError;
use responder_types::EngineError;

/// Errors surfaced by the orchestrator.
///
/// Domain failures stay typed as [`EngineError`] so callers can match on
/// them; configuration and persistence failures are wrapped alongside.
#[derive(Debug, Error)]
pub enum CoreError {
	#[error(transparent)]
	Engine(#[from] EngineError),

	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error("storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("channel error: {0}")]
	Channel(String),
}

impl CoreError {
	/// The inner domain error, when this is one.
	pub fn as_engine(&self) -> Option<&EngineError> {
		match self {
			Self::Engine(e) => Some(e),
			_ => None,
		}
	}
}
