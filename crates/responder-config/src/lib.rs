//! Engine configuration.
//!
//! Configuration is TOML with `${VAR}` environment substitution, loaded
//! asynchronously and validated before the engine starts. A small set of
//! `RESPONDER_`-prefixed environment variables override file values for
//! deployment tweaks without editing the file.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("file not found: {0}")]
	FileNotFound(String),

	#[error("parse error: {0}")]
	ParseError(String),

	#[error("validation error: {0}")]
	ValidationError(String),

	#[error("environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("io error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
	#[serde(default)]
	pub engine: EngineSection,
	#[serde(default)]
	pub matching: MatchingConfig,
	#[serde(default)]
	pub scheduler: SchedulerConfig,
	#[serde(default)]
	pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
	#[serde(default = "default_name")]
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

impl Default for EngineSection {
	fn default() -> Self {
		Self {
			name: default_name(),
			log_level: default_log_level(),
		}
	}
}

/// Search and ranking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
	/// Starting search radius for a new emergency, in kilometers.
	#[serde(default = "default_radius_km")]
	pub default_radius_km: f64,
	/// Hard ceiling the radius never doubles past.
	#[serde(default = "default_max_radius_km")]
	pub max_radius_km: f64,
	/// Escalations after which an emergency is flagged for manual
	/// broadening instead of escalating again.
	#[serde(default = "default_max_escalations")]
	pub max_escalations: u32,
}

impl Default for MatchingConfig {
	fn default() -> Self {
		Self {
			default_radius_km: default_radius_km(),
			max_radius_km: default_max_radius_km(),
			max_escalations: default_max_escalations(),
		}
	}
}

/// Deadline and escalation timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
	/// How often the scheduler polls for passed deadlines.
	#[serde(default = "default_poll_interval_secs")]
	pub poll_interval_secs: u64,
	/// Minutes a volunteer has to respond to an offer.
	#[serde(default = "default_offer_response_minutes")]
	pub offer_response_minutes: i64,
	/// Minutes an emergency may sit with zero accepts before escalating.
	#[serde(default = "default_escalation_timeout_minutes")]
	pub escalation_timeout_minutes: i64,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			poll_interval_secs: default_poll_interval_secs(),
			offer_response_minutes: default_offer_response_minutes(),
			escalation_timeout_minutes: default_escalation_timeout_minutes(),
		}
	}
}

/// Persistence backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
	/// `memory` or `file`.
	#[serde(default = "default_backend")]
	pub backend: String,
	/// Base directory for the `file` backend.
	#[serde(default = "default_storage_path")]
	pub path: String,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: default_backend(),
			path: default_storage_path(),
		}
	}
}

fn default_name() -> String {
	"responder-engine".to_string()
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_radius_km() -> f64 {
	10.0
}

fn default_max_radius_km() -> f64 {
	100.0
}

fn default_max_escalations() -> u32 {
	3
}

fn default_poll_interval_secs() -> u64 {
	5
}

fn default_offer_response_minutes() -> i64 {
	30
}

fn default_escalation_timeout_minutes() -> i64 {
	30
}

fn default_backend() -> String {
	"memory".to_string()
}

fn default_storage_path() -> String {
	"./data/storage".to_string()
}

/// Configuration loader with environment variable substitution.
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "RESPONDER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	/// Loads, substitutes, overrides and validates. Without a file the
	/// built-in defaults are used.
	pub async fn load(&self) -> Result<EngineConfig, ConfigError> {
		let mut config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			EngineConfig::default()
		};

		self.apply_env_overrides(&mut config)?;
		validate(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<EngineConfig, ConfigError> {
		if !Path::new(file_path).exists() {
			return Err(ConfigError::FileNotFound(file_path.to_string()));
		}
		let content = tokio::fs::read_to_string(file_path).await?;
		let substituted = self.substitute_env_vars(&content)?;

		toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	/// Replaces `${VAR_NAME}` patterns with environment values. A missing
	/// variable is an error, not an empty string.
	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let re = regex::Regex::new(r"\$\{([^}]+)\}")
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		let mut result = content.to_string();
		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut EngineConfig) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			debug!(%log_level, "overriding log level from environment");
			config.engine.log_level = log_level;
		}

		if let Ok(radius) = env::var(format!("{}DEFAULT_RADIUS_KM", self.env_prefix)) {
			config.matching.default_radius_km = radius.parse().map_err(|e| {
				ConfigError::ValidationError(format!("invalid default radius: {}", e))
			})?;
		}

		if let Ok(interval) = env::var(format!("{}POLL_INTERVAL_SECS", self.env_prefix)) {
			config.scheduler.poll_interval_secs = interval.parse().map_err(|e| {
				ConfigError::ValidationError(format!("invalid poll interval: {}", e))
			})?;
		}

		Ok(())
	}
}

/// Rejects configurations the engine cannot run with.
pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
	if config.matching.default_radius_km <= 0.0 {
		return Err(ConfigError::ValidationError(
			"default_radius_km must be positive".to_string(),
		));
	}
	if config.matching.max_radius_km < config.matching.default_radius_km {
		return Err(ConfigError::ValidationError(
			"max_radius_km must be at least default_radius_km".to_string(),
		));
	}
	if config.scheduler.poll_interval_secs == 0 {
		return Err(ConfigError::ValidationError(
			"poll_interval_secs must be at least 1".to_string(),
		));
	}
	if config.scheduler.offer_response_minutes <= 0 {
		return Err(ConfigError::ValidationError(
			"offer_response_minutes must be positive".to_string(),
		));
	}
	if config.scheduler.escalation_timeout_minutes <= 0 {
		return Err(ConfigError::ValidationError(
			"escalation_timeout_minutes must be positive".to_string(),
		));
	}
	match config.storage.backend.as_str() {
		"memory" | "file" => Ok(()),
		other => Err(ConfigError::ValidationError(format!(
			"unknown storage backend: {}",
			other
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn defaults_are_valid() {
		let config = EngineConfig::default();
		validate(&config).unwrap();
		assert_eq!(config.matching.default_radius_km, 10.0);
		assert_eq!(config.matching.max_radius_km, 100.0);
		assert_eq!(config.matching.max_escalations, 3);
		assert_eq!(config.scheduler.escalation_timeout_minutes, 30);
		assert_eq!(config.storage.backend, "memory");
	}

	#[tokio::test]
	async fn loads_partial_file_with_defaults() {
		let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
		writeln!(
			file,
			r#"
[engine]
name = "test-engine"

[matching]
default_radius_km = 25.0

[scheduler]
poll_interval_secs = 1
"#
		)
		.unwrap();

		let config = ConfigLoader::new().with_file(file.path()).load().await.unwrap();
		assert_eq!(config.engine.name, "test-engine");
		assert_eq!(config.matching.default_radius_km, 25.0);
		// Unset sections and fields fall back to defaults.
		assert_eq!(config.matching.max_radius_km, 100.0);
		assert_eq!(config.scheduler.offer_response_minutes, 30);
	}

	#[tokio::test]
	async fn missing_file_is_an_error() {
		let result = ConfigLoader::new().with_file("/no/such/config.toml").load().await;
		assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
	}

	#[tokio::test]
	async fn substitutes_env_vars() {
		std::env::set_var("RESPONDER_TEST_STORAGE_PATH", "/tmp/responder-test");
		let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
		writeln!(
			file,
			r#"
[storage]
backend = "file"
path = "${{RESPONDER_TEST_STORAGE_PATH}}"
"#
		)
		.unwrap();

		let config = ConfigLoader::new().with_file(file.path()).load().await.unwrap();
		assert_eq!(config.storage.path, "/tmp/responder-test");
	}

	#[tokio::test]
	async fn missing_substitution_var_fails() {
		let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
		writeln!(
			file,
			r#"
[storage]
path = "${{RESPONDER_DEFINITELY_UNSET_VAR}}"
"#
		)
		.unwrap();

		let result = ConfigLoader::new().with_file(file.path()).load().await;
		assert!(matches!(result, Err(ConfigError::EnvVarNotFound(_))));
	}

	#[test]
	fn validation_rejects_bad_values() {
		let mut config = EngineConfig::default();
		config.matching.default_radius_km = 0.0;
		assert!(validate(&config).is_err());

		let mut config = EngineConfig::default();
		config.matching.max_radius_km = 5.0;
		assert!(validate(&config).is_err());

		let mut config = EngineConfig::default();
		config.scheduler.poll_interval_secs = 0;
		assert!(validate(&config).is_err());

		let mut config = EngineConfig::default();
		config.storage.backend = "redis".to_string();
		assert!(validate(&config).is_err());
	}
}
