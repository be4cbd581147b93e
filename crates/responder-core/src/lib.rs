//! Orchestration core of the responder matching engine.
//!
//! Wires the matching pipeline, assignment state machine, escalation
//! scheduler and storage together behind [`MatchingEngine`], and exposes
//! [`EngineBuilder`] for assembling a running instance.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

pub mod directory;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod state;

pub use directory::{InMemoryDirectory, VolunteerDirectory};
pub use engine::MatchingEngine;
pub use error::CoreError;
pub use event_bus::EventBus;
pub use state::EngineState;

use responder_config::EngineConfig;
use responder_escalation::EscalationScheduler;
use responder_storage::{FileStore, MemoryStore, StorageService};
use responder_types::{Clock, SystemClock};

const EVENT_BUS_CAPACITY: usize = 1024;

/// Assembles a [`MatchingEngine`] with its scheduler and event bus.
pub struct EngineBuilder {
	config: EngineConfig,
	directory: Option<Arc<dyn VolunteerDirectory>>,
	storage: Option<StorageService>,
	clock: Arc<dyn Clock>,
}

impl EngineBuilder {
	pub fn new(config: EngineConfig) -> Self {
		Self {
			config,
			directory: None,
			storage: None,
			clock: Arc::new(SystemClock),
		}
	}

	pub fn with_directory(mut self, directory: Arc<dyn VolunteerDirectory>) -> Self {
		self.directory = Some(directory);
		self
	}

	/// Overrides the storage backend the configuration would select.
	pub fn with_storage(mut self, storage: StorageService) -> Self {
		self.storage = Some(storage);
		self
	}

	/// Overrides the clock; tests pass a manual one.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn build(self) -> Result<EngineHandle, CoreError> {
		responder_config::validate(&self.config)?;

		let storage = match self.storage {
			Some(storage) => storage,
			None => match self.config.storage.backend.as_str() {
				"file" => StorageService::new(Box::new(FileStore::new(
					self.config.storage.path.clone().into(),
				))),
				_ => StorageService::new(Box::new(MemoryStore::new())),
			},
		};
		let directory = self
			.directory
			.unwrap_or_else(|| Arc::new(InMemoryDirectory::new()));

		let (scheduler_tx, scheduler_rx) = mpsc::unbounded_channel();
		let scheduler = Arc::new(EscalationScheduler::new(
			self.clock.clone(),
			Duration::from_secs(self.config.scheduler.poll_interval_secs),
			scheduler_tx,
		));
		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
		let (shutdown_tx, _) = broadcast::channel(1);

		let engine = Arc::new(MatchingEngine::new(
			self.config,
			directory,
			Arc::new(storage),
			scheduler.clone(),
			event_bus,
			self.clock,
		));

		Ok(EngineHandle {
			engine,
			scheduler,
			scheduler_rx,
			shutdown_tx,
		})
	}
}

/// A built engine plus the plumbing its tasks run on.
pub struct EngineHandle {
	engine: Arc<MatchingEngine>,
	scheduler: Arc<EscalationScheduler>,
	scheduler_rx: mpsc::UnboundedReceiver<responder_escalation::SchedulerEvent>,
	shutdown_tx: broadcast::Sender<()>,
}

impl EngineHandle {
	pub fn engine(&self) -> Arc<MatchingEngine> {
		self.engine.clone()
	}

	/// The deadline scheduler, e.g. for tests driving ticks manually.
	pub fn scheduler(&self) -> Arc<EscalationScheduler> {
		self.scheduler.clone()
	}

	/// Sender that stops both the engine loop and the scheduler.
	pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
		self.shutdown_tx.clone()
	}

	/// Runs the scheduler poll loop and the engine event loop until a
	/// shutdown signal arrives.
	pub async fn run(self) -> Result<(), CoreError> {
		let scheduler = self.scheduler.clone();
		let scheduler_shutdown = self.shutdown_tx.subscribe();
		let scheduler_task = tokio::spawn(async move {
			scheduler.run(scheduler_shutdown).await;
		});

		let result = self
			.engine
			.run(self.scheduler_rx, self.shutdown_tx.subscribe())
			.await;

		if let Err(e) = scheduler_task.await {
			warn!(error = %e, "scheduler task join failed");
		}
		result
	}
}
