use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use responder_config::ConfigLoader;
use responder_core::EngineBuilder;
use responder_types::EngineEvent;

#[derive(Parser)]
#[command(name = "responder-engine")]
#[command(about = "Volunteer matching and assignment engine", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE")]
	config: Option<PathBuf>,

	#[arg(long, env = "RESPONDER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the engine
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_engine(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_engine(cli: Cli) -> Result<()> {
	let config = load_config(&cli).await?;
	info!(name = %config.engine.name, "starting matching engine");

	let file_backed = config.storage.backend == "file";
	let handle = EngineBuilder::new(config)
		.build()
		.context("failed to build engine")?;
	let engine = handle.engine();
	let shutdown = handle.shutdown_handle();

	if file_backed {
		let (emergencies, assignments) = engine
			.recover()
			.await
			.context("failed to recover persisted state")?;
		info!(emergencies, assignments, "recovered persisted state");
	}

	// Log engine decisions until a notification dispatcher subscribes in
	// the surrounding application.
	let mut events = engine.event_bus().subscribe();
	tokio::spawn(async move {
		while let Ok(event) = events.recv().await {
			if let EngineEvent::Notification(notification) = event {
				info!(?notification, "notification decision");
			}
		}
	});

	let runner = tokio::spawn(handle.run());

	shutdown_signal().await;
	info!("shutdown signal received");
	shutdown.send(()).ok();

	runner
		.await
		.context("engine task panicked")?
		.context("engine terminated with error")?;

	info!("matching engine stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	let config = load_config(&cli).await?;

	info!("configuration is valid");
	info!(name = %config.engine.name, "engine");
	info!(
		default_radius_km = config.matching.default_radius_km,
		max_radius_km = config.matching.max_radius_km,
		max_escalations = config.matching.max_escalations,
		"matching"
	);
	info!(
		poll_interval_secs = config.scheduler.poll_interval_secs,
		offer_response_minutes = config.scheduler.offer_response_minutes,
		escalation_timeout_minutes = config.scheduler.escalation_timeout_minutes,
		"scheduler"
	);
	info!(backend = %config.storage.backend, "storage");

	Ok(())
}

async fn load_config(cli: &Cli) -> Result<responder_config::EngineConfig> {
	let mut loader = ConfigLoader::new();
	if let Some(path) = &cli.config {
		info!(?path, "loading configuration");
		loader = loader.with_file(path);
	} else {
		info!("no configuration file given, using defaults");
	}
	loader.load().await.context("failed to load configuration")
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			tracing::error!(error = %e, "failed to install Ctrl+C handler");
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => tracing::error!(error = %e, "failed to install signal handler"),
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
