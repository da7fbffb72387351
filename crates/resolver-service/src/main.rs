use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use resolver_config::ConfigLoader;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod service;

use service::ResolverService;

#[derive(Parser)]
#[command(name = "htlc-resolver")]
#[command(about = "Cross-chain HTLC auction resolver", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "RESOLVER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the resolver service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("starting HTLC resolver");
	info!("loading configuration from: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("failed to load configuration")?;

	info!("resolver name: {}", config.resolver.name);
	info!("API port: {}", config.api.port);

	let service = Arc::new(ResolverService::build(config).context("failed to build resolver")?);
	let tasks = service.spawn_background_tasks();

	let api_service = service.clone();
	let api_handle = tokio::spawn(async move { api::serve(api_service).await });

	let shutdown_signal = setup_shutdown_signal();

	info!("HTLC resolver started");

	shutdown_signal.await;

	info!("shutdown signal received, stopping services");

	api_handle.abort();
	for task in tasks {
		task.abort();
	}

	info!("HTLC resolver stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("validating configuration file: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("failed to load configuration")?;

	info!("configuration is valid");
	info!("resolver name: {}", config.resolver.name);
	for chain in &config.chains {
		info!("  chain: {} (id {}, {:?})", chain.network, chain.chain_id, chain.mode);
	}
	for asset in &config.assets {
		info!(
			"  asset: {} on {} ({} decimals)",
			asset.symbol, asset.network, asset.decimals
		);
	}

	Ok(())
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

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
