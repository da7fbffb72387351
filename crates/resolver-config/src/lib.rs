//! Configuration loading for the resolver service.
//!
//! Loads TOML configuration with `${VAR_NAME}` environment substitution and
//! a small set of `RESOLVER_`-prefixed overrides, then validates the result
//! before any component is constructed.

use std::env;
use std::path::Path;
use thiserror::Error;

pub mod types;

pub use types::{
	ApiConfig, AuctionConfig, ChainConfig, ChainMode, Config, LiquidityConfig, OrderBookConfig,
	ResolverSettings,
};

use resolver_types::Network;

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
			env_prefix: "RESOLVER_".to_string(),
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

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let mut config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			return Err(ConfigError::FileNotFound(
				"no configuration file specified".to_string(),
			));
		};

		self.apply_env_overrides(&mut config)?;
		validate(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<Config, ConfigError> {
		let content = tokio::fs::read_to_string(file_path).await?;
		let substituted = self.substitute_env_vars(&content)?;

		let config: Config =
			toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?;

		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value =
				env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.resolver.log_level = log_level;
		}

		if let Ok(api_port) = env::var(format!("{}API_PORT", self.env_prefix)) {
			config.api.port = api_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("invalid API port: {}", e)))?;
		}

		Ok(())
	}
}

/// Validates cross-field constraints the type system cannot express.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
	if config.resolver.name.is_empty() {
		return Err(ConfigError::ValidationError(
			"resolver.name must not be empty".to_string(),
		));
	}

	for network in [Network::Ethereum, Network::Stellar] {
		let chain = config
			.chains
			.iter()
			.find(|c| c.network == network)
			.ok_or_else(|| {
				ConfigError::ValidationError(format!("missing chain config for {}", network))
			})?;

		if chain.mode == ChainMode::Rpc && chain.rpc_url.is_none() {
			return Err(ConfigError::ValidationError(format!(
				"chain {} is in rpc mode but has no rpc_url",
				network
			)));
		}
	}

	let mut chain_ids = std::collections::HashSet::new();
	for chain in &config.chains {
		if !chain_ids.insert(chain.chain_id) {
			return Err(ConfigError::ValidationError(format!(
				"duplicate chain id {}",
				chain.chain_id
			)));
		}
	}

	if config.assets.is_empty() {
		return Err(ConfigError::ValidationError(
			"at least one asset must be configured".to_string(),
		));
	}

	Ok(())
}

impl Config {
	/// Resolves a numeric chain id to its network.
	pub fn network_for_chain_id(&self, chain_id: u64) -> Option<Network> {
		self.chains
			.iter()
			.find(|c| c.chain_id == chain_id)
			.map(|c| c.network)
	}
}
