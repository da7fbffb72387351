//! Strongly-typed resolver configuration.
//!
//! Every recognized field is enumerated here; unknown keys fail parsing
//! rather than being silently carried along.

use resolver_types::{AssetConfig, Network};
use serde::{Deserialize, Serialize};

/// Top-level configuration for a resolver instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	/// Core resolver settings: identity and logging.
	pub resolver: ResolverSettings,
	/// REST API server settings.
	pub api: ApiConfig,
	/// Dutch auction engine settings.
	#[serde(default)]
	pub auction: AuctionConfig,
	/// Liquidity and reservation settings.
	#[serde(default)]
	pub liquidity: LiquidityConfig,
	/// Order book settings.
	#[serde(default)]
	pub orderbook: OrderBookConfig,
	/// Chain endpoints, one per network.
	pub chains: Vec<ChainConfig>,
	/// Tradable assets registered at startup.
	pub assets: Vec<AssetConfig>,
}

/// Core resolver identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverSettings {
	/// Unique name for this resolver instance.
	pub name: String,
	/// Logging level for the service.
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Resolver account address per network, used as the HTLC sender.
	pub ethereum_address: String,
	pub stellar_address: String,
}

/// REST API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
	#[serde(default = "default_host")]
	pub host: String,
	pub port: u16,
}

/// Dutch auction engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuctionConfig {
	/// Length of each order's auction window, in seconds.
	pub duration_secs: u64,
	/// Delay before a pending order's auction activates, in seconds.
	pub activation_delay_secs: u64,
	/// Interval of the re-pricing tick, in seconds.
	pub price_tick_secs: u64,
	/// Interval of the auction scan tick, in seconds.
	pub scan_tick_secs: u64,
}

impl Default for AuctionConfig {
	fn default() -> Self {
		Self {
			duration_secs: 120,
			activation_delay_secs: 2,
			price_tick_secs: 5,
			scan_tick_secs: 10,
		}
	}
}

/// Liquidity and reservation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiquidityConfig {
	/// How long a reservation lives before the sweep releases it, in seconds.
	pub reservation_ttl_secs: u64,
	/// Interval of the expired-reservation sweep, in seconds.
	pub sweep_interval_secs: u64,
	/// Interval of the per-asset health check, in seconds.
	pub health_interval_secs: u64,
	/// Time-to-live of cached balances, in seconds.
	pub balance_ttl_secs: u64,
	/// Interval of the balance refresh monitor, in seconds.
	pub balance_monitor_secs: u64,
}

impl Default for LiquidityConfig {
	fn default() -> Self {
		Self {
			reservation_ttl_secs: 300,
			sweep_interval_secs: 60,
			health_interval_secs: 60,
			balance_ttl_secs: 30,
			balance_monitor_secs: 30,
		}
	}
}

/// Order book settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrderBookConfig {
	/// Interval of the expiry/retention sweep, in seconds.
	pub sweep_interval_secs: u64,
	/// How long terminal orders are retained, in seconds.
	pub retention_secs: u64,
}

impl Default for OrderBookConfig {
	fn default() -> Self {
		Self {
			sweep_interval_secs: 600,
			retention_secs: 86_400,
		}
	}
}

/// One chain endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
	pub network: Network,
	/// Numeric chain id orders reference.
	pub chain_id: u64,
	/// Adapter mode: `rpc` talks JSON-RPC to `rpc_url`, `simulated` runs the
	/// in-process chain.
	#[serde(default)]
	pub mode: ChainMode,
	#[serde(default)]
	pub rpc_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
	Rpc,
	#[default]
	Simulated,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_host() -> String {
	"0.0.0.0".to_string()
}
