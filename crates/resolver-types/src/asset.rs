//! Asset configuration types.

use serde::{Deserialize, Serialize};

use crate::Network;

/// Maximum decimal precision an asset may declare.
pub const MAX_DECIMALS: u8 = 18;

/// Static configuration of one tradable asset.
///
/// Immutable after registration except for the liquidity thresholds, which
/// may be adjusted at runtime through the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
	/// On-chain identity: token contract address, or the native asset marker.
	pub address: String,
	/// Ticker symbol, unique per registry.
	pub symbol: String,
	/// Decimal precision, 0..=18.
	pub decimals: u8,
	/// Network the asset lives on.
	pub network: Network,
	/// Whether this is the network's native asset rather than a token.
	#[serde(default)]
	pub is_native: bool,
	/// Liquidity floor the resolver never reserves below, as a decimal string.
	pub min_threshold: String,
	/// Level below which liquidity monitoring starts warning, as a decimal string.
	pub warning_threshold: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn asset_config_deserializes_from_toml_shape() {
		let json = serde_json::json!({
			"address": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
			"symbol": "USDC",
			"decimals": 6,
			"network": "ethereum",
			"min_threshold": "100",
			"warning_threshold": "500"
		});
		let cfg: AssetConfig = serde_json::from_value(json).unwrap();
		assert_eq!(cfg.symbol, "USDC");
		assert_eq!(cfg.network, Network::Ethereum);
		assert!(!cfg.is_native);
	}
}
