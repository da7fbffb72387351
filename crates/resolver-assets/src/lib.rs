//! Asset registry and balance tracking for the resolver.
//!
//! The [`AssetRegistry`] holds the static configuration of every tradable
//! asset and performs exact-precision conversion between human decimal
//! strings and raw on-chain units. The [`BalanceOracle`] layers a TTL cache
//! with stale-fallback over per-chain balance queries.

use alloy_primitives::U256;
use dashmap::DashMap;
use resolver_types::{AssetConfig, LiquidityError, MAX_DECIMALS};

pub mod balance;

pub use balance::{BalanceOracle, BalanceSource};

/// Parses a decimal string into raw units at the given precision.
///
/// Fails with `InvalidAmount` when the string is empty, contains non-digit
/// characters, or carries more fractional digits than the precision allows.
pub fn parse_decimal(value: &str, decimals: u8) -> Result<U256, LiquidityError> {
	let s = value.trim();
	if s.is_empty() {
		return Err(LiquidityError::InvalidAmount(
			"empty amount string".to_string(),
		));
	}

	let (int_part, frac_part) = match s.split_once('.') {
		Some((i, f)) => (i, f),
		None => (s, ""),
	};

	if int_part.is_empty() && frac_part.is_empty() {
		return Err(LiquidityError::InvalidAmount(format!(
			"malformed amount: {}",
			value
		)));
	}

	let digits_only = |p: &str| p.chars().all(|c| c.is_ascii_digit());
	if !digits_only(int_part) || !digits_only(frac_part) {
		return Err(LiquidityError::InvalidAmount(format!(
			"malformed amount: {}",
			value
		)));
	}

	if frac_part.len() > decimals as usize {
		return Err(LiquidityError::InvalidAmount(format!(
			"amount {} has more than {} fractional digits",
			value, decimals
		)));
	}

	let scale = U256::from(10u64).pow(U256::from(decimals));
	let int_val = if int_part.is_empty() {
		U256::ZERO
	} else {
		U256::from_str_radix(int_part, 10)
			.map_err(|_| LiquidityError::InvalidAmount(format!("amount too large: {}", value)))?
	};

	let mut frac_padded = frac_part.to_string();
	while frac_padded.len() < decimals as usize {
		frac_padded.push('0');
	}
	let frac_val = if frac_padded.is_empty() {
		U256::ZERO
	} else {
		U256::from_str_radix(&frac_padded, 10)
			.map_err(|_| LiquidityError::InvalidAmount(format!("malformed amount: {}", value)))?
	};

	int_val
		.checked_mul(scale)
		.and_then(|v| v.checked_add(frac_val))
		.ok_or_else(|| LiquidityError::InvalidAmount(format!("amount too large: {}", value)))
}

/// Formats raw units as an exact decimal string, trailing zeros trimmed.
pub fn format_decimal(raw: U256, decimals: u8) -> String {
	let scale = U256::from(10u64).pow(U256::from(decimals));
	let int_part = raw / scale;
	let frac_part = raw % scale;

	if frac_part.is_zero() {
		return int_part.to_string();
	}

	let mut frac = format!("{:0>width$}", frac_part, width = decimals as usize);
	while frac.ends_with('0') {
		frac.pop();
	}
	format!("{}.{}", int_part, frac)
}

/// Static configuration of every tradable asset, keyed by symbol.
pub struct AssetRegistry {
	assets: DashMap<String, AssetConfig>,
}

impl AssetRegistry {
	pub fn new() -> Self {
		Self {
			assets: DashMap::new(),
		}
	}

	/// Registers an asset, validating its configuration.
	pub fn register(&self, config: AssetConfig) -> Result<(), LiquidityError> {
		if config.address.trim().is_empty() {
			return Err(LiquidityError::Configuration(
				"asset address must not be empty".to_string(),
			));
		}
		if config.symbol.trim().is_empty() {
			return Err(LiquidityError::Configuration(
				"asset symbol must not be empty".to_string(),
			));
		}
		if config.decimals > MAX_DECIMALS {
			return Err(LiquidityError::Configuration(format!(
				"asset {} declares {} decimals, maximum is {}",
				config.symbol, config.decimals, MAX_DECIMALS
			)));
		}
		for (name, value) in [
			("min_threshold", &config.min_threshold),
			("warning_threshold", &config.warning_threshold),
		] {
			parse_decimal(value, config.decimals).map_err(|_| {
				LiquidityError::Configuration(format!(
					"asset {} has non-numeric {}: {}",
					config.symbol, name, value
				))
			})?;
		}

		self.assets.insert(config.symbol.clone(), config);
		Ok(())
	}

	pub fn get(&self, symbol: &str) -> Result<AssetConfig, LiquidityError> {
		self.assets
			.get(symbol)
			.map(|entry| entry.clone())
			.ok_or_else(|| LiquidityError::AssetNotSupported(symbol.to_string()))
	}

	pub fn list(&self) -> Vec<AssetConfig> {
		self.assets.iter().map(|entry| entry.clone()).collect()
	}

	pub fn is_supported(&self, symbol: &str) -> bool {
		self.assets.contains_key(symbol)
	}

	/// Adjusts an asset's liquidity thresholds. The only mutation allowed
	/// after registration.
	pub fn update_thresholds(
		&self,
		symbol: &str,
		min_threshold: &str,
		warning_threshold: &str,
	) -> Result<(), LiquidityError> {
		let mut entry = self
			.assets
			.get_mut(symbol)
			.ok_or_else(|| LiquidityError::AssetNotSupported(symbol.to_string()))?;

		for (name, value) in [
			("min_threshold", min_threshold),
			("warning_threshold", warning_threshold),
		] {
			parse_decimal(value, entry.decimals).map_err(|_| {
				LiquidityError::Configuration(format!(
					"non-numeric {} for {}: {}",
					name, symbol, value
				))
			})?;
		}

		entry.min_threshold = min_threshold.to_string();
		entry.warning_threshold = warning_threshold.to_string();
		Ok(())
	}

	/// Converts a decimal string to raw units at the asset's precision.
	pub fn to_raw(&self, symbol: &str, decimal: &str) -> Result<U256, LiquidityError> {
		let config = self.get(symbol)?;
		parse_decimal(decimal, config.decimals)
	}

	/// Converts raw units to an exact decimal string.
	pub fn to_decimal(&self, symbol: &str, raw: U256) -> Result<String, LiquidityError> {
		let config = self.get(symbol)?;
		Ok(format_decimal(raw, config.decimals))
	}

	/// The asset's minimum liquidity threshold in raw units.
	pub fn min_threshold_raw(&self, symbol: &str) -> Result<U256, LiquidityError> {
		let config = self.get(symbol)?;
		parse_decimal(&config.min_threshold, config.decimals)
	}

	/// The asset's warning threshold in raw units.
	pub fn warning_threshold_raw(&self, symbol: &str) -> Result<U256, LiquidityError> {
		let config = self.get(symbol)?;
		parse_decimal(&config.warning_threshold, config.decimals)
	}

	/// Raw-amount addition, failing on overflow instead of wrapping.
	pub fn add_amounts(&self, symbol: &str, a: U256, b: U256) -> Result<U256, LiquidityError> {
		a.checked_add(b).ok_or_else(|| {
			LiquidityError::InvalidAmount(format!("amount overflow for {}", symbol))
		})
	}

	/// Raw-amount subtraction, failing when the result would go negative.
	pub fn sub_amounts(&self, symbol: &str, a: U256, b: U256) -> Result<U256, LiquidityError> {
		a.checked_sub(b).ok_or_else(|| {
			LiquidityError::InvalidAmount(format!(
				"subtraction underflow for {}: {} - {}",
				symbol, a, b
			))
		})
	}
}

impl Default for AssetRegistry {
	fn default() -> Self {
		Self::new()
	}
}
