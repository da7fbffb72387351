//! Error taxonomies for the resolver system.
//!
//! Two distinct families: [`LiquidityError`] covers the resolver's own
//! balance and reservation domain, [`HtlcError`] mirrors the failure modes
//! of the remote HTLC contracts on either chain.

use alloy_primitives::U256;
use thiserror::Error;

use crate::Network;

/// Errors from the liquidity domain: asset registry, balance oracle,
/// reservation ledger and liquidity coordination.
#[derive(Debug, Clone, Error)]
pub enum LiquidityError {
	#[error("insufficient balance for {asset}: need {needed}, available {available}")]
	InsufficientBalance {
		asset: String,
		needed: U256,
		available: U256,
	},

	#[error("asset not supported: {0}")]
	AssetNotSupported(String),

	#[error("reservation failed for order {order_id}: {reason}")]
	ReservationFailed { order_id: String, reason: String },

	#[error("balance fetch failed for {asset} on {network}: {reason}")]
	BalanceFetchFailed {
		network: Network,
		asset: String,
		reason: String,
	},

	#[error("invalid amount: {0}")]
	InvalidAmount(String),

	#[error("network error: {0}")]
	Network(String),

	#[error("reservation expired for order {order_id}")]
	ReservationExpired { order_id: String },

	#[error("configuration error: {0}")]
	Configuration(String),
}

impl LiquidityError {
	/// Stable machine-readable code, used in API error payloads.
	pub fn code(&self) -> &'static str {
		match self {
			LiquidityError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
			LiquidityError::AssetNotSupported(_) => "ASSET_NOT_SUPPORTED",
			LiquidityError::ReservationFailed { .. } => "RESERVATION_FAILED",
			LiquidityError::BalanceFetchFailed { .. } => "BALANCE_FETCH_FAILED",
			LiquidityError::InvalidAmount(_) => "INVALID_AMOUNT",
			LiquidityError::Network(_) => "NETWORK_ERROR",
			LiquidityError::ReservationExpired { .. } => "RESERVATION_EXPIRED",
			LiquidityError::Configuration(_) => "CONFIGURATION_ERROR",
		}
	}
}

/// Failure modes of the remote HTLC contract surface.
///
/// Both chains expose the same shape; only the hash primitive differs.
#[derive(Debug, Clone, Error)]
pub enum HtlcError {
	#[error("contract not found: {0}")]
	ContractNotFound(String),

	#[error("invalid preimage")]
	InvalidPreimage,

	#[error("timelock expired")]
	TimelockExpired,

	#[error("timelock not expired")]
	TimelockNotExpired,

	#[error("unauthorized")]
	Unauthorized,

	#[error("already withdrawn")]
	AlreadyWithdrawn,

	#[error("already refunded")]
	AlreadyRefunded,

	#[error("partial fills not allowed")]
	PartialFillsNotAllowed,

	#[error("fill below minimum: requested {requested}, minimum {minimum}")]
	BelowMinimumFill { requested: U256, minimum: U256 },

	#[error("insufficient remaining amount: requested {requested}, remaining {remaining}")]
	InsufficientRemainingAmount { requested: U256, remaining: U256 },

	#[error("invalid amount")]
	InvalidAmount,

	#[error("invalid timelock")]
	InvalidTimelock,

	#[error("insufficient balance")]
	InsufficientBalance,

	#[error("network error: {0}")]
	Network(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn liquidity_error_codes_are_stable() {
		let err = LiquidityError::InsufficientBalance {
			asset: "XLM".into(),
			needed: U256::from(10),
			available: U256::from(4),
		};
		assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
		assert_eq!(
			LiquidityError::AssetNotSupported("DOGE".into()).code(),
			"ASSET_NOT_SUPPORTED"
		);
	}
}
