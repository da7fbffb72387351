//! Liquidity coordination: can an order be filled, and reserving the funds
//! to fill it.
//!
//! Composes the balance oracle and the reservation ledger. The availability
//! rule is two-part and both parts are mandatory: the requested amount must
//! fit in `balance - reserved`, and what remains afterwards must stay at or
//! above the asset's minimum threshold. Liquidity is never reserved down to
//! zero.

use alloy_primitives::U256;
use resolver_types::LiquidityError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, warn};

pub mod reservations;

pub use reservations::{AssetReservation, ReservationLedger};

use resolver_assets::{AssetRegistry, BalanceOracle};

/// Structured answer to "can this order be filled", for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum LiquidityVerdict {
	Sufficient,
	InsufficientBalance { needed: U256, available: U256 },
	WouldBreachMinimum { remaining: U256, minimum: U256 },
}

/// Per-asset liquidity health against the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityHealth {
	Healthy,
	Warning,
	Critical,
}

pub struct LiquidityCoordinator {
	registry: Arc<AssetRegistry>,
	oracle: Arc<BalanceOracle>,
	ledger: Arc<ReservationLedger>,
}

impl LiquidityCoordinator {
	pub fn new(
		registry: Arc<AssetRegistry>,
		oracle: Arc<BalanceOracle>,
		ledger: Arc<ReservationLedger>,
	) -> Self {
		Self {
			registry,
			oracle,
			ledger,
		}
	}

	/// Whether `amount` of `asset` can be reserved without breaching the
	/// asset's minimum threshold.
	pub async fn has_liquidity(&self, asset: &str, amount: U256) -> Result<bool, LiquidityError> {
		Ok(matches!(
			self.can_handle_order(asset, amount).await?,
			LiquidityVerdict::Sufficient
		))
	}

	/// Explains whether and why an order of `amount` can or cannot be
	/// handled.
	pub async fn can_handle_order(
		&self,
		asset: &str,
		amount: U256,
	) -> Result<LiquidityVerdict, LiquidityError> {
		let config = self.registry.get(asset)?;
		let minimum = self.registry.min_threshold_raw(asset)?;
		let balance = self.oracle.get_balance(config.network, asset).await?;
		let reserved = self.ledger.reserved(asset);
		let available = balance.saturating_sub(reserved);

		if available < amount {
			return Ok(LiquidityVerdict::InsufficientBalance {
				needed: amount,
				available,
			});
		}
		let remaining = available - amount;
		if remaining < minimum {
			return Ok(LiquidityVerdict::WouldBreachMinimum { remaining, minimum });
		}
		Ok(LiquidityVerdict::Sufficient)
	}

	/// Reserves liquidity for an order.
	///
	/// The balance is snapshotted first; the availability check and the
	/// reservation insert then execute inside the ledger's critical section,
	/// so two orders racing for the same asset cannot both pass. Returns
	/// `Ok(false)` when the order already holds a reservation for the asset.
	pub async fn reserve_liquidity(
		&self,
		order_id: &str,
		asset: &str,
		amount: U256,
	) -> Result<bool, LiquidityError> {
		let config = self.registry.get(asset)?;
		let minimum = self.registry.min_threshold_raw(asset)?;
		let balance = self.oracle.get_balance(config.network, asset).await?;

		self.ledger
			.try_reserve(order_id, asset, amount, balance, minimum)
	}

	/// Releases every reservation an order holds. Always safe to call.
	pub fn release_liquidity(&self, order_id: &str) {
		self.ledger.release(order_id);
	}

	/// Current health of one asset's liquidity.
	pub async fn asset_status(&self, asset: &str) -> Result<LiquidityHealth, LiquidityError> {
		let config = self.registry.get(asset)?;
		let minimum = self.registry.min_threshold_raw(asset)?;
		let warning = self.registry.warning_threshold_raw(asset)?;
		let balance = self.oracle.get_balance(config.network, asset).await?;
		let available = balance.saturating_sub(self.ledger.reserved(asset));

		Ok(if available <= minimum {
			LiquidityHealth::Critical
		} else if available <= warning {
			LiquidityHealth::Warning
		} else {
			LiquidityHealth::Healthy
		})
	}

	/// Spawns the periodic health monitor. It logs alerts only; it does not
	/// remediate.
	pub fn spawn_monitor(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
			loop {
				ticker.tick().await;
				for config in self.registry.list() {
					match self.asset_status(&config.symbol).await {
						Ok(LiquidityHealth::Healthy) => {}
						Ok(LiquidityHealth::Warning) => {
							warn!(asset = %config.symbol, "liquidity below warning threshold");
						}
						Ok(LiquidityHealth::Critical) => {
							error!(asset = %config.symbol, "liquidity at or below minimum threshold");
						}
						Err(err) => {
							warn!(asset = %config.symbol, error = %err, "liquidity health check failed");
						}
					}
				}
			}
		})
	}

	pub fn ledger(&self) -> &Arc<ReservationLedger> {
		&self.ledger
	}
}

impl std::fmt::Debug for LiquidityCoordinator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LiquidityCoordinator").finish()
	}
}
