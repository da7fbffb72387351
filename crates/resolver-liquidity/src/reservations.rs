//! Reservation ledger: provisional, time-bounded holds against the
//! resolver's own balances.

use alloy_primitives::U256;
use resolver_types::{
	now_secs, EventBus, LiquidityError, LiquidityEvent, ResolverEvent, Timestamp,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use resolver_assets::AssetRegistry;

/// One provisional hold: an order's claim on part of an asset's balance.
#[derive(Debug, Clone, Serialize)]
pub struct AssetReservation {
	pub order_id: String,
	pub asset: String,
	pub amount: U256,
	pub created_at: Timestamp,
	pub expires_at: Timestamp,
}

#[derive(Default)]
struct LedgerInner {
	/// Insertion-ordered, so traversal is FIFO by creation time.
	reservations: Vec<AssetReservation>,
	/// Per-asset reserved totals; always equals the sum of live
	/// reservations for that asset.
	totals: HashMap<String, U256>,
}

impl LedgerInner {
	fn debit_total(&mut self, asset: &str, amount: U256) {
		let drained = match self.totals.get_mut(asset) {
			Some(total) => {
				*total = total.saturating_sub(amount);
				total.is_zero()
			}
			None => false,
		};
		if drained {
			self.totals.remove(asset);
		}
	}
}

/// Tracks how much of each asset is provisionally committed to orders.
///
/// All mutation happens under one mutex, so availability checks and
/// reservation inserts form a single critical section; two orders racing
/// for the same asset cannot both pass the check.
pub struct ReservationLedger {
	registry: Arc<AssetRegistry>,
	inner: Mutex<LedgerInner>,
	ttl: Duration,
	events: EventBus,
}

impl ReservationLedger {
	pub fn new(registry: Arc<AssetRegistry>, ttl: Duration, events: EventBus) -> Self {
		Self {
			registry,
			inner: Mutex::new(LedgerInner::default()),
			ttl,
			events,
		}
	}

	/// Reserves `amount` of `asset` for an order.
	///
	/// Returns `Ok(false)` when the order already holds a reservation for
	/// this asset: an idempotence guard, not a failure.
	pub fn reserve(
		&self,
		order_id: &str,
		asset: &str,
		amount: U256,
	) -> Result<bool, LiquidityError> {
		self.validate(order_id, asset, amount)?;

		let mut inner = self.inner.lock().unwrap();
		self.insert_locked(&mut inner, order_id, asset, amount)
	}

	/// Reserves `amount` only if the asset's availability check passes,
	/// evaluated inside the same critical section as the insert.
	///
	/// `balance` is the caller's balance snapshot; `min_threshold` is the
	/// floor the asset may never be reserved below. Both availability
	/// conditions are enforced: the amount must fit, and what remains must
	/// stay at or above the floor.
	pub fn try_reserve(
		&self,
		order_id: &str,
		asset: &str,
		amount: U256,
		balance: U256,
		min_threshold: U256,
	) -> Result<bool, LiquidityError> {
		self.validate(order_id, asset, amount)?;

		let mut inner = self.inner.lock().unwrap();
		let reserved = inner.totals.get(asset).copied().unwrap_or(U256::ZERO);
		let available = balance.saturating_sub(reserved);

		let fits = available >= amount;
		let keeps_floor = fits && available - amount >= min_threshold;
		if !fits || !keeps_floor {
			return Err(LiquidityError::InsufficientBalance {
				asset: asset.to_string(),
				needed: amount,
				available,
			});
		}

		self.insert_locked(&mut inner, order_id, asset, amount)
	}

	fn insert_locked(
		&self,
		inner: &mut LedgerInner,
		order_id: &str,
		asset: &str,
		amount: U256,
	) -> Result<bool, LiquidityError> {
		let duplicate = inner
			.reservations
			.iter()
			.any(|r| r.order_id == order_id && r.asset == asset);
		if duplicate {
			debug!(order_id, asset, "order already holds a reservation for this asset");
			return Ok(false);
		}

		let now = now_secs();
		inner.reservations.push(AssetReservation {
			order_id: order_id.to_string(),
			asset: asset.to_string(),
			amount,
			created_at: now,
			expires_at: now + self.ttl.as_secs(),
		});
		*inner.totals.entry(asset.to_string()).or_insert(U256::ZERO) += amount;

		info!(order_id, asset, %amount, "liquidity reserved");
		self.events
			.publish(ResolverEvent::Liquidity(LiquidityEvent::Reserved {
				order_id: order_id.to_string(),
				asset: asset.to_string(),
				amount,
			}))
			.ok();
		Ok(true)
	}

	/// Releases every reservation held by an order. A no-op when the order
	/// holds none.
	pub fn release(&self, order_id: &str) {
		let released = {
			let mut inner = self.inner.lock().unwrap();
			let mut released = Vec::new();
			inner.reservations.retain(|r| {
				if r.order_id == order_id {
					released.push((r.asset.clone(), r.amount));
					false
				} else {
					true
				}
			});
			for (asset, amount) in &released {
				inner.debit_total(asset, *amount);
			}
			released
		};

		for (asset, amount) in released {
			info!(order_id, asset = %asset, amount = %amount, "liquidity released");
			self.events
				.publish(ResolverEvent::Liquidity(LiquidityEvent::Released {
					order_id: order_id.to_string(),
					asset,
					amount,
				}))
				.ok();
		}
	}

	/// Frees `amount` of an asset by walking its reservations FIFO by
	/// creation time, releasing whole entries and shrinking the last one
	/// touched. Stops once the requested amount is freed.
	pub fn release_by_asset(&self, asset: &str, amount: U256) {
		let mut remaining = amount;
		let released = {
			let mut inner = self.inner.lock().unwrap();
			let mut released = Vec::new();
			let mut index = 0;
			while index < inner.reservations.len() && !remaining.is_zero() {
				if inner.reservations[index].asset != asset {
					index += 1;
					continue;
				}
				if inner.reservations[index].amount <= remaining {
					let r = inner.reservations.remove(index);
					remaining -= r.amount;
					released.push((r.order_id, r.amount));
				} else {
					inner.reservations[index].amount -= remaining;
					released.push((inner.reservations[index].order_id.clone(), remaining));
					remaining = U256::ZERO;
				}
			}
			let freed = amount - remaining;
			inner.debit_total(asset, freed);
			released
		};

		for (order_id, freed) in released {
			info!(order_id = %order_id, asset, amount = %freed, "liquidity released by asset");
			self.events
				.publish(ResolverEvent::Liquidity(LiquidityEvent::Released {
					order_id,
					asset: asset.to_string(),
					amount: freed,
				}))
				.ok();
		}
	}

	/// Releases every reservation past its expiry. Returns how many were
	/// swept.
	pub fn sweep_expired(&self) -> usize {
		let now = now_secs();
		let expired = {
			let mut inner = self.inner.lock().unwrap();
			let mut expired = Vec::new();
			inner.reservations.retain(|r| {
				if r.expires_at <= now {
					expired.push(r.clone());
					false
				} else {
					true
				}
			});
			for r in &expired {
				inner.debit_total(&r.asset, r.amount);
			}
			expired
		};

		for r in &expired {
			info!(
				order_id = %r.order_id,
				asset = %r.asset,
				amount = %r.amount,
				expired_at = r.expires_at,
				"expired reservation released"
			);
			self.events
				.publish(ResolverEvent::Liquidity(LiquidityEvent::Released {
					order_id: r.order_id.clone(),
					asset: r.asset.clone(),
					amount: r.amount,
				}))
				.ok();
		}
		expired.len()
	}

	/// Spawns the periodic sweep of expired reservations.
	pub fn spawn_sweep(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
			loop {
				ticker.tick().await;
				let swept = self.sweep_expired();
				if swept > 0 {
					info!(count = swept, "reservation sweep released expired holds");
				}
			}
		})
	}

	/// Total currently reserved for an asset.
	pub fn reserved(&self, asset: &str) -> U256 {
		self.inner
			.lock()
			.unwrap()
			.totals
			.get(asset)
			.copied()
			.unwrap_or(U256::ZERO)
	}

	/// Snapshot of all per-asset reserved totals.
	pub fn totals(&self) -> HashMap<String, U256> {
		self.inner.lock().unwrap().totals.clone()
	}

	/// The reservations an order currently holds.
	pub fn reservations_for(&self, order_id: &str) -> Vec<AssetReservation> {
		self.inner
			.lock()
			.unwrap()
			.reservations
			.iter()
			.filter(|r| r.order_id == order_id)
			.cloned()
			.collect()
	}

	fn validate(&self, order_id: &str, asset: &str, amount: U256) -> Result<(), LiquidityError> {
		if order_id.trim().is_empty() {
			return Err(LiquidityError::ReservationFailed {
				order_id: order_id.to_string(),
				reason: "empty order id".to_string(),
			});
		}
		if !self.registry.is_supported(asset) {
			return Err(LiquidityError::AssetNotSupported(asset.to_string()));
		}
		if amount.is_zero() {
			return Err(LiquidityError::InvalidAmount(
				"reservation amount must be positive".to_string(),
			));
		}
		Ok(())
	}
}
