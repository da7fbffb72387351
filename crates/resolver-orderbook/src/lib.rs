//! Order book: swap-intent lifecycle from submission to sweep.
//!
//! Owns every [`Order`] exclusively; all mutation goes through
//! [`OrderBook::update_order_status`]. Orders are hashed from their economic
//! parameters plus creation time, assigned an auction window on entry, and
//! promoted from `Pending` to `AuctionActive` after a short delay.

use alloy_primitives::keccak256;
use dashmap::DashMap;
use resolver_types::{
	now_secs, EventBus, Order, OrderBookEvent, OrderFilter, OrderParams, OrderStatus,
	ResolverEvent,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Fraction of the nominal exchange value used as the auction's slippage
/// floor.
const RESERVE_PRICE_FACTOR: f64 = 0.95;

#[derive(Debug, Error)]
pub enum OrderBookError {
	#[error("invalid order: {0}")]
	InvalidOrder(String),

	#[error("order hash collision: {0}")]
	HashCollision(String),

	#[error("order not found: {0}")]
	NotFound(String),

	#[error("order {hash} cannot be cancelled in status {status}")]
	InvalidCancellation { hash: String, status: OrderStatus },
}

pub struct OrderBook {
	orders: DashMap<String, Order>,
	auction_duration: Duration,
	activation_delay: Duration,
	retention: Duration,
	events: EventBus,
}

impl OrderBook {
	pub fn new(
		auction_duration: Duration,
		activation_delay: Duration,
		retention: Duration,
		events: EventBus,
	) -> Self {
		Self {
			orders: DashMap::new(),
			auction_duration,
			activation_delay,
			retention,
			events,
		}
	}

	/// Creates an order, assigns its auction window, and schedules the
	/// delayed `Pending -> AuctionActive` transition.
	pub fn create_order(self: &Arc<Self>, params: OrderParams) -> Result<Order, OrderBookError> {
		let making: f64 = params
			.making_amount
			.parse()
			.map_err(|_| OrderBookError::InvalidOrder("malformed making amount".to_string()))?;
		let taking: f64 = params
			.taking_amount
			.parse()
			.map_err(|_| OrderBookError::InvalidOrder("malformed taking amount".to_string()))?;
		if making <= 0.0 || taking <= 0.0 {
			return Err(OrderBookError::InvalidOrder(
				"amounts must be positive".to_string(),
			));
		}
		for (name, value) in [
			("maker", &params.maker),
			("receiver", &params.receiver),
			("maker asset", &params.maker_asset),
			("taker asset", &params.taker_asset),
		] {
			if value.trim().is_empty() {
				return Err(OrderBookError::InvalidOrder(format!("empty {}", name)));
			}
		}
		let now = now_secs();
		if params.timelock <= now {
			return Err(OrderBookError::InvalidOrder(
				"timelock must be in the future".to_string(),
			));
		}

		let hash = order_hash(&params);
		if self.orders.contains_key(&hash) {
			return Err(OrderBookError::HashCollision(hash));
		}

		let order = Order {
			hash: hash.clone(),
			maker: params.maker,
			receiver: params.receiver,
			maker_asset: params.maker_asset,
			taker_asset: params.taker_asset,
			making_amount: params.making_amount,
			taking_amount: params.taking_amount,
			src_chain_id: params.src_chain_id,
			dst_chain_id: params.dst_chain_id,
			timelock: params.timelock,
			status: OrderStatus::Pending,
			created_at: now,
			auction_start_time: now,
			auction_end_time: now + self.auction_duration.as_secs(),
			reserve_price: taking * RESERVE_PRICE_FACTOR,
			metadata: HashMap::new(),
		};

		self.orders.insert(hash.clone(), order.clone());
		info!(
			order_hash = %hash,
			maker_asset = %order.maker_asset,
			taker_asset = %order.taker_asset,
			auction_end = order.auction_end_time,
			"order created"
		);
		self.events
			.publish(ResolverEvent::Order(OrderBookEvent::Created {
				order: Box::new(order.clone()),
			}))
			.ok();

		// Delayed activation: the auction opens shortly after creation.
		let book = Arc::clone(self);
		let activation_hash = hash;
		tokio::spawn(async move {
			tokio::time::sleep(book.activation_delay).await;
			let still_pending = book
				.orders
				.get(&activation_hash)
				.map(|o| o.status == OrderStatus::Pending)
				.unwrap_or(false);
			if still_pending {
				book.update_order_status(&activation_hash, OrderStatus::AuctionActive, None)
					.ok();
			}
		});

		Ok(order)
	}

	/// Applies a status transition, merging any metadata.
	///
	/// Transition legality is not validated here; callers sequence the
	/// lifecycle.
	pub fn update_order_status(
		&self,
		hash: &str,
		status: OrderStatus,
		metadata: Option<HashMap<String, serde_json::Value>>,
	) -> Result<Order, OrderBookError> {
		let mut entry = self
			.orders
			.get_mut(hash)
			.ok_or_else(|| OrderBookError::NotFound(hash.to_string()))?;

		let previous = entry.status;
		entry.status = status;
		if let Some(metadata) = metadata {
			entry.metadata.extend(metadata);
		}
		info!(order_hash = %hash, from = %previous, to = %status, "order status changed");

		let updated = entry.clone();
		drop(entry);

		self.events
			.publish(ResolverEvent::Order(OrderBookEvent::StatusChanged {
				order_hash: hash.to_string(),
				status,
			}))
			.ok();
		Ok(updated)
	}

	pub fn get_order(&self, hash: &str) -> Option<Order> {
		self.orders.get(hash).map(|entry| entry.clone())
	}

	pub fn list_orders(&self, filter: &OrderFilter) -> Vec<Order> {
		let mut orders: Vec<Order> = self
			.orders
			.iter()
			.filter(|entry| {
				filter.status.map_or(true, |s| entry.status == s)
					&& filter
						.maker
						.as_ref()
						.map_or(true, |m| entry.maker.eq_ignore_ascii_case(m))
			})
			.map(|entry| entry.clone())
			.collect();
		orders.sort_by_key(|o| std::cmp::Reverse(o.created_at));
		orders
	}

	/// Orders currently in their auction window.
	pub fn active_auctions(&self) -> Vec<Order> {
		self.orders
			.iter()
			.filter(|entry| entry.status == OrderStatus::AuctionActive)
			.map(|entry| entry.clone())
			.collect()
	}

	/// Cancels an order that has not yet reached HTLC creation.
	pub fn cancel_order(&self, hash: &str) -> Result<Order, OrderBookError> {
		let status = self
			.orders
			.get(hash)
			.map(|o| o.status)
			.ok_or_else(|| OrderBookError::NotFound(hash.to_string()))?;

		if !matches!(status, OrderStatus::Pending | OrderStatus::AuctionActive) {
			return Err(OrderBookError::InvalidCancellation {
				hash: hash.to_string(),
				status,
			});
		}
		self.update_order_status(hash, OrderStatus::Cancelled, None)
	}

	/// Marks past-window auctions expired and drops terminal orders past the
	/// retention window. Returns (expired, removed).
	pub fn sweep(&self) -> (usize, usize) {
		let now = now_secs();

		let stale: Vec<String> = self
			.orders
			.iter()
			.filter(|entry| {
				entry.status == OrderStatus::AuctionActive && now > entry.auction_end_time
			})
			.map(|entry| entry.hash.clone())
			.collect();
		for hash in &stale {
			self.update_order_status(hash, OrderStatus::Expired, None).ok();
		}

		let cutoff = now.saturating_sub(self.retention.as_secs());
		let old: Vec<String> = self
			.orders
			.iter()
			.filter(|entry| entry.status.is_terminal() && entry.created_at < cutoff)
			.map(|entry| entry.hash.clone())
			.collect();
		for hash in &old {
			self.orders.remove(hash);
			debug!(order_hash = %hash, "old terminal order removed");
			self.events
				.publish(ResolverEvent::Order(OrderBookEvent::Removed {
					order_hash: hash.clone(),
				}))
				.ok();
		}

		(stale.len(), old.len())
	}

	/// Spawns the periodic expiry/retention sweep.
	pub fn spawn_sweep(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
			loop {
				ticker.tick().await;
				let (expired, removed) = self.sweep();
				if expired > 0 || removed > 0 {
					info!(expired, removed, "order book sweep");
				}
			}
		})
	}

	/// Order counts by status.
	pub fn counts_by_status(&self) -> HashMap<OrderStatus, usize> {
		let mut counts = HashMap::new();
		for entry in self.orders.iter() {
			*counts.entry(entry.status).or_insert(0) += 1;
		}
		counts
	}

	pub fn len(&self) -> usize {
		self.orders.len()
	}

	pub fn is_empty(&self) -> bool {
		self.orders.is_empty()
	}
}

/// Hashes an order's economic parameters together with the submission
/// instant. Not reproducible from logical content alone: a retried
/// submission with identical economics produces a different hash.
fn order_hash(params: &OrderParams) -> String {
	let nanos = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.unwrap()
		.as_nanos();

	let mut buf = Vec::new();
	for field in [
		params.maker.as_str(),
		params.receiver.as_str(),
		params.maker_asset.as_str(),
		params.taker_asset.as_str(),
		params.making_amount.as_str(),
		params.taking_amount.as_str(),
	] {
		buf.extend_from_slice(field.as_bytes());
		buf.push(0);
	}
	buf.extend_from_slice(&params.src_chain_id.to_be_bytes());
	buf.extend_from_slice(&params.dst_chain_id.to_be_bytes());
	buf.extend_from_slice(&params.timelock.to_be_bytes());
	buf.extend_from_slice(&nanos.to_be_bytes());

	format!("0x{}", hex::encode(keccak256(&buf)))
}
