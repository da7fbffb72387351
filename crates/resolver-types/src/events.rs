//! Event bus and lifecycle events.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{Network, Order, OrderStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResolverEvent {
	Order(OrderBookEvent),
	Auction(AuctionEvent),
	Liquidity(LiquidityEvent),
	Settlement(SettlementEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderBookEvent {
	Created { order: Box<Order> },
	StatusChanged { order_hash: String, status: OrderStatus },
	Removed { order_hash: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuctionEvent {
	BidPlaced {
		order_hash: String,
		bidder: String,
		price: f64,
	},
	Settled {
		order_hash: String,
		winner: String,
		price: f64,
	},
	Expired {
		order_hash: String,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LiquidityEvent {
	Reserved {
		order_id: String,
		asset: String,
		amount: U256,
	},
	Released {
		order_id: String,
		asset: String,
		amount: U256,
	},
	BalanceChanged {
		network: Network,
		asset: String,
		previous: U256,
		current: U256,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettlementEvent {
	PairCreated { order_hash: String },
	SecretRevealed { order_hash: String },
	Completed { order_hash: String },
	Refunded { order_hash: String },
}

/// Broadcast bus the components publish lifecycle events onto.
///
/// Publishing never fails the caller: events are observability, not control
/// flow, and a bus with no subscribers simply drops them.
pub struct EventBus {
	sender: broadcast::Sender<ResolverEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ResolverEvent> {
		self.sender.subscribe()
	}

	pub fn publish(
		&self,
		event: ResolverEvent,
	) -> Result<(), broadcast::error::SendError<ResolverEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}
