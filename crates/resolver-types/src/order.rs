//! Swap order types and lifecycle.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::Timestamp;

/// Lifecycle states of a swap order.
///
/// Orders move `Pending -> AuctionActive` shortly after creation, then to one
/// of the terminal states. The book does not validate transition legality;
/// callers are responsible for sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	Pending,
	AuctionActive,
	HtlcCreated,
	Filled,
	Expired,
	Cancelled,
}

impl OrderStatus {
	/// Terminal states are swept from the book after the retention window.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			OrderStatus::Filled | OrderStatus::Expired | OrderStatus::Cancelled
		)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			OrderStatus::Pending => "pending",
			OrderStatus::AuctionActive => "auction_active",
			OrderStatus::HtlcCreated => "htlc_created",
			OrderStatus::Filled => "filled",
			OrderStatus::Expired => "expired",
			OrderStatus::Cancelled => "cancelled",
		};
		write!(f, "{}", s)
	}
}

/// A cross-chain swap intent with its assigned auction window.
///
/// The hash is derived from the economic parameters plus creation time, so a
/// retried submission with identical economics produces a different hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Unique 0x-prefixed keccak256 hash identifying this order.
	pub hash: String,
	/// Account that submitted the swap intent.
	pub maker: String,
	/// Account that receives the taker asset on the destination chain.
	pub receiver: String,
	/// Symbol of the asset the maker is selling.
	pub maker_asset: String,
	/// Symbol of the asset the maker is buying.
	pub taker_asset: String,
	/// Amount of the maker asset, as a decimal string.
	pub making_amount: String,
	/// Amount of the taker asset, as a decimal string.
	pub taking_amount: String,
	/// Chain id the maker asset lives on.
	pub src_chain_id: u64,
	/// Chain id the taker asset lives on.
	pub dst_chain_id: u64,
	/// Absolute Unix timestamp after which the HTLC legs become refundable.
	pub timelock: Timestamp,
	pub status: OrderStatus,
	pub created_at: Timestamp,
	pub auction_start_time: Timestamp,
	pub auction_end_time: Timestamp,
	/// Slippage floor: 95% of the nominal exchange value, in taker-asset units.
	pub reserve_price: f64,
	/// Free-form metadata merged in by status updates.
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub metadata: HashMap<String, serde_json::Value>,
}

/// Parameters for creating a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderParams {
	pub maker: String,
	pub receiver: String,
	pub maker_asset: String,
	pub taker_asset: String,
	pub making_amount: String,
	pub taking_amount: String,
	pub src_chain_id: u64,
	pub dst_chain_id: u64,
	pub timelock: Timestamp,
}

/// Filters for listing orders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
	pub status: Option<OrderStatus>,
	pub maker: Option<String>,
}

/// A resolver's bid on an order's Dutch auction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
	pub order_hash: String,
	pub bidder: String,
	pub price: f64,
	pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_serializes_snake_case() {
		let s = serde_json::to_string(&OrderStatus::AuctionActive).unwrap();
		assert_eq!(s, "\"auction_active\"");
		assert_eq!(OrderStatus::HtlcCreated.to_string(), "htlc_created");
	}

	#[test]
	fn terminal_states() {
		assert!(OrderStatus::Filled.is_terminal());
		assert!(OrderStatus::Expired.is_terminal());
		assert!(OrderStatus::Cancelled.is_terminal());
		assert!(!OrderStatus::AuctionActive.is_terminal());
		assert!(!OrderStatus::HtlcCreated.is_terminal());
	}
}
