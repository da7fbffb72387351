//! Dutch auction engine: pricing, bid decisions and winner settlement.
//!
//! Each pricing tick walks the active auctions, computes the current
//! descending price, and decides whether the resolver should bid. A bid
//! reserves liquidity first and creates the cross-chain HTLC pair second;
//! if HTLC creation fails the reservation is released before the failure
//! surfaces, so a failed bid never strands liquidity. The scan tick settles
//! auctions past their window: best price wins, ties broken by earliest
//! bid.

use alloy_primitives::U256;
use dashmap::DashMap;
use resolver_types::{
	now_secs, AuctionEvent, Bid, EventBus, LiquidityError, Order, OrderStatus, ResolverEvent,
	Timestamp,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use resolver_assets::{AssetRegistry, BalanceOracle};
use resolver_liquidity::LiquidityCoordinator;
use resolver_orderbook::{OrderBook, OrderBookError};
use resolver_settlement::{CrossChainCoordinator, SettlementError};

/// Price multiplier at auction start: 105% of the nominal rate.
pub const START_MULTIPLIER: f64 = 1.05;
/// Price multiplier at auction end: 95% of the nominal rate.
pub const END_MULTIPLIER: f64 = 0.95;

#[derive(Debug, Error)]
pub enum AuctionError {
	#[error(transparent)]
	Liquidity(#[from] LiquidityError),

	#[error(transparent)]
	Settlement(#[from] SettlementError),

	#[error(transparent)]
	OrderBook(#[from] OrderBookError),
}

/// The Dutch price of an order at `now`: linear decay from 105% to 95% of
/// the nominal exchange value across the auction window, clamped outside
/// it.
pub fn current_price(order: &Order, now: Timestamp) -> f64 {
	let making: f64 = order.making_amount.parse().unwrap_or(0.0);
	let taking: f64 = order.taking_amount.parse().unwrap_or(0.0);
	if making <= 0.0 {
		return 0.0;
	}

	let duration = order.auction_end_time.saturating_sub(order.auction_start_time);
	let progress = if duration == 0 {
		1.0
	} else {
		let elapsed = now.saturating_sub(order.auction_start_time) as f64;
		(elapsed / duration as f64).clamp(0.0, 1.0)
	};

	let multiplier = START_MULTIPLIER - progress * (START_MULTIPLIER - END_MULTIPLIER);
	making * (taking / making) * multiplier
}

pub struct AuctionEngine {
	orderbook: Arc<OrderBook>,
	liquidity: Arc<LiquidityCoordinator>,
	settlement: Arc<CrossChainCoordinator>,
	oracle: Arc<BalanceOracle>,
	registry: Arc<AssetRegistry>,
	bids: DashMap<String, Vec<Bid>>,
	resolver_id: String,
	events: EventBus,
}

impl AuctionEngine {
	pub fn new(
		orderbook: Arc<OrderBook>,
		liquidity: Arc<LiquidityCoordinator>,
		settlement: Arc<CrossChainCoordinator>,
		oracle: Arc<BalanceOracle>,
		registry: Arc<AssetRegistry>,
		resolver_id: impl Into<String>,
		events: EventBus,
	) -> Self {
		Self {
			orderbook,
			liquidity,
			settlement,
			oracle,
			registry,
			bids: DashMap::new(),
			resolver_id: resolver_id.into(),
			events,
		}
	}

	/// One pricing pass over every active auction still inside its window.
	pub async fn evaluate_auctions(&self) {
		let now = now_secs();
		for order in self.orderbook.active_auctions() {
			if now > order.auction_end_time {
				// The scan pass settles it.
				continue;
			}
			let price = current_price(&order, now);
			debug!(order_hash = %order.hash, price, "auction priced");

			match self.maybe_bid(&order, price).await {
				Ok(true) => {}
				Ok(false) => {}
				Err(err) => {
					warn!(order_hash = %order.hash, error = %err, "bid attempt failed");
				}
			}
		}
	}

	/// Decides whether to bid at `price` and, if so, executes the bid:
	/// reserve liquidity, create the HTLC pair, record the bid.
	///
	/// HTLC-creation failure releases the reservation before the error
	/// surfaces.
	pub async fn maybe_bid(&self, order: &Order, price: f64) -> Result<bool, AuctionError> {
		if !self.pair_supported(order) {
			return Ok(false);
		}
		if price < order.reserve_price {
			return Ok(false);
		}
		if self.has_own_bid(&order.hash) {
			return Ok(false);
		}

		let taking_raw = self
			.registry
			.to_raw(&order.taker_asset, &order.taking_amount)?;
		if !self.passes_fast_check(order, taking_raw).await {
			debug!(order_hash = %order.hash, "fast liquidity pre-check failed");
			return Ok(false);
		}

		let reserved = self
			.liquidity
			.reserve_liquidity(&order.hash, &order.taker_asset, taking_raw)
			.await?;
		if !reserved {
			// An earlier attempt already holds this order's reservation.
			return Ok(false);
		}

		match self.settlement.create_cross_chain_htlcs(order).await {
			Ok(pair) => {
				let bid = Bid {
					order_hash: order.hash.clone(),
					bidder: self.resolver_id.clone(),
					price,
					timestamp: now_secs(),
				};
				self.bids
					.entry(order.hash.clone())
					.or_default()
					.push(bid.clone());

				let metadata = std::collections::HashMap::from([
					(
						"bid_price".to_string(),
						serde_json::json!(price),
					),
					(
						"ethereum_contract_id".to_string(),
						serde_json::json!(pair.ethereum_contract_id),
					),
					(
						"stellar_contract_id".to_string(),
						serde_json::json!(pair.stellar_contract_id),
					),
				]);
				self.orderbook
					.update_order_status(&order.hash, OrderStatus::HtlcCreated, Some(metadata))?;

				info!(order_hash = %order.hash, price, "bid placed with HTLC pair");
				self.events
					.publish(ResolverEvent::Auction(AuctionEvent::BidPlaced {
						order_hash: order.hash.clone(),
						bidder: self.resolver_id.clone(),
						price,
					}))
					.ok();
				Ok(true)
			}
			Err(err) => {
				// The reservation must not outlive the failed bid.
				error!(
					order_hash = %order.hash,
					error = %err,
					"HTLC creation failed, rolling back reservation"
				);
				self.liquidity.release_liquidity(&order.hash);
				Err(err.into())
			}
		}
	}

	/// One settlement pass over auctions past their window.
	pub async fn scan_expired_auctions(&self) {
		let now = now_secs();
		let expired: Vec<Order> = self
			.orderbook
			.active_auctions()
			.into_iter()
			.chain(
				// Orders that already carry our HTLC pair still settle here.
				self.orderbook
					.list_orders(&resolver_types::OrderFilter {
						status: Some(OrderStatus::HtlcCreated),
						maker: None,
					})
					.into_iter(),
			)
			.filter(|order| now > order.auction_end_time)
			.collect();

		for order in expired {
			if let Err(err) = self.settle_expired(&order).await {
				warn!(order_hash = %order.hash, error = %err, "auction settlement failed");
			}
		}
	}

	/// Settles one expired auction: best bid wins, bidless auctions expire.
	async fn settle_expired(&self, order: &Order) -> Result<(), AuctionError> {
		let bids = self
			.bids
			.get(&order.hash)
			.map(|b| b.clone())
			.unwrap_or_default();

		let Some(best) = best_bid(&bids) else {
			self.orderbook
				.update_order_status(&order.hash, OrderStatus::Expired, None)?;
			self.liquidity.release_liquidity(&order.hash);
			info!(order_hash = %order.hash, "auction expired without bids");
			self.events
				.publish(ResolverEvent::Auction(AuctionEvent::Expired {
					order_hash: order.hash.clone(),
				}))
				.ok();
			return Ok(());
		};

		let metadata = std::collections::HashMap::from([
			("winner".to_string(), serde_json::json!(best.bidder)),
			("winning_price".to_string(), serde_json::json!(best.price)),
		]);
		self.orderbook
			.update_order_status(&order.hash, OrderStatus::Filled, Some(metadata))?;
		info!(
			order_hash = %order.hash,
			winner = %best.bidder,
			price = best.price,
			"auction settled"
		);
		self.events
			.publish(ResolverEvent::Auction(AuctionEvent::Settled {
				order_hash: order.hash.clone(),
				winner: best.bidder.clone(),
				price: best.price,
			}))
			.ok();

		if best.bidder == self.resolver_id {
			// Our win: the reservation stays held until the completion watch
			// resolves the swap one way or the other.
			self.settlement.monitor_htlc_completion(order)?;
		} else {
			self.liquidity.release_liquidity(&order.hash);
			// A lost bid may have left our HTLC pair on-chain; the watch's
			// refund timer claws it back at timelock expiry.
			if self.settlement.get_pair(&order.hash).is_some() {
				self.settlement.monitor_htlc_completion(order)?;
			}
		}
		Ok(())
	}

	/// Records a competing resolver's bid.
	pub fn record_external_bid(&self, bid: Bid) {
		self.events
			.publish(ResolverEvent::Auction(AuctionEvent::BidPlaced {
				order_hash: bid.order_hash.clone(),
				bidder: bid.bidder.clone(),
				price: bid.price,
			}))
			.ok();
		self.bids
			.entry(bid.order_hash.clone())
			.or_default()
			.push(bid);
	}

	pub fn bids_for(&self, order_hash: &str) -> Vec<Bid> {
		self.bids
			.get(order_hash)
			.map(|b| b.clone())
			.unwrap_or_default()
	}

	/// Spawns the re-pricing tick.
	pub fn spawn_price_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
			loop {
				ticker.tick().await;
				self.evaluate_auctions().await;
			}
		})
	}

	/// Spawns the expiry scan tick.
	pub fn spawn_scan_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
			loop {
				ticker.tick().await;
				self.scan_expired_auctions().await;
			}
		})
	}

	/// Both assets registered means the resolver trades this pair.
	fn pair_supported(&self, order: &Order) -> bool {
		self.registry.is_supported(&order.maker_asset)
			&& self.registry.is_supported(&order.taker_asset)
	}

	fn has_own_bid(&self, order_hash: &str) -> bool {
		self.bids
			.get(order_hash)
			.map(|bids| bids.iter().any(|b| b.bidder == self.resolver_id))
			.unwrap_or(false)
	}

	/// Fast pre-check against the cached balance only. Looser than the
	/// coordinator's full reserved/threshold check, which still gates the
	/// actual reservation.
	async fn passes_fast_check(&self, order: &Order, taking_raw: U256) -> bool {
		let Ok(config) = self.registry.get(&order.taker_asset) else {
			return false;
		};
		match self
			.oracle
			.cached_balance(config.network, &order.taker_asset)
			.await
		{
			Some(balance) => balance >= taking_raw,
			// No cached value yet: let the full check decide.
			None => true,
		}
	}
}

/// Highest price wins; ties break to the earliest timestamp.
fn best_bid(bids: &[Bid]) -> Option<&Bid> {
	bids.iter().min_by(|a, b| {
		b.price
			.partial_cmp(&a.price)
			.unwrap_or(std::cmp::Ordering::Equal)
			.then(a.timestamp.cmp(&b.timestamp))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use resolver_assets::BalanceOracle;
	use resolver_htlc::{ChainClient, ChainRegistry, SimulatedChain};
	use resolver_liquidity::ReservationLedger;
	use resolver_settlement::ResolverIdentity;
	use resolver_types::{AssetConfig, Network, OrderParams, PairStatus};
	use std::collections::HashMap;

	const ETH_CHAIN: u64 = 11155111;
	const XLM_CHAIN: u64 = 1001;

	fn sample_order(making: &str, taking: &str, start: Timestamp, end: Timestamp) -> Order {
		Order {
			hash: "0xorder".into(),
			maker: "0xmaker".into(),
			receiver: "GRECEIVER".into(),
			maker_asset: "ETH".into(),
			taker_asset: "XLM".into(),
			making_amount: making.into(),
			taking_amount: taking.into(),
			src_chain_id: ETH_CHAIN,
			dst_chain_id: XLM_CHAIN,
			timelock: end + 3600,
			status: OrderStatus::AuctionActive,
			created_at: start,
			auction_start_time: start,
			auction_end_time: end,
			reserve_price: taking.parse::<f64>().unwrap() * 0.95,
			metadata: Default::default(),
		}
	}

	#[test]
	fn price_decays_linearly_from_105_to_95_percent() {
		// makingAmount=10, takingAmount=20 => baseRate=2.
		let order = sample_order("10", "20", 1000, 1100);

		assert!((current_price(&order, 1000) - 21.0).abs() < 1e-9);
		assert!((current_price(&order, 1100) - 19.0).abs() < 1e-9);
		assert!((current_price(&order, 1050) - 20.0).abs() < 1e-9);

		// Monotonically non-increasing inside the window, clamped outside.
		let mut last = f64::INFINITY;
		for now in (1000..=1100).step_by(10) {
			let p = current_price(&order, now);
			assert!(p <= last + 1e-12);
			last = p;
		}
		assert!((current_price(&order, 900) - 21.0).abs() < 1e-9);
		assert!((current_price(&order, 1200) - 19.0).abs() < 1e-9);
	}

	#[test]
	fn best_bid_prefers_price_then_earliness() {
		let bid = |bidder: &str, price: f64, ts: u64| Bid {
			order_hash: "0x1".into(),
			bidder: bidder.into(),
			price,
			timestamp: ts,
		};

		let bids = vec![
			bid("late-high", 99.0, 30),
			bid("early-high", 99.0, 10),
			bid("low", 101.0, 5),
		];
		// 101 beats 99 regardless of time.
		assert_eq!(best_bid(&bids).unwrap().bidder, "low");

		let bids = vec![bid("late", 99.0, 30), bid("early", 99.0, 10)];
		assert_eq!(best_bid(&bids).unwrap().bidder, "early");

		assert!(best_bid(&[]).is_none());
	}

	struct Harness {
		engine: Arc<AuctionEngine>,
		orderbook: Arc<OrderBook>,
		liquidity: Arc<LiquidityCoordinator>,
		settlement: Arc<CrossChainCoordinator>,
		eth_chain: Arc<SimulatedChain>,
		xlm_chain: Arc<SimulatedChain>,
		oracle: Arc<BalanceOracle>,
	}

	/// Full wiring against simulated chains. `xlm_balance` seeds the
	/// resolver's taker-side balance.
	fn harness(xlm_balance: u64, auction_secs: u64) -> Harness {
		let registry = Arc::new(AssetRegistry::new());
		registry
			.register(AssetConfig {
				address: "0xeth".into(),
				symbol: "ETH".into(),
				decimals: 0,
				network: Network::Ethereum,
				is_native: true,
				min_threshold: "0".into(),
				warning_threshold: "0".into(),
			})
			.unwrap();
		registry
			.register(AssetConfig {
				address: "xlm-native".into(),
				symbol: "XLM".into(),
				decimals: 0,
				network: Network::Stellar,
				is_native: true,
				min_threshold: "0".into(),
				warning_threshold: "0".into(),
			})
			.unwrap();

		let eth_chain = Arc::new(SimulatedChain::new(Network::Ethereum));
		let xlm_chain = Arc::new(SimulatedChain::new(Network::Stellar));
		xlm_chain.set_balance("xlm-native", U256::from(xlm_balance));
		let mut chains = ChainRegistry::new();
		chains.register(eth_chain.clone() as Arc<dyn ChainClient>);
		chains.register(xlm_chain.clone() as Arc<dyn ChainClient>);
		let chains = Arc::new(chains);

		let events = EventBus::new(256);
		let oracle = Arc::new(BalanceOracle::new(
			registry.clone(),
			chains.clone(),
			Duration::from_secs(60),
			events.clone(),
		));
		let ledger = Arc::new(ReservationLedger::new(
			registry.clone(),
			Duration::from_secs(300),
			events.clone(),
		));
		let liquidity = Arc::new(LiquidityCoordinator::new(
			registry.clone(),
			oracle.clone(),
			ledger,
		));
		let settlement = Arc::new(CrossChainCoordinator::new(
			chains,
			registry.clone(),
			liquidity.clone(),
			ResolverIdentity {
				ethereum_address: "0xresolver".into(),
				stellar_address: "GRESOLVER".into(),
			},
			HashMap::from([(ETH_CHAIN, Network::Ethereum), (XLM_CHAIN, Network::Stellar)]),
			events.clone(),
		));
		let orderbook = Arc::new(OrderBook::new(
			Duration::from_secs(auction_secs),
			Duration::from_millis(1),
			Duration::from_secs(86_400),
			events.clone(),
		));
		let engine = Arc::new(AuctionEngine::new(
			orderbook.clone(),
			liquidity.clone(),
			settlement.clone(),
			oracle.clone(),
			registry,
			"resolver-1",
			events,
		));

		Harness {
			engine,
			orderbook,
			liquidity,
			settlement,
			eth_chain,
			xlm_chain,
			oracle,
		}
	}

	fn submit(h: &Harness) -> Order {
		let order = h
			.orderbook
			.create_order(OrderParams {
				maker: "0xmaker".into(),
				receiver: "GRECEIVER".into(),
				maker_asset: "ETH".into(),
				taker_asset: "XLM".into(),
				making_amount: "100".into(),
				taking_amount: "100".into(),
				src_chain_id: ETH_CHAIN,
				dst_chain_id: XLM_CHAIN,
				timelock: now_secs() + 3600,
			})
			.unwrap();
		h.orderbook
			.update_order_status(&order.hash, OrderStatus::AuctionActive, None)
			.unwrap();
		h.orderbook.get_order(&order.hash).unwrap()
	}

	#[tokio::test]
	async fn winning_bid_reserves_liquidity_and_creates_the_pair() {
		let h = harness(1000, 120);
		let order = submit(&h);

		// Reserve price 95, opening price 105: the engine bids.
		h.engine.evaluate_auctions().await;

		let updated = h.orderbook.get_order(&order.hash).unwrap();
		assert_eq!(updated.status, OrderStatus::HtlcCreated);
		assert_eq!(
			h.liquidity.ledger().reserved("XLM"),
			U256::from(100)
		);
		let bids = h.engine.bids_for(&order.hash);
		assert_eq!(bids.len(), 1);
		assert_eq!(bids[0].bidder, "resolver-1");
		assert!(h.settlement.get_pair(&order.hash).is_some());

		// A second pass does not double-bid or double-reserve.
		h.engine.evaluate_auctions().await;
		assert_eq!(h.engine.bids_for(&order.hash).len(), 1);
		assert_eq!(h.liquidity.ledger().reserved("XLM"), U256::from(100));
	}

	#[tokio::test]
	async fn failed_htlc_creation_rolls_the_reservation_back() {
		// Balance 105 passes the reservation check for 100 but cannot cover
		// amount + safety deposit (110) at HTLC creation.
		let h = harness(105, 120);
		let order = submit(&h);

		let err = h.engine.maybe_bid(&order, 100.0).await.unwrap_err();
		assert!(matches!(err, AuctionError::Settlement(_)));

		assert_eq!(h.liquidity.ledger().reserved("XLM"), U256::ZERO);
		assert!(h.engine.bids_for(&order.hash).is_empty());
		assert_ne!(
			h.orderbook.get_order(&order.hash).unwrap().status,
			OrderStatus::Filled
		);
	}

	#[tokio::test]
	async fn below_reserve_price_never_bids() {
		let h = harness(1000, 120);
		let order = submit(&h);

		assert!(!h.engine.maybe_bid(&order, 94.9).await.unwrap());
		assert_eq!(h.liquidity.ledger().reserved("XLM"), U256::ZERO);
	}

	#[tokio::test]
	async fn bidless_expiry_releases_and_expires() {
		let h = harness(1000, 0);
		let order = submit(&h);

		tokio::time::sleep(Duration::from_millis(1100)).await;
		h.engine.scan_expired_auctions().await;

		assert_eq!(
			h.orderbook.get_order(&order.hash).unwrap().status,
			OrderStatus::Expired
		);
	}

	#[tokio::test]
	async fn full_win_to_completion_flow() {
		let h = harness(1000, 1);
		let order = submit(&h);

		// Prime the balance cache, bid, then let the window lapse.
		h.oracle
			.get_balance(Network::Stellar, "XLM")
			.await
			.unwrap();
		h.engine.evaluate_auctions().await;
		assert_eq!(h.liquidity.ledger().reserved("XLM"), U256::from(100));

		tokio::time::sleep(Duration::from_millis(1600)).await;
		h.engine.scan_expired_auctions().await;

		let settled = h.orderbook.get_order(&order.hash).unwrap();
		assert_eq!(settled.status, OrderStatus::Filled);
		assert_eq!(settled.metadata["winner"], "resolver-1");

		// The swap completes once the secret is revealed on the source
		// chain; the watch withdraws the counter-leg and frees the
		// reservation.
		let pair = h.settlement.get_pair(&order.hash).unwrap();
		h.eth_chain
			.withdraw(&pair.ethereum_contract_id, pair.secret, U256::ZERO)
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(200)).await;

		assert_eq!(
			h.settlement.get_pair(&order.hash).unwrap().status,
			PairStatus::Completed
		);
		assert_eq!(
			h.xlm_chain
				.get_status(&pair.stellar_contract_id)
				.await
				.unwrap(),
			resolver_types::HtlcStatus::Withdrawn
		);
		assert_eq!(h.liquidity.ledger().reserved("XLM"), U256::ZERO);
	}

	#[tokio::test]
	async fn lost_auction_releases_our_reservation() {
		let h = harness(1000, 0);
		let order = submit(&h);

		// A competitor outbids us after our HTLCs are up.
		h.engine.maybe_bid(&order, 100.0).await.unwrap();
		h.engine.record_external_bid(Bid {
			order_hash: order.hash.clone(),
			bidder: "rival".into(),
			price: 104.0,
			timestamp: now_secs(),
		});

		tokio::time::sleep(Duration::from_millis(1100)).await;
		h.engine.scan_expired_auctions().await;

		let settled = h.orderbook.get_order(&order.hash).unwrap();
		assert_eq!(settled.status, OrderStatus::Filled);
		assert_eq!(settled.metadata["winner"], "rival");
		assert_eq!(h.liquidity.ledger().reserved("XLM"), U256::ZERO);
	}
}
