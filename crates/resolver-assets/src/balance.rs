//! Balance oracle: cached on-chain balance reads with stale fallback.

use alloy_primitives::U256;
use async_trait::async_trait;
use resolver_types::{
	AssetConfig, EventBus, LiquidityError, LiquidityEvent, Network, ResolverEvent,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::AssetRegistry;

/// Source of truth for on-chain balances, implemented by chain adapters.
#[async_trait]
pub trait BalanceSource: Send + Sync {
	async fn fetch_balance(
		&self,
		network: Network,
		asset: &AssetConfig,
	) -> Result<U256, LiquidityError>;
}

struct CacheEntry {
	balance: U256,
	fetched_at: Instant,
}

impl CacheEntry {
	fn is_fresh(&self, ttl: Duration) -> bool {
		self.fetched_at.elapsed() <= ttl
	}
}

/// Fetches and caches the resolver's balances per (network, asset).
///
/// Cached values are served while within their TTL. A failed refresh falls
/// back to the most recent cached value, even expired, before giving up
/// with `BalanceFetchFailed`.
pub struct BalanceOracle {
	registry: Arc<AssetRegistry>,
	source: Arc<dyn BalanceSource>,
	cache: RwLock<HashMap<(Network, String), CacheEntry>>,
	ttl: Duration,
	events: EventBus,
}

impl BalanceOracle {
	pub fn new(
		registry: Arc<AssetRegistry>,
		source: Arc<dyn BalanceSource>,
		ttl: Duration,
		events: EventBus,
	) -> Self {
		Self {
			registry,
			source,
			cache: RwLock::new(HashMap::new()),
			ttl,
			events,
		}
	}

	/// Returns the balance for (network, asset), served from cache while
	/// fresh, refreshed otherwise.
	pub async fn get_balance(&self, network: Network, symbol: &str) -> Result<U256, LiquidityError> {
		let config = self.lookup(network, symbol)?;
		let key = (network, symbol.to_string());

		{
			let cache = self.cache.read().await;
			if let Some(entry) = cache.get(&key) {
				if entry.is_fresh(self.ttl) {
					return Ok(entry.balance);
				}
			}
		}

		match self.source.fetch_balance(network, &config).await {
			Ok(balance) => {
				self.cache.write().await.insert(
					key,
					CacheEntry {
						balance,
						fetched_at: Instant::now(),
					},
				);
				Ok(balance)
			}
			Err(err) => {
				// Stale fallback: an expired entry is still better than failing.
				let cache = self.cache.read().await;
				if let Some(entry) = cache.get(&key) {
					warn!(
						%network,
						asset = symbol,
						error = %err,
						"balance fetch failed, serving stale cached value"
					);
					return Ok(entry.balance);
				}
				Err(LiquidityError::BalanceFetchFailed {
					network,
					asset: symbol.to_string(),
					reason: err.to_string(),
				})
			}
		}
	}

	/// Forces a refresh and notifies subscribers if the balance changed.
	pub async fn update_balance(
		&self,
		network: Network,
		symbol: &str,
	) -> Result<U256, LiquidityError> {
		let config = self.lookup(network, symbol)?;
		let key = (network, symbol.to_string());

		let balance = self
			.source
			.fetch_balance(network, &config)
			.await
			.map_err(|err| LiquidityError::BalanceFetchFailed {
				network,
				asset: symbol.to_string(),
				reason: err.to_string(),
			})?;

		let previous = {
			let mut cache = self.cache.write().await;
			cache
				.insert(
					key,
					CacheEntry {
						balance,
						fetched_at: Instant::now(),
					},
				)
				.map(|entry| entry.balance)
		};

		if previous != Some(balance) {
			debug!(%network, asset = symbol, %balance, "balance changed");
			self.events
				.publish(ResolverEvent::Liquidity(LiquidityEvent::BalanceChanged {
					network,
					asset: symbol.to_string(),
					previous: previous.unwrap_or(U256::ZERO),
					current: balance,
				}))
				.ok();
		}

		Ok(balance)
	}

	/// The last cached balance regardless of freshness, if any. Used for the
	/// auction engine's fast pre-check.
	pub async fn cached_balance(&self, network: Network, symbol: &str) -> Option<U256> {
		let cache = self.cache.read().await;
		cache
			.get(&(network, symbol.to_string()))
			.map(|entry| entry.balance)
	}

	/// Drops cached entries: one asset, or all assets of a network.
	pub async fn invalidate(&self, network: Network, symbol: Option<&str>) {
		let mut cache = self.cache.write().await;
		match symbol {
			Some(symbol) => {
				cache.remove(&(network, symbol.to_string()));
			}
			None => {
				cache.retain(|(n, _), _| *n != network);
			}
		}
	}

	/// Spawns the periodic monitor that refreshes every registered asset.
	/// Individual fetch failures are logged without aborting the batch.
	pub fn spawn_monitor(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
			loop {
				ticker.tick().await;
				for config in self.registry.list() {
					if let Err(err) = self.update_balance(config.network, &config.symbol).await {
						warn!(
							network = %config.network,
							asset = %config.symbol,
							error = %err,
							"balance monitor refresh failed"
						);
					}
				}
			}
		})
	}

	fn lookup(&self, network: Network, symbol: &str) -> Result<AssetConfig, LiquidityError> {
		let config = self.registry.get(symbol)?;
		if config.network != network {
			return Err(LiquidityError::AssetNotSupported(format!(
				"{} is not on {}",
				symbol, network
			)));
		}
		Ok(config)
	}
}

impl std::fmt::Debug for BalanceOracle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BalanceOracle")
			.field("ttl", &self.ttl)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

	struct ScriptedSource {
		balance: AtomicU64,
		fail: AtomicBool,
		fetches: AtomicU64,
	}

	impl ScriptedSource {
		fn new(balance: u64) -> Self {
			Self {
				balance: AtomicU64::new(balance),
				fail: AtomicBool::new(false),
				fetches: AtomicU64::new(0),
			}
		}
	}

	#[async_trait]
	impl BalanceSource for ScriptedSource {
		async fn fetch_balance(
			&self,
			network: Network,
			asset: &AssetConfig,
		) -> Result<U256, LiquidityError> {
			self.fetches.fetch_add(1, Ordering::SeqCst);
			if self.fail.load(Ordering::SeqCst) {
				return Err(LiquidityError::Network(format!(
					"{} unreachable for {}",
					network, asset.symbol
				)));
			}
			Ok(U256::from(self.balance.load(Ordering::SeqCst)))
		}
	}

	fn setup(balance: u64, ttl: Duration) -> (Arc<BalanceOracle>, Arc<ScriptedSource>, EventBus) {
		let registry = Arc::new(AssetRegistry::new());
		registry
			.register(AssetConfig {
				address: "native".into(),
				symbol: "XLM".into(),
				decimals: 7,
				network: Network::Stellar,
				is_native: true,
				min_threshold: "10".into(),
				warning_threshold: "50".into(),
			})
			.unwrap();
		let source = Arc::new(ScriptedSource::new(balance));
		let events = EventBus::new(16);
		let oracle = Arc::new(BalanceOracle::new(
			registry,
			source.clone(),
			ttl,
			events.clone(),
		));
		(oracle, source, events)
	}

	#[tokio::test]
	async fn serves_from_cache_within_ttl() {
		let (oracle, source, _events) = setup(1000, Duration::from_secs(60));

		let first = oracle.get_balance(Network::Stellar, "XLM").await.unwrap();
		let second = oracle.get_balance(Network::Stellar, "XLM").await.unwrap();

		assert_eq!(first, U256::from(1000));
		assert_eq!(second, U256::from(1000));
		assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn falls_back_to_stale_cache_on_fetch_failure() {
		let (oracle, source, _events) = setup(1000, Duration::ZERO);

		oracle.get_balance(Network::Stellar, "XLM").await.unwrap();
		source.fail.store(true, Ordering::SeqCst);

		// Entry expired (zero ttl) and the refresh fails: stale value wins.
		let balance = oracle.get_balance(Network::Stellar, "XLM").await.unwrap();
		assert_eq!(balance, U256::from(1000));
	}

	#[tokio::test]
	async fn fails_when_no_cache_exists() {
		let (oracle, source, _events) = setup(1000, Duration::from_secs(60));
		source.fail.store(true, Ordering::SeqCst);

		let err = oracle
			.get_balance(Network::Stellar, "XLM")
			.await
			.unwrap_err();
		assert_eq!(err.code(), "BALANCE_FETCH_FAILED");
	}

	#[tokio::test]
	async fn update_publishes_change_notification() {
		let (oracle, source, events) = setup(1000, Duration::from_secs(60));
		let mut rx = events.subscribe();

		oracle.update_balance(Network::Stellar, "XLM").await.unwrap();
		source.balance.store(2000, Ordering::SeqCst);
		oracle.update_balance(Network::Stellar, "XLM").await.unwrap();

		// First update: None -> 1000. Second: 1000 -> 2000.
		let mut changes = Vec::new();
		while let Ok(event) = rx.try_recv() {
			if let ResolverEvent::Liquidity(LiquidityEvent::BalanceChanged {
				previous,
				current,
				..
			}) = event
			{
				changes.push((previous, current));
			}
		}
		assert_eq!(
			changes,
			vec![
				(U256::ZERO, U256::from(1000)),
				(U256::from(1000), U256::from(2000)),
			]
		);
	}

	#[tokio::test]
	async fn invalidate_drops_entries() {
		let (oracle, source, _events) = setup(1000, Duration::from_secs(60));
		oracle.get_balance(Network::Stellar, "XLM").await.unwrap();

		oracle.invalidate(Network::Stellar, Some("XLM")).await;
		assert!(oracle.cached_balance(Network::Stellar, "XLM").await.is_none());

		oracle.get_balance(Network::Stellar, "XLM").await.unwrap();
		assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn rejects_asset_on_wrong_network() {
		let (oracle, _source, _events) = setup(1000, Duration::from_secs(60));
		assert!(oracle.get_balance(Network::Ethereum, "XLM").await.is_err());
	}
}
