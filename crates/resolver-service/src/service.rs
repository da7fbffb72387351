//! Component wiring for a resolver instance.

use anyhow::{Context, Result};
use resolver_assets::{AssetRegistry, BalanceOracle};
use resolver_auction::AuctionEngine;
use resolver_config::{ChainMode, Config};
use resolver_htlc::{ChainClient, ChainRegistry, RpcChainClient, SimulatedChain};
use resolver_liquidity::{LiquidityCoordinator, ReservationLedger};
use resolver_orderbook::OrderBook;
use resolver_settlement::{CrossChainCoordinator, ResolverIdentity};
use resolver_types::{now_secs, EventBus, Network, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Interval at which RPC chain clients poll their event feeds.
const EVENT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A fully wired resolver: every component plus the handles of its
/// background tasks.
pub struct ResolverService {
	pub config: Config,
	pub registry: Arc<AssetRegistry>,
	pub oracle: Arc<BalanceOracle>,
	pub liquidity: Arc<LiquidityCoordinator>,
	pub orderbook: Arc<OrderBook>,
	pub settlement: Arc<CrossChainCoordinator>,
	pub engine: Arc<AuctionEngine>,
	pub events: EventBus,
	pub started_at: Timestamp,
	rpc_clients: Vec<Arc<RpcChainClient>>,
}

impl ResolverService {
	/// Builds every component from configuration. No background tasks run
	/// until [`spawn_background_tasks`](Self::spawn_background_tasks).
	pub fn build(config: Config) -> Result<Self> {
		let events = EventBus::new(1000);

		let registry = Arc::new(AssetRegistry::new());
		for asset in &config.assets {
			registry
				.register(asset.clone())
				.with_context(|| format!("registering asset {}", asset.symbol))?;
		}
		info!(assets = config.assets.len(), "asset registry initialized");

		let mut chains = ChainRegistry::new();
		let mut rpc_clients = Vec::new();
		let mut chain_networks: HashMap<u64, Network> = HashMap::new();
		for chain in &config.chains {
			chain_networks.insert(chain.chain_id, chain.network);
			match chain.mode {
				ChainMode::Simulated => {
					info!(network = %chain.network, "using simulated chain");
					chains.register(Arc::new(SimulatedChain::new(chain.network))
						as Arc<dyn ChainClient>);
				}
				ChainMode::Rpc => {
					let url = chain
						.rpc_url
						.clone()
						.context("rpc chain mode requires rpc_url")?;
					info!(network = %chain.network, url = %url, "using rpc chain");
					let client = Arc::new(RpcChainClient::new(chain.network, url));
					rpc_clients.push(client.clone());
					chains.register(client as Arc<dyn ChainClient>);
				}
			}
		}
		let chains = Arc::new(chains);

		let oracle = Arc::new(BalanceOracle::new(
			registry.clone(),
			chains.clone(),
			Duration::from_secs(config.liquidity.balance_ttl_secs),
			events.clone(),
		));
		let ledger = Arc::new(ReservationLedger::new(
			registry.clone(),
			Duration::from_secs(config.liquidity.reservation_ttl_secs),
			events.clone(),
		));
		let liquidity = Arc::new(LiquidityCoordinator::new(
			registry.clone(),
			oracle.clone(),
			ledger,
		));

		let orderbook = Arc::new(OrderBook::new(
			Duration::from_secs(config.auction.duration_secs),
			Duration::from_secs(config.auction.activation_delay_secs),
			Duration::from_secs(config.orderbook.retention_secs),
			events.clone(),
		));

		let settlement = Arc::new(CrossChainCoordinator::new(
			chains,
			registry.clone(),
			liquidity.clone(),
			ResolverIdentity {
				ethereum_address: config.resolver.ethereum_address.clone(),
				stellar_address: config.resolver.stellar_address.clone(),
			},
			chain_networks,
			events.clone(),
		));

		let engine = Arc::new(AuctionEngine::new(
			orderbook.clone(),
			liquidity.clone(),
			settlement.clone(),
			oracle.clone(),
			registry.clone(),
			config.resolver.name.clone(),
			events.clone(),
		));

		Ok(Self {
			config,
			registry,
			oracle,
			liquidity,
			orderbook,
			settlement,
			engine,
			events,
			started_at: now_secs(),
			rpc_clients,
		})
	}

	/// Spawns every periodic task: pricing, scanning, sweeps, monitors and
	/// chain event pollers. Returns the handles for shutdown.
	pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
		let auction = &self.config.auction;
		let liquidity = &self.config.liquidity;

		let mut handles = vec![
			self.engine
				.clone()
				.spawn_price_loop(Duration::from_secs(auction.price_tick_secs)),
			self.engine
				.clone()
				.spawn_scan_loop(Duration::from_secs(auction.scan_tick_secs)),
			self.liquidity
				.ledger()
				.clone()
				.spawn_sweep(Duration::from_secs(liquidity.sweep_interval_secs)),
			self.liquidity
				.clone()
				.spawn_monitor(Duration::from_secs(liquidity.health_interval_secs)),
			self.oracle
				.clone()
				.spawn_monitor(Duration::from_secs(liquidity.balance_monitor_secs)),
			self.orderbook
				.clone()
				.spawn_sweep(Duration::from_secs(self.config.orderbook.sweep_interval_secs)),
		];

		for client in &self.rpc_clients {
			handles.push(client.clone().spawn_event_poller(EVENT_POLL_INTERVAL));
		}

		info!(tasks = handles.len(), "background tasks started");
		handles
	}
}
