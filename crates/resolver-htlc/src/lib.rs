//! Chain adapters for the remote HTLC contract surface.
//!
//! Both chains expose the same contract shape (create, withdraw, refund,
//! query), differing only in the hash primitive their hashlocks expect. The
//! [`ChainClient`] trait abstracts one chain's surface; the
//! [`ChainRegistry`] routes by network and doubles as the balance source for
//! the liquidity subsystem.

use alloy_primitives::U256;
use async_trait::async_trait;
use resolver_types::{
	AssetConfig, CreateHtlcParams, Htlc, HtlcError, HtlcEvent, HtlcStatus, LiquidityError, Network,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

pub mod implementations;

pub use implementations::rpc::RpcChainClient;
pub use implementations::simulated::SimulatedChain;

use resolver_assets::BalanceSource;

/// One chain's HTLC contract surface plus the balance queries the resolver
/// needs from that chain's node.
#[async_trait]
pub trait ChainClient: Send + Sync {
	/// The network this client talks to.
	fn network(&self) -> Network;

	/// Creates an HTLC and returns its contract id.
	async fn create_htlc(&self, params: CreateHtlcParams) -> Result<String, HtlcError>;

	/// Withdraws by revealing the preimage. An `amount` of zero withdraws
	/// the full remaining amount.
	async fn withdraw(
		&self,
		contract_id: &str,
		preimage: [u8; 32],
		amount: U256,
	) -> Result<(), HtlcError>;

	/// Refunds the remaining amount to the sender after timelock expiry.
	async fn refund(&self, contract_id: &str) -> Result<(), HtlcError>;

	async fn get_htlc(&self, contract_id: &str) -> Result<Htlc, HtlcError>;

	async fn get_status(&self, contract_id: &str) -> Result<HtlcStatus, HtlcError>;

	async fn contract_exists(&self, contract_id: &str) -> Result<bool, HtlcError>;

	/// The resolver's balance of an asset on this chain.
	async fn balance_of(&self, asset: &AssetConfig) -> Result<U256, HtlcError>;

	/// Subscribes to this chain's HTLC events.
	fn subscribe(&self) -> broadcast::Receiver<HtlcEvent>;
}

/// Routes chain calls by network.
pub struct ChainRegistry {
	clients: HashMap<Network, Arc<dyn ChainClient>>,
}

impl ChainRegistry {
	pub fn new() -> Self {
		Self {
			clients: HashMap::new(),
		}
	}

	pub fn register(&mut self, client: Arc<dyn ChainClient>) {
		self.clients.insert(client.network(), client);
	}

	pub fn get(&self, network: Network) -> Result<Arc<dyn ChainClient>, HtlcError> {
		self.clients
			.get(&network)
			.cloned()
			.ok_or_else(|| HtlcError::Network(format!("no chain client for {}", network)))
	}

	pub fn networks(&self) -> Vec<Network> {
		self.clients.keys().copied().collect()
	}
}

impl Default for ChainRegistry {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl BalanceSource for ChainRegistry {
	async fn fetch_balance(
		&self,
		network: Network,
		asset: &AssetConfig,
	) -> Result<U256, LiquidityError> {
		let client = self
			.get(network)
			.map_err(|e| LiquidityError::Network(e.to_string()))?;
		client
			.balance_of(asset)
			.await
			.map_err(|e| LiquidityError::Network(e.to_string()))
	}
}
