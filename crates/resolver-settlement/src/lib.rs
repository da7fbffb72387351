//! Cross-chain HTLC coordination.
//!
//! Creates the paired HTLCs for a won auction (one secret, one hashlock per
//! chain's hash primitive), then watches the source chain for secret
//! revelation. Whichever fires first wins: the withdrawal event completes
//! the counter-leg with the revealed preimage, or the refund timer claws
//! both legs back after timelock expiry. The two paths are mutually
//! exclusive by construction; both end by releasing the order's liquidity
//! reservation.

use alloy_primitives::U256;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use resolver_types::{
	derive_hashlock, now_secs, EventBus, HtlcError, HtlcEvent, HtlcPair, LiquidityError, Network,
	Order, PairStatus, ResolverEvent, SettlementEvent,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use resolver_assets::AssetRegistry;
use resolver_htlc::ChainRegistry;
use resolver_liquidity::LiquidityCoordinator;

/// Safety deposit posted with each leg, as a fraction of the locked amount.
const SAFETY_DEPOSIT_DIVISOR: u64 = 10;

#[derive(Debug, Error)]
pub enum SettlementError {
	#[error("unknown chain id: {0}")]
	UnknownChain(u64),

	#[error("order {0} has both legs on the same network")]
	NotCrossChain(String),

	#[error("no HTLC pair recorded for order {0}")]
	PairNotFound(String),

	#[error(transparent)]
	Htlc(#[from] HtlcError),

	#[error(transparent)]
	Liquidity(#[from] LiquidityError),
}

/// The resolver's own account on each network.
#[derive(Debug, Clone)]
pub struct ResolverIdentity {
	pub ethereum_address: String,
	pub stellar_address: String,
}

impl ResolverIdentity {
	pub fn address_on(&self, network: Network) -> &str {
		match network {
			Network::Ethereum => &self.ethereum_address,
			Network::Stellar => &self.stellar_address,
		}
	}
}

pub struct CrossChainCoordinator {
	chains: Arc<ChainRegistry>,
	registry: Arc<AssetRegistry>,
	liquidity: Arc<LiquidityCoordinator>,
	identity: ResolverIdentity,
	/// Chain id -> network, from configuration.
	chain_networks: HashMap<u64, Network>,
	pairs: Arc<DashMap<String, HtlcPair>>,
	events: EventBus,
}

impl CrossChainCoordinator {
	pub fn new(
		chains: Arc<ChainRegistry>,
		registry: Arc<AssetRegistry>,
		liquidity: Arc<LiquidityCoordinator>,
		identity: ResolverIdentity,
		chain_networks: HashMap<u64, Network>,
		events: EventBus,
	) -> Self {
		Self {
			chains,
			registry,
			liquidity,
			identity,
			chain_networks,
			pairs: Arc::new(DashMap::new()),
			events,
		}
	}

	fn network_of(&self, chain_id: u64) -> Result<Network, SettlementError> {
		self.chain_networks
			.get(&chain_id)
			.copied()
			.ok_or(SettlementError::UnknownChain(chain_id))
	}

	/// Creates both HTLC legs for an order and records the pairing.
	///
	/// One 32-byte secret is generated for the whole order; each leg's
	/// hashlock is derived with the hash primitive its chain expects. The
	/// source-chain leg is created first. If the counter-leg fails, a
	/// best-effort refund of the first leg is attempted before the error
	/// surfaces; should that refund be rejected (the timelock has not
	/// expired yet), the leg stays reclaimable through the normal timeout
	/// path.
	pub async fn create_cross_chain_htlcs(
		&self,
		order: &Order,
	) -> Result<HtlcPair, SettlementError> {
		let src_network = self.network_of(order.src_chain_id)?;
		let dst_network = self.network_of(order.dst_chain_id)?;
		if src_network == dst_network {
			return Err(SettlementError::NotCrossChain(order.hash.clone()));
		}

		let mut secret = [0u8; 32];
		OsRng.fill_bytes(&mut secret);

		let maker_cfg = self.registry.get(&order.maker_asset)?;
		let taker_cfg = self.registry.get(&order.taker_asset)?;
		let making_raw = self
			.registry
			.to_raw(&order.maker_asset, &order.making_amount)?;
		let taking_raw = self
			.registry
			.to_raw(&order.taker_asset, &order.taking_amount)?;

		let src_client = self.chains.get(src_network)?;
		let dst_client = self.chains.get(dst_network)?;

		// Source leg: the maker-side escrow the resolver will claim by
		// revealing the secret.
		let src_params = resolver_types::CreateHtlcParams {
			sender: order.maker.clone(),
			receiver: self.identity.address_on(src_network).to_string(),
			amount: making_raw,
			token_address: maker_cfg.address.clone(),
			hashlock: derive_hashlock(src_network, &secret),
			timelock: order.timelock,
			safety_deposit: making_raw / U256::from(SAFETY_DEPOSIT_DIVISOR),
			allow_partial_fills: false,
			min_fill_amount: U256::ZERO,
		};
		let src_contract = src_client.create_htlc(src_params).await?;
		info!(
			order_hash = %order.hash,
			network = %src_network,
			contract_id = %src_contract,
			"source-leg HTLC created"
		);

		// Counter leg: the resolver's escrow paying the maker's receiver.
		let dst_params = resolver_types::CreateHtlcParams {
			sender: self.identity.address_on(dst_network).to_string(),
			receiver: order.receiver.clone(),
			amount: taking_raw,
			token_address: taker_cfg.address.clone(),
			hashlock: derive_hashlock(dst_network, &secret),
			timelock: order.timelock,
			safety_deposit: taking_raw / U256::from(SAFETY_DEPOSIT_DIVISOR),
			allow_partial_fills: false,
			min_fill_amount: U256::ZERO,
		};
		let dst_contract = match dst_client.create_htlc(dst_params).await {
			Ok(id) => id,
			Err(err) => {
				warn!(
					order_hash = %order.hash,
					error = %err,
					"counter-leg creation failed, attempting source-leg refund"
				);
				if let Err(refund_err) = src_client.refund(&src_contract).await {
					warn!(
						contract_id = %src_contract,
						error = %refund_err,
						"source-leg refund rejected; leg remains claimable until timelock"
					);
				}
				return Err(err.into());
			}
		};
		info!(
			order_hash = %order.hash,
			network = %dst_network,
			contract_id = %dst_contract,
			"counter-leg HTLC created"
		);

		let (ethereum_contract_id, stellar_contract_id) = match src_network {
			Network::Ethereum => (src_contract, dst_contract),
			Network::Stellar => (dst_contract, src_contract),
		};
		let pair = HtlcPair {
			order_hash: order.hash.clone(),
			ethereum_contract_id,
			stellar_contract_id,
			secret,
			hashlock: derive_hashlock(Network::Ethereum, &secret),
			timelock: order.timelock,
			status: PairStatus::BothCreated,
			created_at: now_secs(),
		};
		self.pairs.insert(order.hash.clone(), pair.clone());

		self.events
			.publish(ResolverEvent::Settlement(SettlementEvent::PairCreated {
				order_hash: order.hash.clone(),
			}))
			.ok();
		Ok(pair)
	}

	/// Spawns the completion watch for a recorded pair: the source chain's
	/// withdrawal event races the refund timer, first one wins.
	pub fn monitor_htlc_completion(
		&self,
		order: &Order,
	) -> Result<JoinHandle<()>, SettlementError> {
		let src_network = self.network_of(order.src_chain_id)?;
		let dst_network = self.network_of(order.dst_chain_id)?;
		let pair = self
			.pairs
			.get(&order.hash)
			.map(|p| p.clone())
			.ok_or_else(|| SettlementError::PairNotFound(order.hash.clone()))?;

		let src_client = self.chains.get(src_network)?;
		let dst_client = self.chains.get(dst_network)?;
		// Subscribe before spawning so no revelation slips past the watch.
		let mut revelations = src_client.subscribe();

		let watch_contract = pair.contract_id_on(src_network).to_string();
		let counter_contract = pair.contract_id_on(dst_network).to_string();
		let order_hash = order.hash.clone();
		let refund_delay = Duration::from_secs(pair.timelock.saturating_sub(now_secs()));

		let pairs = self.pairs.clone();
		let liquidity = self.liquidity.clone();
		let events = self.events.clone();
		let chains = self.chains.clone();

		Ok(tokio::spawn(async move {
			let timeout = tokio::time::sleep(refund_delay);
			tokio::pin!(timeout);
			let mut stream_open = true;

			loop {
				tokio::select! {
					event = revelations.recv(), if stream_open => match event {
						Ok(HtlcEvent::Withdraw { contract_id, preimage, .. })
							if contract_id == watch_contract =>
						{
							info!(order_hash = %order_hash, "secret revealed on source chain");
							if let Some(mut entry) = pairs.get_mut(&order_hash) {
								entry.status = PairStatus::SecretRevealed;
							}
							events
								.publish(ResolverEvent::Settlement(
									SettlementEvent::SecretRevealed {
										order_hash: order_hash.clone(),
									},
								))
								.ok();

							match dst_client
								.withdraw(&counter_contract, preimage, U256::ZERO)
								.await
							{
								Ok(()) => {
									if let Some(mut entry) = pairs.get_mut(&order_hash) {
										entry.status = PairStatus::Completed;
									}
									liquidity.release_liquidity(&order_hash);
									info!(order_hash = %order_hash, "cross-chain swap completed");
									events
										.publish(ResolverEvent::Settlement(
											SettlementEvent::Completed {
												order_hash: order_hash.clone(),
											},
										))
										.ok();
									break;
								}
								Err(err) => {
									// The refund timer stays armed as the safety net.
									error!(
										order_hash = %order_hash,
										error = %err,
										"counter-leg withdrawal failed"
									);
								}
							}
						}
						Ok(_) => {}
						Err(broadcast::error::RecvError::Lagged(missed)) => {
							warn!(order_hash = %order_hash, missed, "revelation stream lagged");
						}
						Err(broadcast::error::RecvError::Closed) => {
							stream_open = false;
						}
					},

					_ = &mut timeout => {
						let completed = pairs
							.get(&order_hash)
							.map(|p| p.status == PairStatus::Completed)
							.unwrap_or(false);
						if !completed {
							info!(order_hash = %order_hash, "timelock expired, refunding both legs");
							refund_pair_legs(&chains, &pairs, &order_hash).await;
							liquidity.release_liquidity(&order_hash);
							events
								.publish(ResolverEvent::Settlement(SettlementEvent::Refunded {
									order_hash: order_hash.clone(),
								}))
								.ok();
						}
						break;
					}
				}
			}
		}))
	}

	pub fn get_pair(&self, order_hash: &str) -> Option<HtlcPair> {
		self.pairs.get(order_hash).map(|p| p.clone())
	}

	pub fn list_pairs(&self) -> Vec<HtlcPair> {
		self.pairs.iter().map(|p| p.clone()).collect()
	}

	pub fn counts_by_status(&self) -> HashMap<PairStatus, usize> {
		let mut counts = HashMap::new();
		for pair in self.pairs.iter() {
			*counts.entry(pair.status).or_insert(0) += 1;
		}
		counts
	}
}

/// Best-effort refunds of both legs. Failures are logged, never retried:
/// the counterparty's own timelock claim is the actual safety net.
async fn refund_pair_legs(
	chains: &Arc<ChainRegistry>,
	pairs: &Arc<DashMap<String, HtlcPair>>,
	order_hash: &str,
) {
	let pair = match pairs.get(order_hash) {
		Some(p) => p.clone(),
		None => return,
	};

	for network in [Network::Ethereum, Network::Stellar] {
		let contract_id = pair.contract_id_on(network);
		match chains.get(network) {
			Ok(client) => {
				if let Err(err) = client.refund(contract_id).await {
					warn!(
						order_hash,
						%network,
						contract_id,
						error = %err,
						"leg refund failed"
					);
				} else {
					info!(order_hash, %network, contract_id, "leg refunded");
				}
			}
			Err(err) => warn!(order_hash, %network, error = %err, "no chain client for refund"),
		}
	}

	if let Some(mut entry) = pairs.get_mut(order_hash) {
		entry.status = PairStatus::Refunded;
	}
}
