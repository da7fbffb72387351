//! In-process chain implementing the full HTLC contract semantics.
//!
//! Used by tests and `simulated` chain mode. Behaves like the on-chain
//! contract: preimage verification against the network's hash primitive,
//! timelock gates, partial-fill accounting, and proportional safety-deposit
//! return.

use alloy_primitives::{keccak256, U256};
use async_trait::async_trait;
use resolver_types::{
	now_secs, AssetConfig, CreateHtlcParams, Htlc, HtlcError, HtlcEvent, HtlcStatus, Network,
};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::ChainClient;

#[derive(Default)]
struct SimState {
	contracts: HashMap<String, Htlc>,
	/// Resolver-held balances by token address. Tokens never seeded through
	/// [`SimulatedChain::set_balance`] are unconstrained.
	balances: HashMap<String, U256>,
	nonce: u64,
}

pub struct SimulatedChain {
	network: Network,
	state: Mutex<SimState>,
	events: broadcast::Sender<HtlcEvent>,
}

impl SimulatedChain {
	pub fn new(network: Network) -> Self {
		let (events, _) = broadcast::channel(256);
		Self {
			network,
			state: Mutex::new(SimState::default()),
			events,
		}
	}

	/// Seeds the resolver's balance for a token address.
	pub fn set_balance(&self, token_address: &str, amount: U256) {
		self.state
			.lock()
			.unwrap()
			.balances
			.insert(token_address.to_string(), amount);
	}

	fn next_contract_id(state: &mut SimState, params: &CreateHtlcParams) -> String {
		state.nonce += 1;
		let mut buf = Vec::new();
		buf.extend_from_slice(params.sender.as_bytes());
		buf.extend_from_slice(params.receiver.as_bytes());
		buf.extend_from_slice(&params.amount.to_be_bytes::<32>());
		buf.extend_from_slice(&params.hashlock);
		buf.extend_from_slice(&params.timelock.to_be_bytes());
		buf.extend_from_slice(&state.nonce.to_be_bytes());
		format!("0x{}", hex::encode(keccak256(&buf)))
	}
}

#[async_trait]
impl ChainClient for SimulatedChain {
	fn network(&self) -> Network {
		self.network
	}

	async fn create_htlc(&self, params: CreateHtlcParams) -> Result<String, HtlcError> {
		if params.amount.is_zero() {
			return Err(HtlcError::InvalidAmount);
		}
		if params.timelock <= now_secs() {
			return Err(HtlcError::InvalidTimelock);
		}

		let mut state = self.state.lock().unwrap();

		let locked_total = params.amount + params.safety_deposit;
		if let Some(balance) = state.balances.get_mut(&params.token_address) {
			if *balance < locked_total {
				return Err(HtlcError::InsufficientBalance);
			}
			*balance -= locked_total;
		}

		let contract_id = Self::next_contract_id(&mut state, &params);
		let htlc = Htlc {
			contract_id: contract_id.clone(),
			sender: params.sender,
			receiver: params.receiver,
			amount: params.amount,
			remaining_amount: params.amount,
			filled_amount: U256::ZERO,
			token_address: params.token_address,
			hashlock: params.hashlock,
			timelock: params.timelock,
			safety_deposit: params.safety_deposit,
			remaining_safety_deposit: params.safety_deposit,
			status: HtlcStatus::Active,
			allow_partial_fills: params.allow_partial_fills,
			min_fill_amount: params.min_fill_amount,
		};
		state.contracts.insert(contract_id.clone(), htlc);

		debug!(network = %self.network, contract_id = %contract_id, "htlc created");
		self.events
			.send(HtlcEvent::New {
				contract_id: contract_id.clone(),
			})
			.ok();
		Ok(contract_id)
	}

	async fn withdraw(
		&self,
		contract_id: &str,
		preimage: [u8; 32],
		amount: U256,
	) -> Result<(), HtlcError> {
		let event = {
			let mut state = self.state.lock().unwrap();
			let htlc = state
				.contracts
				.get_mut(contract_id)
				.ok_or_else(|| HtlcError::ContractNotFound(contract_id.to_string()))?;

			match htlc.status {
				HtlcStatus::Active | HtlcStatus::PartiallyFilled => {}
				HtlcStatus::Withdrawn => return Err(HtlcError::AlreadyWithdrawn),
				HtlcStatus::Refunded => return Err(HtlcError::AlreadyRefunded),
			}
			if now_secs() >= htlc.timelock {
				return Err(HtlcError::TimelockExpired);
			}
			if resolver_types::derive_hashlock(self.network, &preimage) != htlc.hashlock {
				return Err(HtlcError::InvalidPreimage);
			}

			// Zero means the full remaining amount.
			let requested = if amount.is_zero() {
				htlc.remaining_amount
			} else {
				amount
			};
			if requested > htlc.remaining_amount {
				return Err(HtlcError::InsufficientRemainingAmount {
					requested,
					remaining: htlc.remaining_amount,
				});
			}
			let partial = requested < htlc.remaining_amount;
			if partial && !htlc.allow_partial_fills {
				return Err(HtlcError::PartialFillsNotAllowed);
			}
			if partial && requested < htlc.min_fill_amount {
				return Err(HtlcError::BelowMinimumFill {
					requested,
					minimum: htlc.min_fill_amount,
				});
			}

			// Proportional, integer-truncated deposit return to the sender.
			let deposit_return = htlc.remaining_safety_deposit * requested / htlc.remaining_amount;

			htlc.filled_amount += requested;
			htlc.remaining_amount -= requested;
			htlc.remaining_safety_deposit -= deposit_return;
			htlc.status = if htlc.remaining_amount.is_zero() {
				HtlcStatus::Withdrawn
			} else {
				HtlcStatus::PartiallyFilled
			};

			HtlcEvent::Withdraw {
				contract_id: contract_id.to_string(),
				preimage,
				withdraw_amount: requested,
				is_partial: !htlc.remaining_amount.is_zero(),
			}
		};

		debug!(network = %self.network, contract_id, "htlc withdrawal");
		self.events.send(event).ok();
		Ok(())
	}

	async fn refund(&self, contract_id: &str) -> Result<(), HtlcError> {
		{
			let mut guard = self.state.lock().unwrap();
			let state = &mut *guard;
			let htlc = state
				.contracts
				.get_mut(contract_id)
				.ok_or_else(|| HtlcError::ContractNotFound(contract_id.to_string()))?;

			match htlc.status {
				HtlcStatus::Active | HtlcStatus::PartiallyFilled => {}
				HtlcStatus::Withdrawn => return Err(HtlcError::AlreadyWithdrawn),
				HtlcStatus::Refunded => return Err(HtlcError::AlreadyRefunded),
			}
			if now_secs() < htlc.timelock {
				return Err(HtlcError::TimelockNotExpired);
			}

			let returned = htlc.remaining_amount + htlc.remaining_safety_deposit;
			htlc.status = HtlcStatus::Refunded;
			if let Some(balance) = state.balances.get_mut(&htlc.token_address) {
				*balance += returned;
			}
		}

		debug!(network = %self.network, contract_id, "htlc refunded");
		self.events
			.send(HtlcEvent::Refund {
				contract_id: contract_id.to_string(),
			})
			.ok();
		Ok(())
	}

	async fn get_htlc(&self, contract_id: &str) -> Result<Htlc, HtlcError> {
		self.state
			.lock()
			.unwrap()
			.contracts
			.get(contract_id)
			.cloned()
			.ok_or_else(|| HtlcError::ContractNotFound(contract_id.to_string()))
	}

	async fn get_status(&self, contract_id: &str) -> Result<HtlcStatus, HtlcError> {
		Ok(self.get_htlc(contract_id).await?.status)
	}

	async fn contract_exists(&self, contract_id: &str) -> Result<bool, HtlcError> {
		Ok(self.state.lock().unwrap().contracts.contains_key(contract_id))
	}

	async fn balance_of(&self, asset: &AssetConfig) -> Result<U256, HtlcError> {
		Ok(self
			.state
			.lock()
			.unwrap()
			.balances
			.get(&asset.address)
			.copied()
			.unwrap_or(U256::ZERO))
	}

	fn subscribe(&self) -> broadcast::Receiver<HtlcEvent> {
		self.events.subscribe()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use resolver_types::derive_hashlock;

	fn secret() -> [u8; 32] {
		[42u8; 32]
	}

	fn params(network: Network, amount: u64, partial: bool) -> CreateHtlcParams {
		CreateHtlcParams {
			sender: "0xresolver".into(),
			receiver: "0xreceiver".into(),
			amount: U256::from(amount),
			token_address: "0xtoken".into(),
			hashlock: derive_hashlock(network, &secret()),
			timelock: now_secs() + 3600,
			safety_deposit: U256::from(amount / 10),
			allow_partial_fills: partial,
			min_fill_amount: if partial { U256::from(5) } else { U256::ZERO },
		}
	}

	#[tokio::test]
	async fn create_validates_inputs() {
		let chain = SimulatedChain::new(Network::Ethereum);

		let mut zero = params(Network::Ethereum, 100, false);
		zero.amount = U256::ZERO;
		assert!(matches!(
			chain.create_htlc(zero).await,
			Err(HtlcError::InvalidAmount)
		));

		let mut past = params(Network::Ethereum, 100, false);
		past.timelock = now_secs().saturating_sub(1);
		assert!(matches!(
			chain.create_htlc(past).await,
			Err(HtlcError::InvalidTimelock)
		));
	}

	#[tokio::test]
	async fn create_locks_seeded_balances() {
		let chain = SimulatedChain::new(Network::Ethereum);
		chain.set_balance("0xtoken", U256::from(50));

		// amount 100 + deposit 10 exceeds the seeded 50.
		assert!(matches!(
			chain.create_htlc(params(Network::Ethereum, 100, false)).await,
			Err(HtlcError::InsufficientBalance)
		));

		chain.set_balance("0xtoken", U256::from(200));
		chain
			.create_htlc(params(Network::Ethereum, 100, false))
			.await
			.unwrap();
		let cfg = AssetConfig {
			address: "0xtoken".into(),
			symbol: "TKN".into(),
			decimals: 0,
			network: Network::Ethereum,
			is_native: false,
			min_threshold: "0".into(),
			warning_threshold: "0".into(),
		};
		assert_eq!(chain.balance_of(&cfg).await.unwrap(), U256::from(90));
	}

	#[tokio::test]
	async fn withdraw_requires_the_right_preimage_for_the_network() {
		let chain = SimulatedChain::new(Network::Stellar);
		let id = chain
			.create_htlc(params(Network::Stellar, 100, false))
			.await
			.unwrap();

		// A keccak-derived hashlock would not verify on the SHA-256 chain,
		// and a wrong secret never does.
		assert!(matches!(
			chain.withdraw(&id, [1u8; 32], U256::ZERO).await,
			Err(HtlcError::InvalidPreimage)
		));

		chain.withdraw(&id, secret(), U256::ZERO).await.unwrap();
		assert_eq!(
			chain.get_status(&id).await.unwrap(),
			HtlcStatus::Withdrawn
		);

		assert!(matches!(
			chain.withdraw(&id, secret(), U256::ZERO).await,
			Err(HtlcError::AlreadyWithdrawn)
		));
	}

	#[tokio::test]
	async fn partial_fills_keep_the_amount_invariant() {
		let chain = SimulatedChain::new(Network::Ethereum);
		let mut p = params(Network::Ethereum, 30, true);
		p.safety_deposit = U256::from(100);
		let id = chain.create_htlc(p).await.unwrap();

		chain.withdraw(&id, secret(), U256::from(10)).await.unwrap();
		let htlc = chain.get_htlc(&id).await.unwrap();
		assert_eq!(htlc.status, HtlcStatus::PartiallyFilled);
		assert_eq!(htlc.filled_amount + htlc.remaining_amount, htlc.amount);
		// 100 * 10 / 30 truncates to 33.
		assert_eq!(htlc.remaining_safety_deposit, U256::from(67));

		chain.withdraw(&id, secret(), U256::from(20)).await.unwrap();
		let htlc = chain.get_htlc(&id).await.unwrap();
		assert_eq!(htlc.status, HtlcStatus::Withdrawn);
		assert_eq!(htlc.filled_amount, htlc.amount);
		assert_eq!(htlc.remaining_amount, U256::ZERO);
		assert_eq!(htlc.remaining_safety_deposit, U256::ZERO);
	}

	#[tokio::test]
	async fn partial_fill_floors_are_enforced() {
		let chain = SimulatedChain::new(Network::Ethereum);

		let id = chain
			.create_htlc(params(Network::Ethereum, 100, false))
			.await
			.unwrap();
		assert!(matches!(
			chain.withdraw(&id, secret(), U256::from(40)).await,
			Err(HtlcError::PartialFillsNotAllowed)
		));

		let id = chain
			.create_htlc(params(Network::Ethereum, 100, true))
			.await
			.unwrap();
		assert!(matches!(
			chain.withdraw(&id, secret(), U256::from(3)).await,
			Err(HtlcError::BelowMinimumFill { .. })
		));
		assert!(matches!(
			chain.withdraw(&id, secret(), U256::from(101)).await,
			Err(HtlcError::InsufficientRemainingAmount { .. })
		));
	}

	#[tokio::test]
	async fn refund_only_after_timelock() {
		let chain = SimulatedChain::new(Network::Ethereum);
		let mut p = params(Network::Ethereum, 100, false);
		p.timelock = now_secs() + 1;
		chain.set_balance("0xtoken", U256::from(200));
		let id = chain.create_htlc(p).await.unwrap();

		assert!(matches!(
			chain.refund(&id).await,
			Err(HtlcError::TimelockNotExpired)
		));

		tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
		chain.refund(&id).await.unwrap();
		assert_eq!(chain.get_status(&id).await.unwrap(), HtlcStatus::Refunded);
		// 200 - 110 locked + 110 returned.
		let cfg = AssetConfig {
			address: "0xtoken".into(),
			symbol: "TKN".into(),
			decimals: 0,
			network: Network::Ethereum,
			is_native: false,
			min_threshold: "0".into(),
			warning_threshold: "0".into(),
		};
		assert_eq!(chain.balance_of(&cfg).await.unwrap(), U256::from(200));

		assert!(matches!(
			chain.refund(&id).await,
			Err(HtlcError::AlreadyRefunded)
		));
	}

	#[tokio::test]
	async fn withdrawal_events_carry_the_preimage() {
		let chain = SimulatedChain::new(Network::Ethereum);
		let mut rx = chain.subscribe();
		let id = chain
			.create_htlc(params(Network::Ethereum, 100, false))
			.await
			.unwrap();
		chain.withdraw(&id, secret(), U256::ZERO).await.unwrap();

		let mut saw_withdraw = false;
		while let Ok(event) = rx.try_recv() {
			if let HtlcEvent::Withdraw {
				contract_id,
				preimage,
				withdraw_amount,
				is_partial,
			} = event
			{
				assert_eq!(contract_id, id);
				assert_eq!(preimage, secret());
				assert_eq!(withdraw_amount, U256::from(100));
				assert!(!is_partial);
				saw_withdraw = true;
			}
		}
		assert!(saw_withdraw);
	}
}
