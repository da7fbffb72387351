//! JSON-RPC chain client.
//!
//! Talks to a chain relay node exposing the HTLC contract surface over
//! JSON-RPC 2.0. Contract failures arrive as structured error codes and are
//! translated back into [`HtlcError`] variants; transport failures surface
//! as `HtlcError::Network`.

use alloy_primitives::U256;
use async_trait::async_trait;
use resolver_types::{AssetConfig, CreateHtlcParams, Htlc, HtlcError, HtlcEvent, HtlcStatus, Network};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ChainClient;

// Error codes of the relay node's contract surface.
const ERR_INVALID_AMOUNT: i64 = 1001;
const ERR_INVALID_TIMELOCK: i64 = 1002;
const ERR_INSUFFICIENT_BALANCE: i64 = 1003;
const ERR_CONTRACT_NOT_FOUND: i64 = 1004;
const ERR_INVALID_PREIMAGE: i64 = 1005;
const ERR_TIMELOCK_EXPIRED: i64 = 1006;
const ERR_TIMELOCK_NOT_EXPIRED: i64 = 1007;
const ERR_UNAUTHORIZED: i64 = 1008;
const ERR_ALREADY_WITHDRAWN: i64 = 1009;
const ERR_ALREADY_REFUNDED: i64 = 1010;
const ERR_PARTIAL_FILLS_NOT_ALLOWED: i64 = 1011;
const ERR_BELOW_MINIMUM_FILL: i64 = 1012;
const ERR_INSUFFICIENT_REMAINING: i64 = 1013;

#[derive(Debug, Deserialize)]
struct RpcFailure {
	code: i64,
	message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
	result: Option<T>,
	error: Option<RpcFailure>,
}

#[derive(Debug, Deserialize)]
struct EventBatch {
	events: Vec<HtlcEvent>,
	cursor: u64,
}

pub struct RpcChainClient {
	network: Network,
	endpoint: String,
	http: reqwest::Client,
	events: broadcast::Sender<HtlcEvent>,
	request_id: AtomicU64,
}

impl RpcChainClient {
	pub fn new(network: Network, endpoint: impl Into<String>) -> Self {
		let (events, _) = broadcast::channel(256);
		Self {
			network,
			endpoint: endpoint.into(),
			http: reqwest::Client::new(),
			events,
			request_id: AtomicU64::new(1),
		}
	}

	async fn call<T: DeserializeOwned>(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<T, HtlcError> {
		let id = self.request_id.fetch_add(1, Ordering::Relaxed);
		let body = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		});

		let response = self
			.http
			.post(&self.endpoint)
			.json(&body)
			.send()
			.await
			.map_err(|e| HtlcError::Network(e.to_string()))?;

		let parsed: RpcResponse<T> = response
			.json()
			.await
			.map_err(|e| HtlcError::Network(format!("malformed response: {}", e)))?;

		if let Some(failure) = parsed.error {
			return Err(map_error(failure));
		}
		parsed
			.result
			.ok_or_else(|| HtlcError::Network("response carried neither result nor error".into()))
	}

	/// Spawns a poller that drains the relay node's event feed into this
	/// client's broadcast channel.
	pub fn spawn_event_poller(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut cursor = 0u64;
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
			loop {
				ticker.tick().await;
				match self
					.call::<EventBatch>("htlc_events", json!([cursor]))
					.await
				{
					Ok(batch) => {
						cursor = batch.cursor;
						for event in batch.events {
							debug!(network = %self.network, ?event, "chain event");
							self.events.send(event).ok();
						}
					}
					Err(err) => {
						warn!(network = %self.network, error = %err, "event poll failed");
					}
				}
			}
		})
	}
}

fn map_error(failure: RpcFailure) -> HtlcError {
	match failure.code {
		ERR_INVALID_AMOUNT => HtlcError::InvalidAmount,
		ERR_INVALID_TIMELOCK => HtlcError::InvalidTimelock,
		ERR_INSUFFICIENT_BALANCE => HtlcError::InsufficientBalance,
		ERR_CONTRACT_NOT_FOUND => HtlcError::ContractNotFound(failure.message),
		ERR_INVALID_PREIMAGE => HtlcError::InvalidPreimage,
		ERR_TIMELOCK_EXPIRED => HtlcError::TimelockExpired,
		ERR_TIMELOCK_NOT_EXPIRED => HtlcError::TimelockNotExpired,
		ERR_UNAUTHORIZED => HtlcError::Unauthorized,
		ERR_ALREADY_WITHDRAWN => HtlcError::AlreadyWithdrawn,
		ERR_ALREADY_REFUNDED => HtlcError::AlreadyRefunded,
		ERR_PARTIAL_FILLS_NOT_ALLOWED => HtlcError::PartialFillsNotAllowed,
		ERR_BELOW_MINIMUM_FILL => HtlcError::BelowMinimumFill {
			requested: U256::ZERO,
			minimum: U256::ZERO,
		},
		ERR_INSUFFICIENT_REMAINING => HtlcError::InsufficientRemainingAmount {
			requested: U256::ZERO,
			remaining: U256::ZERO,
		},
		_ => HtlcError::Network(format!("rpc error {}: {}", failure.code, failure.message)),
	}
}

#[async_trait]
impl ChainClient for RpcChainClient {
	fn network(&self) -> Network {
		self.network
	}

	async fn create_htlc(&self, params: CreateHtlcParams) -> Result<String, HtlcError> {
		self.call("htlc_create", json!([params])).await
	}

	async fn withdraw(
		&self,
		contract_id: &str,
		preimage: [u8; 32],
		amount: U256,
	) -> Result<(), HtlcError> {
		let _: serde_json::Value = self
			.call(
				"htlc_withdraw",
				json!([contract_id, format!("0x{}", hex::encode(preimage)), amount]),
			)
			.await?;
		Ok(())
	}

	async fn refund(&self, contract_id: &str) -> Result<(), HtlcError> {
		let _: serde_json::Value = self.call("htlc_refund", json!([contract_id])).await?;
		Ok(())
	}

	async fn get_htlc(&self, contract_id: &str) -> Result<Htlc, HtlcError> {
		self.call("htlc_get", json!([contract_id])).await
	}

	async fn get_status(&self, contract_id: &str) -> Result<HtlcStatus, HtlcError> {
		self.call("htlc_status", json!([contract_id])).await
	}

	async fn contract_exists(&self, contract_id: &str) -> Result<bool, HtlcError> {
		self.call("htlc_exists", json!([contract_id])).await
	}

	async fn balance_of(&self, asset: &AssetConfig) -> Result<U256, HtlcError> {
		self.call("chain_balanceOf", json!([asset.address])).await
	}

	fn subscribe(&self) -> broadcast::Receiver<HtlcEvent> {
		self.events.subscribe()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn contract_error_codes_round_trip() {
		let err = map_error(RpcFailure {
			code: ERR_INVALID_PREIMAGE,
			message: "bad preimage".into(),
		});
		assert!(matches!(err, HtlcError::InvalidPreimage));

		let err = map_error(RpcFailure {
			code: -32601,
			message: "method not found".into(),
		});
		assert!(matches!(err, HtlcError::Network(_)));
	}

	#[tokio::test]
	async fn transport_failure_is_a_network_error() {
		// Nothing listens on this port.
		let client = RpcChainClient::new(Network::Ethereum, "http://127.0.0.1:1/rpc");
		let err = client.contract_exists("0x0").await.unwrap_err();
		assert!(matches!(err, HtlcError::Network(_)));
	}
}
