//! HTLC records, pairings and the cross-chain hashlock derivation.

use alloy_primitives::{keccak256, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Network, Timestamp};

/// Derives the hashlock a network's HTLC contract expects from the shared
/// secret.
///
/// The two chains disagree on the hash primitive: Ethereum contracts verify
/// `keccak256(preimage)`, Stellar contracts verify `sha256(preimage)`. Both
/// legs of a pair must be derived from the same secret with this function or
/// they become unclaimable with one preimage.
pub fn derive_hashlock(network: Network, secret: &[u8; 32]) -> [u8; 32] {
	match network {
		Network::Ethereum => keccak256(secret).0,
		Network::Stellar => {
			let digest = Sha256::digest(secret);
			digest.into()
		}
	}
}

/// On-chain status of a single HTLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HtlcStatus {
	Active,
	PartiallyFilled,
	Withdrawn,
	Refunded,
}

/// A remote HTLC record as observed through a chain's contract surface.
///
/// Invariant at every observation: `filled_amount + remaining_amount ==
/// amount`, and the status is `Withdrawn` exactly when `remaining_amount` is
/// zero after at least one withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Htlc {
	pub contract_id: String,
	pub sender: String,
	pub receiver: String,
	pub amount: U256,
	pub remaining_amount: U256,
	pub filled_amount: U256,
	pub token_address: String,
	#[serde(with = "hex_bytes32")]
	pub hashlock: [u8; 32],
	pub timelock: Timestamp,
	pub safety_deposit: U256,
	pub remaining_safety_deposit: U256,
	pub status: HtlcStatus,
	pub allow_partial_fills: bool,
	pub min_fill_amount: U256,
}

/// Parameters for creating an HTLC on one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHtlcParams {
	pub sender: String,
	pub receiver: String,
	pub amount: U256,
	pub token_address: String,
	#[serde(with = "hex_bytes32")]
	pub hashlock: [u8; 32],
	pub timelock: Timestamp,
	pub safety_deposit: U256,
	pub allow_partial_fills: bool,
	pub min_fill_amount: U256,
}

/// Contract events consumed for monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HtlcEvent {
	New {
		contract_id: String,
	},
	Withdraw {
		contract_id: String,
		#[serde(with = "hex_bytes32")]
		preimage: [u8; 32],
		withdraw_amount: U256,
		is_partial: bool,
	},
	Refund {
		contract_id: String,
	},
}

/// Lifecycle of a cross-chain HTLC pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
	BothCreated,
	SecretRevealed,
	Completed,
	Refunded,
}

/// The two legs of a cross-chain swap, keyed by order hash.
///
/// The secret is generated once per order and is the sole capability needed
/// to claim either leg. It never leaves the resolver through serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtlcPair {
	pub order_hash: String,
	pub ethereum_contract_id: String,
	pub stellar_contract_id: String,
	#[serde(skip_serializing)]
	#[serde(default)]
	pub secret: [u8; 32],
	/// keccak256 of the secret; the Stellar leg derives its own SHA-256
	/// hashlock from the same secret.
	#[serde(with = "hex_bytes32")]
	pub hashlock: [u8; 32],
	pub timelock: Timestamp,
	pub status: PairStatus,
	pub created_at: Timestamp,
}

impl HtlcPair {
	/// The contract id of this pair's leg on the given network.
	pub fn contract_id_on(&self, network: Network) -> &str {
		match network {
			Network::Ethereum => &self.ethereum_contract_id,
			Network::Stellar => &self.stellar_contract_id,
		}
	}
}

mod hex_bytes32 {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8; 32], ser: S) -> Result<S::Ok, S::Error> {
		ser.serialize_str(&format!("0x{}", hex::encode(bytes)))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 32], D::Error> {
		let s = String::deserialize(de)?;
		let raw = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
		raw.try_into()
			.map_err(|_| serde::de::Error::custom("expected 32 bytes"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hashlocks_differ_per_network() {
		let secret = [7u8; 32];
		let eth = derive_hashlock(Network::Ethereum, &secret);
		let xlm = derive_hashlock(Network::Stellar, &secret);
		assert_ne!(eth, xlm);
		// Deterministic per network.
		assert_eq!(eth, derive_hashlock(Network::Ethereum, &secret));
		assert_eq!(xlm, derive_hashlock(Network::Stellar, &secret));
	}

	#[test]
	fn pair_secret_is_never_serialized() {
		let pair = HtlcPair {
			order_hash: "0xabc".into(),
			ethereum_contract_id: "0x1".into(),
			stellar_contract_id: "0x2".into(),
			secret: [9u8; 32],
			hashlock: [1u8; 32],
			timelock: 1_700_000_000,
			status: PairStatus::BothCreated,
			created_at: 1_700_000_000,
		};
		let json = serde_json::to_string(&pair).unwrap();
		assert!(!json.contains("secret"));
		assert!(json.contains("hashlock"));
	}

	#[test]
	fn hashlock_round_trips_through_hex() {
		let params = CreateHtlcParams {
			sender: "a".into(),
			receiver: "b".into(),
			amount: U256::from(100),
			token_address: "native".into(),
			hashlock: [0xAB; 32],
			timelock: 42,
			safety_deposit: U256::from(10),
			allow_partial_fills: false,
			min_fill_amount: U256::ZERO,
		};
		let json = serde_json::to_string(&params).unwrap();
		let back: CreateHtlcParams = serde_json::from_str(&json).unwrap();
		assert_eq!(back.hashlock, [0xAB; 32]);
	}
}
