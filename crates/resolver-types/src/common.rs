//! Common types used throughout the resolver system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Returns the current Unix timestamp in seconds.
pub fn now_secs() -> Timestamp {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.unwrap()
		.as_secs()
}

/// The ledgers the resolver operates across.
///
/// Each network expects a different hash primitive for HTLC hashlocks:
/// keccak256 on Ethereum, SHA-256 on Stellar. See [`crate::derive_hashlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
	Ethereum,
	Stellar,
}

impl Network {
	/// The counterparty network for a cross-chain pair.
	pub fn counterpart(&self) -> Network {
		match self {
			Network::Ethereum => Network::Stellar,
			Network::Stellar => Network::Ethereum,
		}
	}
}

impl fmt::Display for Network {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Network::Ethereum => write!(f, "ethereum"),
			Network::Stellar => write!(f, "stellar"),
		}
	}
}

impl std::str::FromStr for Network {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"ethereum" => Ok(Network::Ethereum),
			"stellar" => Ok(Network::Stellar),
			other => Err(format!("unrecognized network: {}", other)),
		}
	}
}
