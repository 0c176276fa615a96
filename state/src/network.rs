use std::fmt;
use std::str::FromStr;

use ethers_core::types::{Address, H160, H256};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

pub const ENTRY_POINT_V07: Address = H160([
    0x00, 0x00, 0x00, 0x00, 0x71, 0x72, 0x7d, 0xe2, 0x2e, 0x5e, 0x9d, 0x8b, 0xaf, 0x0e, 0xda, 0xc6,
    0xf3, 0x7d, 0xa0, 0x32,
]);

pub const WALLET_FACTORY: Address = H160([
    0xf5, 0x21, 0xe6, 0x09, 0xe6, 0x13, 0x53, 0xf3, 0x22, 0x8c, 0x06, 0x82, 0xa3, 0x6b, 0x01, 0x13,
    0xdb, 0x14, 0x70, 0xf4,
]);

pub const WALLET_INIT_CODE_HASH: H256 = H256([
    0x49, 0xd8, 0x49, 0x1b, 0xe2, 0x9c, 0xd0, 0x62, 0x0f, 0xff, 0x3a, 0x5e, 0x73, 0xb3, 0x71, 0x7c,
    0x8c, 0x26, 0x04, 0x46, 0xf6, 0xfe, 0xdb, 0xa9, 0xf0, 0x88, 0xf9, 0xbe, 0xb7, 0xf0, 0xc9, 0xde,
]);

/// Supported deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Mainnet,
    BaseSepolia,
}

impl Network {
    /// `production` selects mainnet, anything else the test network.
    pub fn for_environment(env: &str) -> Self {
        if env.eq_ignore_ascii_case("production") {
            Network::Mainnet
        } else {
            Network::BaseSepolia
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::BaseSepolia => 84532,
        }
    }

    pub fn config(&self) -> NetworkConfig {
        NetworkConfig::preset(*self)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::BaseSepolia => f.write_str("base-sepolia"),
        }
    }
}

impl FromStr for Network {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "ethereum" | "1" => Ok(Network::Mainnet),
            "base-sepolia" | "basesepolia" | "84532" => Ok(Network::BaseSepolia),
            other => Err(StateError::InvalidValue {
                field: "network",
                value: other.to_string(),
            }),
        }
    }
}

/// Addresses and endpoints for one deployment.
///
/// Address derivation is only valid when `factory` and `wallet_init_code_hash`
/// match the deployed factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    pub factory: Address,
    pub wallet_init_code_hash: H256,
    pub entry_point: Address,
    pub rpc_url: String,
    pub bundler_url: String,
}

impl NetworkConfig {
    pub fn preset(network: Network) -> Self {
        let (name, rpc_url) = match network {
            Network::Mainnet => ("Ethereum", "https://eth.merkle.io"),
            Network::BaseSepolia => ("Base Sepolia", "https://sepolia.base.org"),
        };
        Self {
            chain_id: network.chain_id(),
            name: name.to_string(),
            factory: WALLET_FACTORY,
            wallet_init_code_hash: WALLET_INIT_CODE_HASH,
            entry_point: ENTRY_POINT_V07,
            rpc_url: rpc_url.to_string(),
            bundler_url: format!("https://api.candide.dev/public/v3/{}", network.chain_id()),
        }
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = url.into();
        self
    }

    pub fn with_bundler_url(mut self, url: impl Into<String>) -> Self {
        self.bundler_url = url.into();
        self
    }

    pub fn with_factory(mut self, factory: Address, init_code_hash: H256) -> Self {
        self.factory = factory;
        self.wallet_init_code_hash = init_code_hash;
        self
    }
}
