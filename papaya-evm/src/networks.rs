//! Known EVM networks and stablecoin deployments.
//!
//! Custody contracts differ per deployment, so they are not listed here; the
//! host supplies one per network and [`KnownNetwork::with_custody`] turns the
//! static data into a [`NetworkConfig`].

use alloy_primitives::{Address, address};
use papaya::chain::ChainId;
use papaya::networks::{NetworkConfig, TokenConfig};

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: ChainId = 1;

/// BNB Smart Chain chain ID.
pub const BSC_MAINNET: ChainId = 56;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: ChainId = 137;

/// Base Mainnet chain ID.
pub const BASE_MAINNET: ChainId = 8453;

/// Arbitrum One chain ID.
pub const ARBITRUM_MAINNET: ChainId = 42161;

/// Avalanche C-Chain chain ID.
pub const AVALANCHE_MAINNET: ChainId = 43114;

/// USDC on Ethereum Mainnet.
pub const USDC_ETHEREUM: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
/// USDT on Ethereum Mainnet.
pub const USDT_ETHEREUM: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");
/// PYUSD on Ethereum Mainnet.
pub const PYUSD_ETHEREUM: Address = address!("6c3ea9036406852006290770BEdFcAbA0e23A0e8");

/// USDC on BNB Smart Chain (18 decimals).
pub const USDC_BSC: Address = address!("8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d");
/// USDT on BNB Smart Chain (18 decimals).
pub const USDT_BSC: Address = address!("55d398326f99059fF775485246999027B3197955");

/// USDC on Polygon Mainnet.
pub const USDC_POLYGON: Address = address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359");
/// USDT on Polygon Mainnet.
pub const USDT_POLYGON: Address = address!("c2132D05D31c914a87C6611C10748AEb04B58e8F");

/// USDC on Base Mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC on Arbitrum One.
pub const USDC_ARBITRUM: Address = address!("af88d065e77c8cC2239327C5EDb3A432268e5831");
/// USDT on Arbitrum One.
pub const USDT_ARBITRUM: Address = address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9");

/// USDC on Avalanche C-Chain.
pub const USDC_AVALANCHE: Address = address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");
/// USDT on Avalanche C-Chain.
pub const USDT_AVALANCHE: Address = address!("9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7");

/// Decimals of the Circle and Tether deployments outside BNB Smart Chain.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

/// A stablecoin deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownToken {
    /// Ticker.
    pub symbol: &'static str,
    /// ERC-20 contract.
    pub address: Address,
    /// Token decimals.
    pub decimals: u8,
}

/// Static description of an EVM network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownNetwork {
    /// EIP-155 chain ID.
    pub chain_id: ChainId,
    /// Display name.
    pub name: &'static str,
    /// Native gas token symbol.
    pub native_token: &'static str,
    /// Fiat price id of the native token.
    pub price_id: &'static str,
    /// Whether transactions use EIP-1559 pricing.
    pub eip1559: bool,
    /// Stablecoins deployed on the network.
    pub tokens: &'static [KnownToken],
}

impl KnownNetwork {
    /// Builds a [`NetworkConfig`] where every token settles into `custody`.
    #[must_use]
    pub fn with_custody(&self, custody: Address) -> NetworkConfig {
        NetworkConfig {
            chain_id: self.chain_id,
            name: self.name.to_owned(),
            native_token: self.native_token.to_owned(),
            price_id: self.price_id.to_owned(),
            eip1559: self.eip1559,
            tokens: self
                .tokens
                .iter()
                .map(|token| TokenConfig {
                    symbol: token.symbol.to_owned(),
                    erc20_address: token.address,
                    custody_address: custody,
                    decimals: token.decimals,
                })
                .collect(),
        }
    }
}

const fn token(symbol: &'static str, address: Address) -> KnownToken {
    KnownToken {
        symbol,
        address,
        decimals: DEFAULT_TOKEN_DECIMALS,
    }
}

static KNOWN_NETWORKS: &[KnownNetwork] = &[
    KnownNetwork {
        chain_id: ETHEREUM_MAINNET,
        name: "Ethereum",
        native_token: "ETH",
        price_id: "ethereum",
        eip1559: true,
        tokens: &[
            token("USDC", USDC_ETHEREUM),
            token("USDT", USDT_ETHEREUM),
            token("PYUSD", PYUSD_ETHEREUM),
        ],
    },
    KnownNetwork {
        chain_id: BSC_MAINNET,
        name: "BNB Smart Chain",
        native_token: "BNB",
        price_id: "binancecoin",
        eip1559: false,
        tokens: &[
            KnownToken {
                symbol: "USDC",
                address: USDC_BSC,
                decimals: 18,
            },
            KnownToken {
                symbol: "USDT",
                address: USDT_BSC,
                decimals: 18,
            },
        ],
    },
    KnownNetwork {
        chain_id: POLYGON_MAINNET,
        name: "Polygon",
        native_token: "POL",
        price_id: "matic-network",
        eip1559: true,
        tokens: &[token("USDC", USDC_POLYGON), token("USDT", USDT_POLYGON)],
    },
    KnownNetwork {
        chain_id: BASE_MAINNET,
        name: "Base",
        native_token: "ETH",
        price_id: "ethereum",
        eip1559: true,
        tokens: &[token("USDC", USDC_BASE)],
    },
    KnownNetwork {
        chain_id: ARBITRUM_MAINNET,
        name: "Arbitrum One",
        native_token: "ETH",
        price_id: "ethereum",
        eip1559: true,
        tokens: &[token("USDC", USDC_ARBITRUM), token("USDT", USDT_ARBITRUM)],
    },
    KnownNetwork {
        chain_id: AVALANCHE_MAINNET,
        name: "Avalanche C-Chain",
        native_token: "AVAX",
        price_id: "avalanche-2",
        eip1559: true,
        tokens: &[token("USDC", USDC_AVALANCHE), token("USDT", USDT_AVALANCHE)],
    },
];

/// All known EVM networks.
#[must_use]
pub const fn known_networks() -> &'static [KnownNetwork] {
    KNOWN_NETWORKS
}

/// Looks up a known network by chain ID.
#[must_use]
pub fn known_network(chain_id: ChainId) -> Option<&'static KnownNetwork> {
    KNOWN_NETWORKS.iter().find(|n| n.chain_id == chain_id)
}
