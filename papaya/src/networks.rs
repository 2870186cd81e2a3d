//! Token and network registry.
//!
//! Concrete network data lives in chain-specific crates (`papaya-evm` ships
//! the known EIP-155 networks) and in the host's configuration, which
//! supplies the custody contract per deployment. Applications assemble a
//! [`NetworkRegistry`] from these at startup; it is immutable afterwards.

use std::collections::HashMap;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::amount::CUSTODY_DECIMALS;
use crate::chain::ChainId;

const fn default_decimals() -> u8 {
    6
}

const fn default_eip1559() -> bool {
    true
}

/// A payment token accepted on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    /// Ticker, e.g. `"USDC"`.
    pub symbol: String,
    /// ERC-20 contract.
    pub erc20_address: Address,
    /// Custody contract that holds deposits in this token.
    pub custody_address: Address,
    /// Token decimals, 6 for the shipped stablecoins.
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

/// A network the checkout can run on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// EIP-155 chain ID.
    pub chain_id: ChainId,
    /// Display name.
    pub name: String,
    /// Native gas token symbol, e.g. `"POL"`.
    pub native_token: String,
    /// Fiat price source id of the native token, e.g. `"matic-network"`.
    pub price_id: String,
    /// Whether the chain prices gas with EIP-1559.
    #[serde(default = "default_eip1559")]
    pub eip1559: bool,
    /// Accepted payment tokens.
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

impl NetworkConfig {
    /// Finds a token by symbol (case-insensitive).
    #[must_use]
    pub fn find_token(&self, symbol: &str) -> Option<&TokenConfig> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }
}

/// Errors raised while building or querying a [`NetworkRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No network is registered for the chain.
    #[error("Unsupported network: chain {0}")]
    UnsupportedNetwork(ChainId),
    /// The network exists but does not accept the token.
    #[error("Unsupported token {symbol} on chain {chain_id}")]
    UnsupportedToken {
        /// Chain that was queried.
        chain_id: ChainId,
        /// Requested symbol.
        symbol: String,
    },
    /// Token decimals exceed the custody contract's precision.
    #[error("Token {symbol} on chain {chain_id} has {decimals} decimals, at most 18 are supported")]
    InvalidDecimals {
        /// Chain of the offending token.
        chain_id: ChainId,
        /// Token symbol.
        symbol: String,
        /// Configured decimals.
        decimals: u8,
    },
    /// The chain is already registered.
    #[error("Network for chain {0} is registered twice")]
    DuplicateNetwork(ChainId),
    /// Two tokens on one network share a symbol, ignoring case.
    #[error("Token {symbol} is listed twice on chain {chain_id}")]
    DuplicateToken {
        /// Chain of the offending token.
        chain_id: ChainId,
        /// Repeated symbol.
        symbol: String,
    },
}

/// Registry mapping chain IDs to their [`NetworkConfig`].
///
/// # Example
///
/// ```ignore
/// use papaya::networks::NetworkRegistry;
///
/// let registry = NetworkRegistry::from_networks(networks)?;
/// let (network, token) = registry.resolve_token(137, "usdc")?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: HashMap<ChainId, NetworkConfig>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from a list of networks.
    ///
    /// # Errors
    ///
    /// Fails like [`NetworkRegistry::register`] for the first network it
    /// rejects.
    pub fn from_networks(
        networks: impl IntoIterator<Item = NetworkConfig>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for network in networks {
            registry.register(network)?;
        }
        Ok(registry)
    }

    /// Adds a network.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateNetwork`] if the chain is already
    /// registered, [`RegistryError::DuplicateToken`] if two tokens share a
    /// symbol, or [`RegistryError::InvalidDecimals`] if any token has more
    /// than 18 decimals.
    pub fn register(&mut self, network: NetworkConfig) -> Result<(), RegistryError> {
        if self.networks.contains_key(&network.chain_id) {
            return Err(RegistryError::DuplicateNetwork(network.chain_id));
        }
        for (i, token) in network.tokens.iter().enumerate() {
            if network.tokens[..i]
                .iter()
                .any(|t| t.symbol.eq_ignore_ascii_case(&token.symbol))
            {
                return Err(RegistryError::DuplicateToken {
                    chain_id: network.chain_id,
                    symbol: token.symbol.clone(),
                });
            }
        }
        if let Some(token) = network
            .tokens
            .iter()
            .find(|t| t.decimals > CUSTODY_DECIMALS)
        {
            return Err(RegistryError::InvalidDecimals {
                chain_id: network.chain_id,
                symbol: token.symbol.clone(),
                decimals: token.decimals,
            });
        }
        self.networks.insert(network.chain_id, network);
        Ok(())
    }

    /// Looks up a network by chain ID.
    #[must_use]
    pub fn network(&self, chain_id: ChainId) -> Option<&NetworkConfig> {
        self.networks.get(&chain_id)
    }

    /// Resolves the network and token for a checkout.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnsupportedNetwork`] or
    /// [`RegistryError::UnsupportedToken`] when either lookup fails.
    pub fn resolve_token(
        &self,
        chain_id: ChainId,
        symbol: &str,
    ) -> Result<(&NetworkConfig, &TokenConfig), RegistryError> {
        let network = self
            .network(chain_id)
            .ok_or(RegistryError::UnsupportedNetwork(chain_id))?;
        let token = network
            .find_token(symbol)
            .ok_or_else(|| RegistryError::UnsupportedToken {
                chain_id,
                symbol: symbol.to_owned(),
            })?;
        Ok((network, token))
    }

    /// Native token symbol for a chain, `"ETH"` when the chain is unknown.
    #[must_use]
    pub fn native_token(&self, chain_id: ChainId) -> &str {
        self.network(chain_id)
            .map_or("ETH", |n| n.native_token.as_str())
    }

    /// Iterates over registered networks in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkConfig> {
        self.networks.values()
    }

    /// Number of registered networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// Whether no network is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
