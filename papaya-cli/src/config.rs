//! Host configuration.
//!
//! Loaded from a TOML file in which string values may reference environment
//! variables as `$VAR` or `${VAR}`.
//!
//! # Example Configuration
//!
//! ```toml
//! price_api_url = "https://api.coingecko.com/"
//! receipt_timeout_secs = 120
//!
//! [orchestration]
//! batch_deposit_and_subscribe = true
//!
//! [networks."eip155:137"]
//! rpc_url = "$POLYGON_RPC_URL"
//! custody_address = "$POLYGON_CUSTODY"
//! ```
//!
//! Known chains take their name, native token and stablecoins from
//! [`papaya_evm::known_network`]; `custody_address` attaches the custody
//! contract to all of them. Other chains, or extra tokens, are listed under
//! `[[networks."eip155:<id>".tokens]]`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use papaya::chain::{ChainId, parse_caip2};
use papaya::controller::OrchestrationConfig;
use papaya::networks::{NetworkConfig, NetworkRegistry, RegistryError, TokenConfig};
use papaya_evm::{ChainEndpoint, known_network};
use papaya_http::coingecko::DEFAULT_PRICE_API_URL;
use serde::Deserialize;
use url::Url;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "papaya.toml";

const DEFAULT_DECIMALS: u8 = 6;

/// Errors while loading or interpreting the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Configuration path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`CliConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A `networks` key is not `eip155:<chain id>`.
    #[error("invalid network identifier {0:?}, expected eip155:<chain id>")]
    InvalidNetworkId(String),
    /// An `rpc_url` does not parse.
    #[error("invalid RPC URL for {network}: {source}")]
    InvalidRpcUrl {
        /// Network key.
        network: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// A token has no custody contract.
    #[error("{network}: token {symbol} has no custody_address")]
    MissingCustody {
        /// Network key.
        network: String,
        /// Token symbol.
        symbol: String,
    },
    /// The assembled networks were rejected by the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    /// Controller tunables.
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    /// Base URL of the CoinGecko-compatible price API.
    #[serde(default)]
    pub price_api_url: Option<String>,
    /// Optional price API key.
    #[serde(default)]
    pub price_api_key: Option<String>,
    /// Seconds to wait for a transaction receipt.
    #[serde(default)]
    pub receipt_timeout_secs: Option<u64>,
    /// Networks keyed by CAIP-2 identifier.
    #[serde(default)]
    pub networks: HashMap<String, NetworkEntry>,
}

/// One `[networks."eip155:<id>"]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkEntry {
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: String,
    /// Custody contract for every token on the network.
    #[serde(default)]
    pub custody_address: Option<Address>,
    /// Display name override.
    #[serde(default)]
    pub name: Option<String>,
    /// Native token override.
    #[serde(default)]
    pub native_token: Option<String>,
    /// Fiat price id override.
    #[serde(default)]
    pub price_id: Option<String>,
    /// EIP-1559 override.
    #[serde(default)]
    pub eip1559: Option<bool>,
    /// Additional or replacement tokens.
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

/// One `[[networks."eip155:<id>".tokens]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    /// Ticker.
    pub symbol: String,
    /// ERC-20 contract.
    pub erc20_address: Address,
    /// Custody contract, defaults to the network's.
    #[serde(default)]
    pub custody_address: Option<Address>,
    /// Decimals, defaults to the known deployment's or 6.
    #[serde(default)]
    pub decimals: Option<u8>,
}

/// Networks resolved from the configuration.
#[derive(Debug)]
pub struct ResolvedNetworks {
    /// Token and network lookups.
    pub registry: NetworkRegistry,
    /// RPC endpoints for the chain client.
    pub endpoints: Vec<ChainEndpoint>,
}

impl CliConfig {
    /// Loads the configuration from `path`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?
        } else {
            tracing::warn!(path = %path.display(), "configuration file not found, using defaults");
            String::new()
        };
        Self::parse(&content, |name| std::env::var(name).ok())
    }

    /// Parses TOML, expanding variables through `lookup` first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML.
    pub fn parse(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&expand_vars(content, lookup))?)
    }

    /// Price API base URL.
    #[must_use]
    pub fn price_api_url(&self) -> &str {
        self.price_api_url
            .as_deref()
            .filter(|url| !is_unresolved(url))
            .unwrap_or(DEFAULT_PRICE_API_URL)
    }

    /// Price API key, if one resolved.
    #[must_use]
    pub fn price_api_key(&self) -> Option<&str> {
        self.price_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !is_unresolved(key))
    }

    /// Receipt timeout.
    #[must_use]
    pub fn receipt_timeout(&self) -> Duration {
        self.receipt_timeout_secs
            .map_or(papaya_evm::client::DEFAULT_RECEIPT_TIMEOUT, Duration::from_secs)
    }

    /// Builds the network registry and RPC endpoints.
    ///
    /// Networks whose `rpc_url` still holds an unresolved variable are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed identifiers or URLs, tokens
    /// without a custody contract, or tokens with more than 18 decimals.
    pub fn networks(&self) -> Result<ResolvedNetworks, ConfigError> {
        let mut registry = NetworkRegistry::new();
        let mut endpoints = Vec::with_capacity(self.networks.len());

        for (key, entry) in &self.networks {
            let chain_id =
                parse_caip2(key).ok_or_else(|| ConfigError::InvalidNetworkId(key.clone()))?;
            if is_unresolved(&entry.rpc_url) {
                tracing::warn!(network = %key, "Skipping network: rpc_url not resolved (missing env var?)");
                continue;
            }
            let rpc_url = Url::parse(entry.rpc_url.trim()).map_err(|source| {
                ConfigError::InvalidRpcUrl {
                    network: key.clone(),
                    source,
                }
            })?;

            let network = entry.network_config(key, chain_id)?;
            tracing::info!(
                network = %key,
                native = %network.native_token,
                tokens = ?network.tokens.iter().map(|t| t.symbol.as_str()).collect::<Vec<_>>(),
                "Registered network"
            );
            endpoints.push(ChainEndpoint {
                chain_id,
                rpc_url,
                eip1559: network.eip1559,
            });
            registry.register(network)?;
        }

        endpoints.sort_unstable_by_key(|e| e.chain_id);
        Ok(ResolvedNetworks {
            registry,
            endpoints,
        })
    }
}

impl NetworkEntry {
    fn network_config(&self, key: &str, chain_id: ChainId) -> Result<NetworkConfig, ConfigError> {
        let known = known_network(chain_id);
        let mut network = match (known, self.custody_address) {
            (Some(known), Some(custody)) => known.with_custody(custody),
            (Some(known), None) => NetworkConfig {
                tokens: Vec::new(),
                ..known.with_custody(Address::ZERO)
            },
            (None, _) => NetworkConfig {
                chain_id,
                name: key.to_owned(),
                native_token: "ETH".to_owned(),
                price_id: "ethereum".to_owned(),
                eip1559: true,
                tokens: Vec::new(),
            },
        };

        if let Some(name) = &self.name {
            network.name.clone_from(name);
        }
        if let Some(native_token) = &self.native_token {
            network.native_token.clone_from(native_token);
        }
        if let Some(price_id) = &self.price_id {
            network.price_id.clone_from(price_id);
        }
        if let Some(eip1559) = self.eip1559 {
            network.eip1559 = eip1559;
        }

        for token in &self.tokens {
            let custody_address = token
                .custody_address
                .or(self.custody_address)
                .ok_or_else(|| ConfigError::MissingCustody {
                    network: key.to_owned(),
                    symbol: token.symbol.clone(),
                })?;
            let known_decimals = known.and_then(|k| {
                k.tokens
                    .iter()
                    .find(|t| t.symbol.eq_ignore_ascii_case(&token.symbol))
                    .map(|t| t.decimals)
            });
            let config = TokenConfig {
                symbol: token.symbol.clone(),
                erc20_address: token.erc20_address,
                custody_address,
                decimals: token
                    .decimals
                    .or(known_decimals)
                    .unwrap_or(DEFAULT_DECIMALS),
            };
            network
                .tokens
                .retain(|t| !t.symbol.eq_ignore_ascii_case(&config.symbol));
            network.tokens.push(config);
        }

        Ok(network)
    }
}

fn is_unresolved(value: &str) -> bool {
    value.trim_start().starts_with('$')
}

/// Replaces `$VAR` and `${VAR}` with `lookup(VAR)`. Unresolved references
/// are kept verbatim.
fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            braced.find('}').map_or(("", 0), |end| (&braced[..end], end + 2))
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        match Some(name).filter(|n| !n.is_empty()).and_then(&lookup) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[pos..=pos + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use papaya_evm::{POLYGON_MAINNET, USDC_POLYGON};

    use super::*;

    fn vars(name: &str) -> Option<String> {
        match name {
            "RPC" => Some("https://polygon.example".to_owned()),
            "CUSTODY" => Some("0x2222222222222222222222222222222222222222".to_owned()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_vars() {
        assert_eq!(expand_vars("a=$RPC;", vars), "a=https://polygon.example;");
        assert_eq!(expand_vars("${RPC}/v1", vars), "https://polygon.example/v1");
        assert_eq!(expand_vars("$MISSING ${MISSING}", vars), "$MISSING ${MISSING}");
        assert_eq!(expand_vars("cost $ 5 ${}", vars), "cost $ 5 ${}");
        assert_eq!(expand_vars("${RPC", vars), "${RPC");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CliConfig::parse("", vars).unwrap();
        assert!(config.orchestration.batch_deposit_and_subscribe);
        assert_eq!(config.orchestration.safety_buffer_secs, 172_800);
        assert_eq!(config.price_api_url(), DEFAULT_PRICE_API_URL);
        assert_eq!(config.price_api_key(), None);
        assert_eq!(
            config.receipt_timeout(),
            papaya_evm::client::DEFAULT_RECEIPT_TIMEOUT
        );
        assert!(config.networks().unwrap().registry.is_empty());
    }

    #[test]
    fn test_known_network_with_custody() {
        let config = CliConfig::parse(
            r#"
            receipt_timeout_secs = 30
            price_api_key = "$CG_KEY"

            [orchestration]
            batch_deposit_and_subscribe = false

            [networks."eip155:137"]
            rpc_url = "$RPC"
            custody_address = "${CUSTODY}"
            "#,
            vars,
        )
        .unwrap();
        assert!(!config.orchestration.batch_deposit_and_subscribe);
        assert_eq!(config.receipt_timeout(), Duration::from_secs(30));
        assert_eq!(config.price_api_key(), None);

        let resolved = config.networks().unwrap();
        assert_eq!(resolved.endpoints.len(), 1);
        assert_eq!(
            resolved.endpoints[0].rpc_url.as_str(),
            "https://polygon.example/"
        );
        let (network, usdc) = resolved
            .registry
            .resolve_token(POLYGON_MAINNET, "USDC")
            .unwrap();
        assert_eq!(network.native_token, "POL");
        assert_eq!(usdc.erc20_address, USDC_POLYGON);
        assert_eq!(usdc.custody_address, Address::repeat_byte(0x22));
    }

    #[test]
    fn test_custom_network_tokens() {
        let config = CliConfig::parse(
            r#"
            [networks."eip155:31337"]
            rpc_url = "http://127.0.0.1:8545"
            name = "Anvil"

            [[networks."eip155:31337".tokens]]
            symbol = "USDC"
            erc20_address = "0x1111111111111111111111111111111111111111"
            custody_address = "0x2222222222222222222222222222222222222222"
            "#,
            vars,
        )
        .unwrap();
        let resolved = config.networks().unwrap();
        let network = resolved.registry.network(31337).unwrap();
        assert_eq!(network.name, "Anvil");
        assert_eq!(network.native_token, "ETH");
        assert_eq!(network.tokens.len(), 1);
        assert_eq!(network.tokens[0].decimals, 6);
    }

    #[test]
    fn test_token_without_custody_is_rejected() {
        let config = CliConfig::parse(
            r#"
            [networks."eip155:137"]
            rpc_url = "https://polygon.example"

            [[networks."eip155:137".tokens]]
            symbol = "DAI"
            erc20_address = "0x1111111111111111111111111111111111111111"
            "#,
            vars,
        )
        .unwrap();
        assert!(matches!(
            config.networks(),
            Err(ConfigError::MissingCustody { symbol, .. }) if symbol == "DAI"
        ));
    }

    #[test]
    fn test_unresolved_rpc_url_skips_network() {
        let config = CliConfig::parse(
            r#"
            [networks."eip155:1"]
            rpc_url = "$MAINNET_RPC"
            "#,
            vars,
        )
        .unwrap();
        let resolved = config.networks().unwrap();
        assert!(resolved.endpoints.is_empty());
        assert!(resolved.registry.network(1).is_none());
    }

    #[test]
    fn test_invalid_network_id() {
        let config = CliConfig::parse(
            r#"
            [networks."polygon"]
            rpc_url = "https://polygon.example"
            "#,
            vars,
        )
        .unwrap();
        assert!(matches!(
            config.networks(),
            Err(ConfigError::InvalidNetworkId(id)) if id == "polygon"
        ));
    }
}
