//! EIP-155 chain client.
//!
//! [`Eip155ChainClient`] keeps one alloy HTTP provider per configured chain.
//! Signing clients give every provider the same wallet, so the payer's key
//! signs on any chain the checkout switches to.

use std::collections::HashMap;
use std::time::Duration;

use alloy_network::{
    Ethereum, EthereumWallet, NetworkWallet, ReceiptResponse, TransactionBuilder,
};
use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionRequest;
use papaya::chain::{ChainClient, ChainError, ChainId, Confirmation, ContractCall, ReadCall, TxHandle};
use url::Url;

use crate::calls::{decode_word, encode_call, encode_read};
use crate::error::Eip155ClientError;

/// Awaits a future, optionally instrumenting it with a tracing span.
macro_rules! traced {
    ($fut:expr, $span:expr) => {{
        #[cfg(feature = "telemetry")]
        {
            use tracing::Instrument;
            $fut.instrument($span).await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            $fut.await
        }
    }};
}

/// How long to wait for a receipt by default.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// RPC endpoint for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoint {
    /// EIP-155 chain ID.
    pub chain_id: ChainId,
    /// HTTP JSON-RPC URL.
    pub rpc_url: Url,
    /// Whether the chain supports EIP-1559 gas pricing.
    pub eip1559: bool,
}

struct ChainProvider {
    provider: DynProvider,
    eip1559: bool,
}

/// [`ChainClient`] backed by alloy HTTP providers.
pub struct Eip155ChainClient {
    chains: HashMap<ChainId, ChainProvider>,
    signer: Option<Address>,
    receipt_timeout: Duration,
}

impl std::fmt::Debug for Eip155ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut chain_ids: Vec<_> = self.chains.keys().copied().collect();
        chain_ids.sort_unstable();
        f.debug_struct("Eip155ChainClient")
            .field("signer", &self.signer)
            .field("chain_ids", &chain_ids)
            .field("receipt_timeout", &self.receipt_timeout)
            .finish_non_exhaustive()
    }
}

impl Eip155ChainClient {
    /// Connects a provider for every endpoint, all signing with `wallet`.
    #[must_use]
    pub fn new(
        wallet: &EthereumWallet,
        endpoints: impl IntoIterator<Item = ChainEndpoint>,
        receipt_timeout: Duration,
    ) -> Self {
        let signer = NetworkWallet::<Ethereum>::default_signer_address(wallet);
        Self::connect(endpoints, Some(signer), receipt_timeout, |url| {
            ProviderBuilder::new()
                .wallet(wallet.clone())
                .connect_http(url)
                .erased()
        })
    }

    /// Connects providers without a wallet. Reads, gas figures and
    /// simulation work; submissions are left to the node and fail unless it
    /// manages the sender's key.
    #[must_use]
    pub fn read_only(
        endpoints: impl IntoIterator<Item = ChainEndpoint>,
        receipt_timeout: Duration,
    ) -> Self {
        Self::connect(endpoints, None, receipt_timeout, |url| {
            ProviderBuilder::new().connect_http(url).erased()
        })
    }

    fn connect(
        endpoints: impl IntoIterator<Item = ChainEndpoint>,
        signer: Option<Address>,
        receipt_timeout: Duration,
        connect: impl Fn(Url) -> DynProvider,
    ) -> Self {
        let chains = endpoints
            .into_iter()
            .map(|endpoint| {
                #[cfg(feature = "telemetry")]
                tracing::debug!(chain_id = endpoint.chain_id, eip1559 = endpoint.eip1559, "connecting provider");
                let provider = connect(endpoint.rpc_url);
                (
                    endpoint.chain_id,
                    ChainProvider {
                        provider,
                        eip1559: endpoint.eip1559,
                    },
                )
            })
            .collect();
        Self {
            chains,
            signer,
            receipt_timeout,
        }
    }

    /// Address of the wallet's default signer, `None` for a read-only client.
    #[must_use]
    pub const fn signer_address(&self) -> Option<Address> {
        self.signer
    }

    /// Whether a provider is configured for `chain_id`.
    #[must_use]
    pub fn supports(&self, chain_id: ChainId) -> bool {
        self.chains.contains_key(&chain_id)
    }

    fn chain(&self, chain_id: ChainId) -> Result<&ChainProvider, Eip155ClientError> {
        self.chains
            .get(&chain_id)
            .ok_or(Eip155ClientError::UnknownChain(chain_id))
    }

    fn transaction(from: Address, call: &ContractCall) -> Result<TransactionRequest, Eip155ClientError> {
        Ok(TransactionRequest::default()
            .from(from)
            .to(call.target())
            .input(encode_call(call)?.into()))
    }
}

impl ChainClient for Eip155ChainClient {
    async fn read(&self, chain_id: ChainId, call: ReadCall) -> Result<Option<U256>, ChainError> {
        let chain = self.chain(chain_id)?;
        let (to, data) = encode_read(&call);
        let tx = TransactionRequest::default().to(to).input(data.into());
        let output: Bytes = traced!(
            chain.provider.call(tx).into_future(),
            tracing::debug_span!("papaya.evm.read", chain_id, ?call)
        )
        .map_err(Eip155ClientError::from)?;
        Ok(decode_word(&output))
    }

    async fn estimate_gas(
        &self,
        chain_id: ChainId,
        from: Address,
        call: ContractCall,
    ) -> Result<u64, ChainError> {
        let chain = self.chain(chain_id)?;
        let tx = Self::transaction(from, &call)?;
        let gas = traced!(
            chain.provider.estimate_gas(tx).into_future(),
            tracing::debug_span!("papaya.evm.estimate_gas", chain_id, function = call.function_name())
        )
        .map_err(Eip155ClientError::from)?;
        Ok(gas)
    }

    async fn gas_price(&self, chain_id: ChainId) -> Result<u128, ChainError> {
        let chain = self.chain(chain_id)?;
        let price = chain
            .provider
            .get_gas_price()
            .await
            .map_err(Eip155ClientError::from)?;
        Ok(price)
    }

    async fn simulate(
        &self,
        chain_id: ChainId,
        from: Address,
        call: ContractCall,
    ) -> Result<(), ChainError> {
        let chain = self.chain(chain_id)?;
        let tx = Self::transaction(from, &call)?;
        traced!(
            chain.provider.call(tx).into_future(),
            tracing::info_span!("papaya.evm.simulate", chain_id, function = call.function_name())
        )
        .map_err(Eip155ClientError::from)?;
        Ok(())
    }

    async fn submit(
        &self,
        chain_id: ChainId,
        from: Address,
        call: ContractCall,
    ) -> Result<TxHandle, ChainError> {
        let chain = self.chain(chain_id)?;
        let mut tx = Self::transaction(from, &call)?;

        // Legacy gas pricing for non-EIP-1559 chains
        if !chain.eip1559 {
            let price = chain
                .provider
                .get_gas_price()
                .await
                .map_err(Eip155ClientError::from)?;
            tx.set_gas_price(price);
        }

        let pending = traced!(
            chain.provider.send_transaction(tx),
            tracing::info_span!("papaya.evm.submit", chain_id, function = call.function_name())
        )
        .map_err(Eip155ClientError::from)?;
        Ok(TxHandle {
            chain_id,
            hash: *pending.tx_hash(),
        })
    }

    async fn await_confirmation(&self, handle: TxHandle) -> Result<Confirmation, ChainError> {
        let chain = self.chain(handle.chain_id)?;
        let watcher = PendingTransactionBuilder::new(chain.provider.root().clone(), handle.hash)
            .with_timeout(Some(self.receipt_timeout));
        let receipt = traced!(
            watcher.get_receipt(),
            tracing::info_span!("papaya.evm.await_confirmation", chain_id = handle.chain_id, tx = %handle.hash)
        )
        .map_err(Eip155ClientError::from)?;
        Ok(if receipt.status() {
            Confirmation::Success
        } else {
            Confirmation::Reverted
        })
    }
}
