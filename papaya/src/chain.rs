//! Chain identifiers, contract calls and the chain client abstraction.
//!
//! The core never talks to an RPC node directly. Everything it needs from a
//! chain (balance reads, gas figures, simulation, submission and receipts)
//! goes through [`ChainClient`], implemented per chain family in separate
//! crates.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

/// An EIP-155 chain ID (e.g., 137 for Polygon, 8453 for Base).
pub type ChainId = u64;

/// Formats a chain ID as a CAIP-2 identifier.
///
/// Example: `caip2(137)` returns `"eip155:137"`.
#[must_use]
pub fn caip2(chain_id: ChainId) -> String {
    format!("eip155:{chain_id}")
}

/// Parses a CAIP-2 identifier into an EIP-155 chain ID.
///
/// Returns `None` if the input is not a valid `eip155:` prefixed string.
#[must_use]
pub fn parse_caip2(caip: &str) -> Option<ChainId> {
    caip.strip_prefix("eip155:").and_then(|s| s.parse().ok())
}

/// A read-only contract query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCall {
    /// `custody.balanceOf(account)`, 18-decimal.
    CustodyBalance {
        /// Custody contract.
        custody: Address,
        /// Account whose deposit is queried.
        account: Address,
    },
    /// `token.allowance(owner, spender)`, token decimals.
    Allowance {
        /// ERC-20 token contract.
        token: Address,
        /// Token holder.
        owner: Address,
        /// Approved spender, the custody contract.
        spender: Address,
    },
    /// `token.balanceOf(account)`, token decimals.
    TokenBalance {
        /// ERC-20 token contract.
        token: Address,
        /// Token holder.
        account: Address,
    },
}

/// A state-changing contract call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractCall {
    /// `token.approve(spender, amount)`.
    Approve {
        /// ERC-20 token contract.
        token: Address,
        /// Custody contract allowed to pull tokens.
        spender: Address,
        /// Allowance in token decimals.
        amount: U256,
    },
    /// `custody.deposit(amount, false)`.
    Deposit {
        /// Custody contract.
        custody: Address,
        /// Amount in token decimals.
        amount: U256,
    },
    /// `custody.subscribe(author, rate, projectId)`.
    Subscribe {
        /// Custody contract.
        custody: Address,
        /// Payee receiving the stream.
        author: Address,
        /// Per-second rate, 18-decimal.
        rate: U256,
        /// Project identifier forwarded to the contract.
        project_id: U256,
    },
    /// `custody.multicall([deposit(..), subscribe(..)])`, all-or-nothing.
    DepositAndSubscribe {
        /// Custody contract.
        custody: Address,
        /// Deposit amount in token decimals.
        amount: U256,
        /// Payee receiving the stream.
        author: Address,
        /// Per-second rate, 18-decimal.
        rate: U256,
        /// Project identifier forwarded to the contract.
        project_id: U256,
    },
}

impl ContractCall {
    /// Contract the call is sent to.
    #[must_use]
    pub const fn target(&self) -> Address {
        match self {
            Self::Approve { token, .. } => *token,
            Self::Deposit { custody, .. }
            | Self::Subscribe { custody, .. }
            | Self::DepositAndSubscribe { custody, .. } => *custody,
        }
    }

    /// Solidity function name, used for logging.
    #[must_use]
    pub const fn function_name(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Deposit { .. } => "deposit",
            Self::Subscribe { .. } => "subscribe",
            Self::DepositAndSubscribe { .. } => "multicall",
        }
    }
}

/// A submitted transaction awaiting inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHandle {
    /// Chain the transaction was sent to.
    pub chain_id: ChainId,
    /// Transaction hash.
    pub hash: TxHash,
}

/// Final status of an included transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Receipt status is success.
    Success,
    /// Included but reverted.
    Reverted,
}

/// Errors surfaced by a [`ChainClient`].
///
/// The display strings feed the user-facing message translation in
/// [`crate::error`], so they keep the wording RPC nodes and wallets use.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The signer declined to sign or send.
    #[error("User rejected the request")]
    UserRejected,
    /// Simulation or execution reverted.
    #[error("execution reverted: {0}")]
    Reverted(String),
    /// RPC transport, node or wallet failure.
    #[error("{0}")]
    Transport(String),
    /// No client is configured for the chain.
    #[error("chain mismatch: no client configured for chain {0}")]
    UnsupportedChain(ChainId),
    /// Arguments could not be encoded for the contract ABI.
    #[error("unsupported ABI arguments: {0}")]
    Encoding(String),
}

impl ChainError {
    /// Whether the error is a signer rejection rather than a failure.
    #[must_use]
    pub const fn is_user_rejection(&self) -> bool {
        matches!(self, Self::UserRejected)
    }
}

/// Access to one chain family's nodes and signer.
///
/// Implementations are shared across tasks, so every method takes `&self`
/// and returns a `Send` future.
pub trait ChainClient: Send + Sync {
    /// Executes a read-only query. `Ok(None)` means the node returned no data.
    fn read(
        &self,
        chain_id: ChainId,
        call: ReadCall,
    ) -> impl Future<Output = Result<Option<U256>, ChainError>> + Send;

    /// Estimates gas units for `call` sent from `from`.
    fn estimate_gas(
        &self,
        chain_id: ChainId,
        from: Address,
        call: ContractCall,
    ) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Suggested gas price in wei.
    fn gas_price(&self, chain_id: ChainId) -> impl Future<Output = Result<u128, ChainError>> + Send;

    /// Dry-runs `call` against the latest state.
    fn simulate(
        &self,
        chain_id: ChainId,
        from: Address,
        call: ContractCall,
    ) -> impl Future<Output = Result<(), ChainError>> + Send;

    /// Signs and broadcasts `call`.
    fn submit(
        &self,
        chain_id: ChainId,
        from: Address,
        call: ContractCall,
    ) -> impl Future<Output = Result<TxHandle, ChainError>> + Send;

    /// Waits until `handle` is included and reports its status.
    fn await_confirmation(
        &self,
        handle: TxHandle,
    ) -> impl Future<Output = Result<Confirmation, ChainError>> + Send;
}

impl<T: ChainClient> ChainClient for Arc<T> {
    fn read(
        &self,
        chain_id: ChainId,
        call: ReadCall,
    ) -> impl Future<Output = Result<Option<U256>, ChainError>> + Send {
        (**self).read(chain_id, call)
    }

    fn estimate_gas(
        &self,
        chain_id: ChainId,
        from: Address,
        call: ContractCall,
    ) -> impl Future<Output = Result<u64, ChainError>> + Send {
        (**self).estimate_gas(chain_id, from, call)
    }

    fn gas_price(&self, chain_id: ChainId) -> impl Future<Output = Result<u128, ChainError>> + Send {
        (**self).gas_price(chain_id)
    }

    fn simulate(
        &self,
        chain_id: ChainId,
        from: Address,
        call: ContractCall,
    ) -> impl Future<Output = Result<(), ChainError>> + Send {
        (**self).simulate(chain_id, from, call)
    }

    fn submit(
        &self,
        chain_id: ChainId,
        from: Address,
        call: ContractCall,
    ) -> impl Future<Output = Result<TxHandle, ChainError>> + Send {
        (**self).submit(chain_id, from, call)
    }

    fn await_confirmation(
        &self,
        handle: TxHandle,
    ) -> impl Future<Output = Result<Confirmation, ChainError>> + Send {
        (**self).await_confirmation(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caip2_roundtrip() {
        assert_eq!(caip2(137), "eip155:137");
        assert_eq!(parse_caip2("eip155:8453"), Some(8453));
        assert_eq!(parse_caip2("solana:mainnet"), None);
        assert_eq!(parse_caip2("eip155:"), None);
    }

    #[test]
    fn test_call_target() {
        let token = Address::repeat_byte(0x11);
        let custody = Address::repeat_byte(0x22);
        let approve = ContractCall::Approve {
            token,
            spender: custody,
            amount: U256::from(1u8),
        };
        assert_eq!(approve.target(), token);
        assert_eq!(approve.function_name(), "approve");

        let batched = ContractCall::DepositAndSubscribe {
            custody,
            amount: U256::from(1u8),
            author: Address::repeat_byte(0x33),
            rate: U256::from(1u8),
            project_id: U256::ZERO,
        };
        assert_eq!(batched.target(), custody);
        assert_eq!(batched.function_name(), "multicall");
    }

    #[test]
    fn test_error_display_keeps_node_wording() {
        assert_eq!(ChainError::UserRejected.to_string(), "User rejected the request");
        assert!(
            ChainError::Reverted("ERC20: transfer amount exceeds balance".into())
                .to_string()
                .starts_with("execution reverted")
        );
        assert!(ChainError::UnsupportedChain(5).to_string().contains("chain mismatch"));
    }
}
