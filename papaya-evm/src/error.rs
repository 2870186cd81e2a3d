//! Error types for the EIP-155 chain client.

use alloy_provider::PendingTransactionError;
use alloy_transport::TransportError;
use papaya::chain::{ChainError, ChainId};

/// JSON-RPC error code wallets use for a rejected request (EIP-1193).
pub const USER_REJECTED_CODE: i64 = 4001;

/// Errors raised by [`crate::Eip155ChainClient`].
#[derive(Debug, thiserror::Error)]
pub enum Eip155ClientError {
    /// RPC transport error, including JSON-RPC error responses.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Waiting for the receipt failed.
    #[error(transparent)]
    PendingTransaction(#[from] PendingTransactionError),
    /// No provider is configured for the chain.
    #[error("chain mismatch: no provider configured for chain {0}")]
    UnknownChain(ChainId),
    /// Arguments do not fit the contract ABI.
    #[error("unsupported ABI arguments: {0}")]
    Encoding(String),
}

impl From<Eip155ClientError> for ChainError {
    fn from(value: Eip155ClientError) -> Self {
        match value {
            Eip155ClientError::Transport(e) => classify_transport(&e),
            Eip155ClientError::PendingTransaction(PendingTransactionError::TxWatcher(e)) => {
                Self::Transport(format!("timeout waiting for receipt: {e}"))
            }
            Eip155ClientError::PendingTransaction(e) => Self::Transport(e.to_string()),
            Eip155ClientError::UnknownChain(chain_id) => Self::UnsupportedChain(chain_id),
            Eip155ClientError::Encoding(reason) => Self::Encoding(reason),
        }
    }
}

/// Splits transport failures into user rejections, reverts and the rest.
fn classify_transport(e: &TransportError) -> ChainError {
    if let Some(payload) = e.as_error_resp() {
        if payload.code == USER_REJECTED_CODE || payload.message.contains("User rejected") {
            return ChainError::UserRejected;
        }
        if let Some(reason) = payload.message.strip_prefix("execution reverted") {
            return ChainError::Reverted(reason.trim_start_matches(':').trim().to_owned());
        }
    }
    let message = e.to_string();
    if message.contains("User rejected the request") {
        ChainError::UserRejected
    } else {
        ChainError::Transport(message)
    }
}

#[cfg(test)]
mod tests {
    use alloy_transport::TransportErrorKind;

    use super::*;

    #[test]
    fn test_rejection_text_is_user_rejection() {
        let e = TransportErrorKind::custom_str("MetaMask Tx Signature: User rejected the request.");
        assert_eq!(
            ChainError::from(Eip155ClientError::from(e)),
            ChainError::UserRejected
        );
    }

    #[test]
    fn test_other_transport_errors_keep_message() {
        let e = TransportErrorKind::custom_str("insufficient funds for gas * price + value");
        let ChainError::Transport(message) = ChainError::from(Eip155ClientError::from(e)) else {
            panic!("expected transport error");
        };
        assert!(message.contains("insufficient funds"));
    }

    #[test]
    fn test_unknown_chain_maps_to_unsupported() {
        assert_eq!(
            ChainError::from(Eip155ClientError::UnknownChain(10)),
            ChainError::UnsupportedChain(10)
        );
        assert_eq!(
            ChainError::from(Eip155ClientError::Encoding("x".into())),
            ChainError::Encoding("x".into())
        );
    }
}
