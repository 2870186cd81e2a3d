//! Error classification and user-facing messages.
//!
//! Raw node and wallet errors are never shown to the payer. They are mapped
//! onto a fixed set of readable messages by substring, falling back to
//! [`GENERIC_FAILURE`].

use crate::chain::ChainError;

/// Shown when no known pattern matches.
pub const GENERIC_FAILURE: &str =
    "An error occurred during the transaction. Please check the details and try again.";

/// Substring to readable message, checked in order.
const TRANSLATIONS: &[(&str, &str)] = &[
    (
        "User rejected the request",
        "The transaction was rejected by the user.",
    ),
    (
        "insufficient funds",
        "The account has insufficient funds to complete this transaction.",
    ),
    (
        "gas required exceeds allowance",
        "The transaction requires more gas than allowed.",
    ),
    (
        "execution reverted",
        "The transaction was reverted by the contract. Check the input or contract state.",
    ),
    (
        "network error",
        "A network error occurred. Please check your internet connection.",
    ),
    (
        "chain mismatch",
        "You are connected to the wrong network. Please switch to the correct chain.",
    ),
    (
        "invalid address",
        "An invalid address was provided. Please check the input.",
    ),
    ("unsupported ABI", "The provided ABI is not supported."),
    (
        "provider error",
        "An error occurred with the wallet provider. Please try again.",
    ),
    (
        "contract not deployed",
        "The contract is not deployed on the selected network.",
    ),
    (
        "max nonce",
        "The nonce for the transaction exceeds the allowed limit.",
    ),
    (
        "invalid signature",
        "The transaction signature is invalid. Please try signing again.",
    ),
    (
        "timeout",
        "The transaction request timed out. Please try again.",
    ),
    (
        "failed to fetch",
        "Failed to connect to the blockchain. Please check your network and try again.",
    ),
    (
        "call exception",
        "A call exception occurred. The contract may not support the called function.",
    ),
    (
        "unknown error",
        "An unknown error occurred. Please try again later.",
    ),
];

/// Maps a raw error message to a readable one.
#[must_use]
pub fn translate(raw: &str) -> &'static str {
    TRANSLATIONS
        .iter()
        .find(|(needle, _)| raw.contains(*needle))
        .map_or(GENERIC_FAILURE, |(_, message)| *message)
}

/// How an error is handled by the orchestration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The signer declined; reset silently.
    UserRejection,
    /// Unsupported network or token, or malformed terms; blocks the session.
    Configuration,
    /// Node or transport failure; reads degrade to zero, writes surface a
    /// dismissible error.
    TransientChain,
    /// The contract reverted.
    RevertedExecution,
}

impl ChainError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UserRejected => ErrorKind::UserRejection,
            Self::Reverted(_) => ErrorKind::RevertedExecution,
            Self::Transport(_) => ErrorKind::TransientChain,
            Self::UnsupportedChain(_) | Self::Encoding(_) => ErrorKind::Configuration,
        }
    }

    /// Readable message for the payer.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        translate(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_known_patterns() {
        assert_eq!(
            translate("err: insufficient funds for gas * price + value"),
            "The account has insufficient funds to complete this transaction."
        );
        assert_eq!(
            translate("execution reverted: ERC20: transfer amount exceeds balance"),
            "The transaction was reverted by the contract. Check the input or contract state."
        );
        assert_eq!(
            translate("request timeout after 30s"),
            "The transaction request timed out. Please try again."
        );
    }

    #[test]
    fn test_translate_first_match_wins() {
        assert_eq!(
            translate("execution reverted after network error"),
            "The transaction was reverted by the contract. Check the input or contract state."
        );
    }

    #[test]
    fn test_translate_is_case_sensitive_and_falls_back() {
        assert_eq!(translate("Execution Reverted"), GENERIC_FAILURE);
        assert_eq!(translate("0xdeadbeef"), GENERIC_FAILURE);
        assert_eq!(translate(""), GENERIC_FAILURE);
    }

    #[test]
    fn test_chain_error_messages() {
        assert_eq!(
            ChainError::Reverted(String::new()).user_message(),
            "The transaction was reverted by the contract. Check the input or contract state."
        );
        assert_eq!(
            ChainError::UnsupportedChain(5).user_message(),
            "You are connected to the wrong network. Please switch to the correct chain."
        );
        assert_eq!(
            ChainError::Encoding("rate overflows uint96".into()).user_message(),
            "The provided ABI is not supported."
        );
        assert_eq!(
            ChainError::Transport("connection refused".into()).user_message(),
            GENERIC_FAILURE
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(ChainError::UserRejected.kind(), ErrorKind::UserRejection);
        assert_eq!(
            ChainError::Transport("x".into()).kind(),
            ErrorKind::TransientChain
        );
        assert_eq!(
            ChainError::Reverted("x".into()).kind(),
            ErrorKind::RevertedExecution
        );
        assert_eq!(ChainError::UnsupportedChain(1).kind(), ErrorKind::Configuration);
    }
}
