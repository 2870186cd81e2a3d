//! ABI encoding of papaya calls.
//!
//! Maps the chain-agnostic [`ContractCall`] and [`ReadCall`] values onto the
//! Solidity bindings in [`crate::contract`].

use alloy_primitives::aliases::U96;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use papaya::chain::{ContractCall, ReadCall};

use crate::contract::{IERC20, IPapaya};
use crate::error::Eip155ClientError;

/// Target and calldata of a read.
#[must_use]
pub fn encode_read(call: &ReadCall) -> (Address, Bytes) {
    match *call {
        ReadCall::CustodyBalance { custody, account } => (
            custody,
            IPapaya::balanceOfCall { account }.abi_encode().into(),
        ),
        ReadCall::Allowance {
            token,
            owner,
            spender,
        } => (
            token,
            IERC20::allowanceCall { owner, spender }.abi_encode().into(),
        ),
        ReadCall::TokenBalance { token, account } => (
            token,
            IERC20::balanceOfCall { account }.abi_encode().into(),
        ),
    }
}

/// Decodes a `uint256` return word. Empty output means no data.
#[must_use]
pub fn decode_word(output: &[u8]) -> Option<U256> {
    (output.len() >= 32).then(|| U256::from_be_slice(&output[..32]))
}

/// Encodes a state-changing call.
///
/// # Errors
///
/// Returns [`Eip155ClientError::Encoding`] if the subscription rate does not
/// fit the contract's `uint96`.
pub fn encode_call(call: &ContractCall) -> Result<Bytes, Eip155ClientError> {
    let calldata = match *call {
        ContractCall::Approve {
            spender, amount, ..
        } => IERC20::approveCall { spender, amount }.abi_encode(),
        ContractCall::Deposit { amount, .. } => deposit(amount),
        ContractCall::Subscribe {
            author,
            rate,
            project_id,
            ..
        } => subscribe(author, rate, project_id)?,
        ContractCall::DepositAndSubscribe {
            amount,
            author,
            rate,
            project_id,
            ..
        } => IPapaya::multicallCall {
            data: vec![
                deposit(amount).into(),
                subscribe(author, rate, project_id)?.into(),
            ],
        }
        .abi_encode(),
    };
    Ok(calldata.into())
}

fn deposit(amount: U256) -> Vec<u8> {
    IPapaya::depositCall {
        amount,
        isPermit2: false,
    }
    .abi_encode()
}

fn subscribe(author: Address, rate: U256, project_id: U256) -> Result<Vec<u8>, Eip155ClientError> {
    if rate.bit_len() > 96 {
        return Err(Eip155ClientError::Encoding(format!(
            "rate {rate} overflows uint96"
        )));
    }
    let limbs = rate.as_limbs();
    Ok(IPapaya::subscribeCall {
        author,
        subscriptionRate: U96::from_limbs([limbs[0], limbs[1]]),
        projectId: project_id,
    }
    .abi_encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_targets() {
        let custody = Address::repeat_byte(0x22);
        let token = Address::repeat_byte(0x11);
        let account = Address::repeat_byte(0x44);

        let (to, data) = encode_read(&ReadCall::CustodyBalance { custody, account });
        assert_eq!(to, custody);
        assert_eq!(&data[..4], IPapaya::balanceOfCall::SELECTOR.as_slice());

        let (to, data) = encode_read(&ReadCall::Allowance {
            token,
            owner: account,
            spender: custody,
        });
        assert_eq!(to, token);
        assert_eq!(&data[..4], IERC20::allowanceCall::SELECTOR.as_slice());
        assert_eq!(data.len(), 4 + 64);
    }

    #[test]
    fn test_decode_word() {
        let mut word = [0u8; 32];
        word[31] = 7;
        assert_eq!(decode_word(&word), Some(U256::from(7u8)));
        assert_eq!(decode_word(&[]), None);
        assert_eq!(decode_word(&[1, 2, 3]), None);
    }

    #[test]
    fn test_deposit_is_never_permit2() {
        let data = encode_call(&ContractCall::Deposit {
            custody: Address::ZERO,
            amount: U256::from(10_666_667u64),
        })
        .unwrap();
        let decoded = IPapaya::depositCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.amount, U256::from(10_666_667u64));
        assert!(!decoded.isPermit2);
    }

    #[test]
    fn test_subscribe_rate_bounds() {
        let call = |rate| ContractCall::Subscribe {
            custody: Address::ZERO,
            author: Address::repeat_byte(0x33),
            rate,
            project_id: U256::from(9u8),
        };
        let data = encode_call(&call(U256::from(3_858_024_691_358u64))).unwrap();
        let decoded = IPapaya::subscribeCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.subscriptionRate, U96::from(3_858_024_691_358u64));
        assert_eq!(decoded.projectId, U256::from(9u8));

        let too_big = U256::from(1u8) << 96;
        assert!(matches!(
            encode_call(&call(too_big)),
            Err(Eip155ClientError::Encoding(_))
        ));
    }

    #[test]
    fn test_batched_call_wraps_deposit_then_subscribe() {
        let data = encode_call(&ContractCall::DepositAndSubscribe {
            custody: Address::ZERO,
            amount: U256::from(5u8),
            author: Address::repeat_byte(0x33),
            rate: U256::from(2u8),
            project_id: U256::ZERO,
        })
        .unwrap();
        let multicall = IPapaya::multicallCall::abi_decode(&data).unwrap();
        assert_eq!(multicall.data.len(), 2);
        assert_eq!(&multicall.data[0][..4], IPapaya::depositCall::SELECTOR.as_slice());
        assert_eq!(&multicall.data[1][..4], IPapaya::subscribeCall::SELECTOR.as_slice());
    }
}
