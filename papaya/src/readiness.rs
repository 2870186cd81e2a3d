//! Readiness evaluation over on-chain balances.
//!
//! [`ReadinessEvaluator::evaluate`] is a pure function of the registry, the
//! subscription terms and an [`OnChainSnapshot`]. It decides whether the
//! payer must approve, deposit, or can subscribe right away.

use alloy_primitives::{Address, U256};
use serde::Serialize;

use crate::amount::{AmountError, CUSTODY_DECIMALS, rescale_ceil, rescale_floor};
use crate::chain::{ChainClient, ChainId, ReadCall};
use crate::cycle::subscription_rate;
use crate::lifecycle::Step;
use crate::networks::{NetworkRegistry, RegistryError, TokenConfig};
use crate::terms::SubscriptionTerms;

/// Default safety buffer: two days of the subscription rate.
pub const DEFAULT_SAFETY_BUFFER_SECS: u64 = 172_800;

/// Balances the readiness decision is based on.
///
/// Always fetched fresh; never reused across account or network changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainSnapshot {
    /// Deposit already held by the custody contract, 18-decimal.
    pub custody_balance: U256,
    /// Allowance granted to the custody contract, token decimals.
    pub allowance: U256,
    /// Wallet token balance, token decimals.
    pub token_balance: U256,
}

impl OnChainSnapshot {
    /// Builds a snapshot from raw reads, treating missing values as zero.
    #[must_use]
    pub fn from_reads(
        custody_balance: Option<U256>,
        allowance: Option<U256>,
        token_balance: Option<U256>,
    ) -> Self {
        Self {
            custody_balance: custody_balance.unwrap_or_default(),
            allowance: allowance.unwrap_or_default(),
            token_balance: token_balance.unwrap_or_default(),
        }
    }

    /// Reads the three balances concurrently.
    ///
    /// A failed read degrades to zero; readiness never blocks on read errors.
    pub async fn fetch<C: ChainClient>(
        client: &C,
        chain_id: ChainId,
        token: &TokenConfig,
        account: Address,
    ) -> Self {
        let (custody, allowance, balance) = futures_util::future::join3(
            client.read(
                chain_id,
                ReadCall::CustodyBalance {
                    custody: token.custody_address,
                    account,
                },
            ),
            client.read(
                chain_id,
                ReadCall::Allowance {
                    token: token.erc20_address,
                    owner: account,
                    spender: token.custody_address,
                },
            ),
            client.read(
                chain_id,
                ReadCall::TokenBalance {
                    token: token.erc20_address,
                    account,
                },
            ),
        )
        .await;
        Self::from_reads(degrade(custody), degrade(allowance), degrade(balance))
    }
}

fn degrade(result: Result<Option<U256>, crate::chain::ChainError>) -> Option<U256> {
    match result {
        Ok(value) => value,
        Err(_e) => {
            #[cfg(feature = "telemetry")]
            tracing::warn!(error = %_e, "balance read failed, treating as zero");
            None
        }
    }
}

/// Outcome of a readiness evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessVerdict {
    /// Chain the verdict was computed for.
    pub chain_id: ChainId,
    /// Payer the verdict was computed for.
    pub account: Address,
    /// An ERC-20 approval must precede the deposit.
    pub needs_approval: bool,
    /// The custody balance does not cover cost plus buffer.
    pub needs_deposit: bool,
    /// Amount still to deposit, token decimals.
    pub deposit_shortfall: U256,
    /// The subscription can be created once any deposit lands.
    pub can_subscribe: bool,
    /// The chain is not in the registry.
    pub is_unsupported_network: bool,
    /// The token is not accepted on the chain.
    pub is_unsupported_token: bool,
    /// Per-second rate, 18-decimal.
    pub subscription_rate: U256,
    /// Cost plus buffer, token decimals, rounded up.
    pub required_deposit: U256,
}

impl ReadinessVerdict {
    /// A verdict for a network or token the registry does not support.
    ///
    /// Every action flag is false.
    #[must_use]
    pub const fn unsupported(
        chain_id: ChainId,
        account: Address,
        is_unsupported_network: bool,
        is_unsupported_token: bool,
    ) -> Self {
        Self {
            chain_id,
            account,
            needs_approval: false,
            needs_deposit: false,
            deposit_shortfall: U256::ZERO,
            can_subscribe: false,
            is_unsupported_network,
            is_unsupported_token,
            subscription_rate: U256::ZERO,
            required_deposit: U256::ZERO,
        }
    }

    /// Whether the network or token is unsupported.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        self.is_unsupported_network || self.is_unsupported_token
    }

    /// The single step the payer should take next, if any.
    ///
    /// With `batch` set, a needed deposit is combined with the subscription
    /// in one transaction.
    #[must_use]
    pub const fn next_step(&self, batch: bool) -> Option<Step> {
        if self.is_unsupported() {
            None
        } else if self.needs_approval {
            Some(Step::Approve)
        } else if self.needs_deposit && self.can_subscribe {
            if batch {
                Some(Step::DepositAndSubscribe)
            } else {
                Some(Step::Deposit)
            }
        } else if self.can_subscribe {
            Some(Step::Subscribe)
        } else {
            None
        }
    }

    /// Supported, but the wallet cannot cover the deposit.
    #[must_use]
    pub const fn insufficient_balance(&self) -> bool {
        !self.is_unsupported() && self.next_step(false).is_none()
    }
}

/// Errors raised while evaluating readiness.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadinessError {
    /// The subscription cost is malformed or not positive.
    #[error("Invalid subscription terms: {0}")]
    InvalidTerms(#[from] AmountError),
}

/// Computes [`ReadinessVerdict`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessEvaluator {
    /// Seconds of the subscription rate held back as a liquidation buffer.
    pub safety_buffer_secs: u64,
}

impl Default for ReadinessEvaluator {
    fn default() -> Self {
        Self {
            safety_buffer_secs: DEFAULT_SAFETY_BUFFER_SECS,
        }
    }
}

impl ReadinessEvaluator {
    /// Creates an evaluator with a custom safety buffer.
    #[must_use]
    pub const fn new(safety_buffer_secs: u64) -> Self {
        Self { safety_buffer_secs }
    }

    /// Evaluates what the payer needs before subscribing.
    ///
    /// An unknown network yields `is_unsupported_network`; the token flag is
    /// then set only when no registered network accepts the symbol. Token
    /// deposit amounts are converted from 18 decimals rounding the required
    /// deposit up and the current deposit down, so depositing the reported
    /// shortfall always clears `needs_deposit`.
    ///
    /// # Errors
    ///
    /// Returns [`ReadinessError::InvalidTerms`] if the cost is malformed or
    /// not positive.
    pub fn evaluate(
        &self,
        registry: &NetworkRegistry,
        chain_id: ChainId,
        account: Address,
        terms: &SubscriptionTerms,
        snapshot: &OnChainSnapshot,
    ) -> Result<ReadinessVerdict, ReadinessError> {
        let token = match registry.resolve_token(chain_id, &terms.token) {
            Ok((_, token)) => token,
            Err(RegistryError::UnsupportedNetwork(_)) => {
                let token_known = registry
                    .iter()
                    .any(|n| n.find_token(&terms.token).is_some());
                return Ok(ReadinessVerdict::unsupported(
                    chain_id,
                    account,
                    true,
                    !token_known,
                ));
            }
            Err(_) => {
                return Ok(ReadinessVerdict::unsupported(
                    chain_id, account, false, true,
                ));
            }
        };

        let cost18 = terms.cost18()?;
        let rate18 = subscription_rate(cost18, terms.pay_cycle);
        let buffer18 = rate18.saturating_mul(U256::from(self.safety_buffer_secs));
        let required18 = cost18.saturating_add(buffer18);

        let required_units = rescale_ceil(required18, CUSTODY_DECIMALS, token.decimals);
        let current_units =
            rescale_floor(snapshot.custody_balance, CUSTODY_DECIMALS, token.decimals);

        let needs_deposit = snapshot.custody_balance < required18;
        let deposit_shortfall = if needs_deposit {
            required_units.saturating_sub(current_units)
        } else {
            U256::ZERO
        };
        let needs_approval = needs_deposit && snapshot.allowance < deposit_shortfall;
        let can_subscribe = if needs_deposit {
            snapshot.token_balance >= deposit_shortfall
        } else {
            snapshot.custody_balance >= required18
        };

        Ok(ReadinessVerdict {
            chain_id,
            account,
            needs_approval,
            needs_deposit,
            deposit_shortfall,
            can_subscribe,
            is_unsupported_network: false,
            is_unsupported_token: false,
            subscription_rate: rate18,
            required_deposit: required_units,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::PayCycle;
    use crate::networks::tests::polygon;

    fn registry() -> NetworkRegistry {
        NetworkRegistry::from_networks([polygon()]).unwrap()
    }

    fn terms(cost: &str) -> SubscriptionTerms {
        SubscriptionTerms {
            payee: Address::repeat_byte(0x33),
            cost: cost.into(),
            pay_cycle: PayCycle::Monthly,
            token: "USDC".into(),
            project_id: 0,
        }
    }

    fn evaluate(snapshot: OnChainSnapshot) -> ReadinessVerdict {
        ReadinessEvaluator::default()
            .evaluate(
                &registry(),
                137,
                Address::repeat_byte(0x44),
                &terms("10"),
                &snapshot,
            )
            .unwrap()
    }

    fn required18() -> U256 {
        let cost18 = U256::from(10_000_000_000_000_000_000u128);
        let rate = subscription_rate(cost18, PayCycle::Monthly);
        cost18 + rate * U256::from(DEFAULT_SAFETY_BUFFER_SECS)
    }

    #[test]
    fn test_fresh_wallet_needs_approval_and_deposit() {
        let verdict = evaluate(OnChainSnapshot {
            custody_balance: U256::ZERO,
            allowance: U256::ZERO,
            token_balance: U256::from(20_000_000u64),
        });
        assert!(verdict.needs_deposit);
        assert!(verdict.needs_approval);
        assert!(verdict.can_subscribe);
        assert!(verdict.deposit_shortfall > U256::from(10_000_000u64));
        assert_eq!(verdict.deposit_shortfall, U256::from(10_666_667u64));
        assert_eq!(verdict.next_step(true), Some(Step::Approve));
        assert!(!verdict.insufficient_balance());
    }

    #[test]
    fn test_funded_custody_can_subscribe_directly() {
        let verdict = evaluate(OnChainSnapshot {
            custody_balance: required18() + U256::from(1u8),
            allowance: U256::ZERO,
            token_balance: U256::ZERO,
        });
        assert!(!verdict.needs_deposit);
        assert!(!verdict.needs_approval);
        assert!(verdict.can_subscribe);
        assert_eq!(verdict.deposit_shortfall, U256::ZERO);
        assert_eq!(verdict.next_step(true), Some(Step::Subscribe));
    }

    #[test]
    fn test_exact_required_deposit_is_enough() {
        let verdict = evaluate(OnChainSnapshot {
            custody_balance: required18(),
            ..OnChainSnapshot::default()
        });
        assert!(!verdict.needs_deposit);
        assert!(verdict.can_subscribe);
    }

    #[test]
    fn test_depositing_shortfall_clears_deposit() {
        let before = evaluate(OnChainSnapshot {
            custody_balance: U256::from(3_000_000_000_000_000_000u128),
            allowance: U256::MAX,
            token_balance: U256::from(100_000_000u64),
        });
        assert!(before.needs_deposit);
        assert!(!before.needs_approval);
        assert_eq!(before.next_step(true), Some(Step::DepositAndSubscribe));
        assert_eq!(before.next_step(false), Some(Step::Deposit));

        let deposited18 = before.deposit_shortfall * U256::from(1_000_000_000_000u64);
        let after = evaluate(OnChainSnapshot {
            custody_balance: U256::from(3_000_000_000_000_000_000u128) + deposited18,
            allowance: U256::MAX,
            token_balance: U256::from(100_000_000u64),
        });
        assert!(!after.needs_deposit);
        assert_eq!(after.next_step(true), Some(Step::Subscribe));
    }

    #[test]
    fn test_allowance_covering_shortfall_skips_approval() {
        let verdict = evaluate(OnChainSnapshot {
            custody_balance: U256::ZERO,
            allowance: U256::from(10_666_667u64),
            token_balance: U256::from(20_000_000u64),
        });
        assert!(verdict.needs_deposit);
        assert!(!verdict.needs_approval);
    }

    #[test]
    fn test_insufficient_wallet_balance() {
        let verdict = evaluate(OnChainSnapshot {
            custody_balance: U256::ZERO,
            allowance: U256::MAX,
            token_balance: U256::from(1_000_000u64),
        });
        assert!(verdict.needs_deposit);
        assert!(!verdict.can_subscribe);
        assert_eq!(verdict.next_step(true), None);
        assert!(verdict.insufficient_balance());
    }

    #[test]
    fn test_unsupported_token() {
        let verdict = ReadinessEvaluator::default()
            .evaluate(
                &registry(),
                137,
                Address::ZERO,
                &SubscriptionTerms {
                    token: "DAI".into(),
                    ..terms("10")
                },
                &OnChainSnapshot::default(),
            )
            .unwrap();
        assert!(verdict.is_unsupported_token);
        assert!(!verdict.is_unsupported_network);
        assert!(!verdict.needs_approval && !verdict.needs_deposit && !verdict.can_subscribe);
        assert_eq!(verdict.next_step(true), None);
        assert!(!verdict.insufficient_balance());
    }

    #[test]
    fn test_unsupported_network_with_known_token() {
        let verdict = ReadinessEvaluator::default()
            .evaluate(
                &registry(),
                1,
                Address::ZERO,
                &terms("10"),
                &OnChainSnapshot::default(),
            )
            .unwrap();
        assert!(verdict.is_unsupported_network);
        assert!(!verdict.is_unsupported_token);
    }

    #[test]
    fn test_unsupported_takes_precedence_over_invalid_cost() {
        let verdict = ReadinessEvaluator::default()
            .evaluate(
                &registry(),
                1,
                Address::ZERO,
                &SubscriptionTerms {
                    token: "DAI".into(),
                    ..terms("oops")
                },
                &OnChainSnapshot::default(),
            )
            .unwrap();
        assert!(verdict.is_unsupported_network && verdict.is_unsupported_token);
    }

    #[test]
    fn test_invalid_cost() {
        let result = ReadinessEvaluator::default().evaluate(
            &registry(),
            137,
            Address::ZERO,
            &terms("-5"),
            &OnChainSnapshot::default(),
        );
        assert_eq!(
            result,
            Err(ReadinessError::InvalidTerms(AmountError::NotPositive))
        );
    }

    #[test]
    fn test_approval_implies_deposit() {
        for custody in [0u128, 5_000_000_000_000_000_000, 20_000_000_000_000_000_000] {
            for allowance in [0u64, 1_000_000, 50_000_000] {
                let verdict = evaluate(OnChainSnapshot {
                    custody_balance: U256::from(custody),
                    allowance: U256::from(allowance),
                    token_balance: U256::from(50_000_000u64),
                });
                assert!(!verdict.needs_approval || verdict.needs_deposit);
                assert!(verdict.needs_deposit || verdict.deposit_shortfall == U256::ZERO);
            }
        }
    }

    #[test]
    fn test_evaluate_is_repeatable() {
        let snapshot = OnChainSnapshot {
            custody_balance: U256::from(3_000_000_000_000_000_000u128),
            allowance: U256::from(1_000_000u64),
            token_balance: U256::from(20_000_000u64),
        };
        assert_eq!(evaluate(snapshot), evaluate(snapshot));
    }

    #[test]
    fn test_custom_buffer() {
        let verdict = ReadinessEvaluator::new(0)
            .evaluate(
                &registry(),
                137,
                Address::ZERO,
                &terms("10"),
                &OnChainSnapshot::default(),
            )
            .unwrap();
        assert_eq!(verdict.required_deposit, U256::from(10_000_000u64));
    }
}
