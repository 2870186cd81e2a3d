//! Subscription terms supplied by the payee.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::amount::{AmountError, CUSTODY_DECIMALS, to_fixed_point};
use crate::cycle::PayCycle;

/// What the payer is asked to subscribe to.
///
/// Immutable for the lifetime of a checkout session. Validation of `cost`
/// happens when the terms are evaluated, so malformed terms still reach the
/// presentation layer as a readiness error instead of failing to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTerms {
    /// Recipient of the payment stream.
    #[serde(alias = "toAddress")]
    pub payee: Address,
    /// Cost per cycle in human units, e.g. `"9.99"`.
    pub cost: String,
    /// Billing period.
    pub pay_cycle: PayCycle,
    /// Payment token symbol, e.g. `"USDC"`.
    pub token: String,
    /// Project identifier forwarded to the custody contract.
    #[serde(default)]
    pub project_id: u64,
}

impl SubscriptionTerms {
    /// Cost per cycle as 18-decimal fixed point.
    ///
    /// # Errors
    ///
    /// Returns an [`AmountError`] if `cost` is malformed or not positive.
    pub fn cost18(&self) -> Result<U256, AmountError> {
        to_fixed_point(&self.cost, CUSTODY_DECIMALS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case_with_alias() {
        let terms: SubscriptionTerms = serde_json::from_str(
            r#"{
                "toAddress": "0x3333333333333333333333333333333333333333",
                "cost": "10",
                "payCycle": "/monthly",
                "token": "USDC"
            }"#,
        )
        .unwrap();
        assert_eq!(terms.payee, Address::repeat_byte(0x33));
        assert_eq!(terms.pay_cycle, PayCycle::Monthly);
        assert_eq!(terms.project_id, 0);
        assert_eq!(
            terms.cost18().unwrap(),
            U256::from(10_000_000_000_000_000_000u128)
        );
    }

    #[test]
    fn test_cost18_rejects_zero() {
        let terms = SubscriptionTerms {
            payee: Address::ZERO,
            cost: "0".into(),
            pay_cycle: PayCycle::Daily,
            token: "USDC".into(),
            project_id: 0,
        };
        assert_eq!(terms.cost18(), Err(AmountError::NotPositive));
    }
}
