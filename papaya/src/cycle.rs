//! Pay cycles and per-second subscription rates.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How often a subscription cost is charged.
///
/// A month is fixed at 30 days and a year at 365 days; the custody contract
/// streams a constant per-second rate, so calendar lengths do not apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayCycle {
    /// Every 86 400 seconds.
    Daily,
    /// Every 604 800 seconds.
    Weekly,
    /// Every 2 592 000 seconds.
    Monthly,
    /// Every 31 536 000 seconds.
    Yearly,
}

/// Returned when a pay cycle string is not one of the known cycles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown pay cycle: {0:?}")]
pub struct UnknownPayCycle(pub String);

impl PayCycle {
    /// All supported cycles, shortest first.
    pub const ALL: [Self; 4] = [Self::Daily, Self::Weekly, Self::Monthly, Self::Yearly];

    /// Length of the cycle in seconds.
    #[must_use]
    pub const fn seconds(self) -> u64 {
        match self {
            Self::Daily => 86_400,
            Self::Weekly => 604_800,
            Self::Monthly => 2_592_000,
            Self::Yearly => 31_536_000,
        }
    }

    /// Canonical string form, e.g. `"/monthly"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "/daily",
            Self::Weekly => "/weekly",
            Self::Monthly => "/monthly",
            Self::Yearly => "/yearly",
        }
    }
}

/// Per-second rate for a cost charged once per `cycle`, rounding down.
///
/// Both `cost18` and the result are 18-decimal fixed point.
#[must_use]
pub fn subscription_rate(cost18: U256, cycle: PayCycle) -> U256 {
    cost18 / U256::from(cycle.seconds())
}

impl fmt::Display for PayCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayCycle {
    type Err = UnknownPayCycle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.trim();
        let bare = bare.strip_prefix('/').unwrap_or(bare);
        Self::ALL
            .into_iter()
            .find(|cycle| cycle.as_str()[1..].eq_ignore_ascii_case(bare))
            .ok_or_else(|| UnknownPayCycle(s.to_owned()))
    }
}

impl Serialize for PayCycle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PayCycle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_daily() {
        assert_eq!(
            subscription_rate(U256::from(8_640_000u64), PayCycle::Daily),
            U256::from(100u64)
        );
    }

    #[test]
    fn test_rate_rounds_down() {
        assert_eq!(
            subscription_rate(U256::from(86_399u64), PayCycle::Daily),
            U256::ZERO
        );
        let cost18 = U256::from(10_000_000_000_000_000_000u128);
        assert_eq!(
            subscription_rate(cost18, PayCycle::Monthly),
            U256::from(3_858_024_691_358u64)
        );
    }

    #[test]
    fn test_parse_with_and_without_slash() {
        assert_eq!("/daily".parse::<PayCycle>().unwrap(), PayCycle::Daily);
        assert_eq!("weekly".parse::<PayCycle>().unwrap(), PayCycle::Weekly);
        assert_eq!("/Monthly".parse::<PayCycle>().unwrap(), PayCycle::Monthly);
        assert_eq!("YEARLY".parse::<PayCycle>().unwrap(), PayCycle::Yearly);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "/hourly".parse::<PayCycle>().unwrap_err();
        assert_eq!(err, UnknownPayCycle("/hourly".to_owned()));
        assert!("".parse::<PayCycle>().is_err());
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let json = serde_json::to_string(&PayCycle::Monthly).unwrap();
        assert_eq!(json, "\"/monthly\"");
        let cycle: PayCycle = serde_json::from_str("\"daily\"").unwrap();
        assert_eq!(cycle, PayCycle::Daily);
        assert!(serde_json::from_str::<PayCycle>("\"biweekly\"").is_err());
    }
}
