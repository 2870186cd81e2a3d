//! Network fee estimation.
//!
//! A fee quote is `gas units × gas price`, shown in the native token with 12
//! fractional digits and in USD with two. The native/USD rate comes from a
//! [`FiatPriceSource`] and is kept per chain in a [`FiatRateCache`] owned by
//! the [`FeeEstimator`]; entries expire after a fixed TTL and nothing else
//! invalidates them.
//!
//! Fee estimation never fails: any error along the way produces
//! [`FeeQuote::zero`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::{Duration, Instant};

use alloy_primitives::Address;
use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::chain::{ChainClient, ChainId, ContractCall};
use crate::networks::NetworkRegistry;

/// Default lifetime of a cached fiat rate.
pub const DEFAULT_FIAT_RATE_TTL: Duration = Duration::from_secs(60);

const NATIVE_DECIMALS: u32 = 18;

/// A displayed network fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    /// Fee in the native token, e.g. `"0.000420000000 POL"`.
    pub fee_display: String,
    /// Fee in USD, e.g. `"(~$0.01)"`.
    pub usd_display: String,
    /// Refresh request the quote belongs to.
    pub fetched_at_request_id: u64,
}

impl FeeQuote {
    /// The quote shown when estimation fails.
    #[must_use]
    pub fn zero(native_token: &str, request_id: u64) -> Self {
        Self {
            fee_display: format!("0.0 {native_token}"),
            usd_display: "($0.00)".to_owned(),
            fetched_at_request_id: request_id,
        }
    }
}

/// Errors from a [`FiatPriceSource`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    /// The source could not be reached or answered with an error.
    #[error("Price source unavailable: {0}")]
    Unavailable(String),
    /// The source has no price for the id.
    #[error("No USD price for {0}")]
    Missing(String),
}

/// Looks up USD prices by source-specific id (e.g. `"ethereum"`).
#[async_trait::async_trait]
pub trait FiatPriceSource: Send + Sync {
    /// USD price of one unit of the asset.
    async fn price_usd(&self, price_id: &str) -> Result<Decimal, PriceError>;
}

/// Fixed prices, for offline use and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceSource {
    prices: HashMap<String, Decimal>,
}

impl StaticPriceSource {
    /// Creates a source from `(id, price)` pairs.
    #[must_use]
    pub fn new<I, S>(prices: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        Self {
            prices: prices.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[async_trait::async_trait]
impl FiatPriceSource for StaticPriceSource {
    async fn price_usd(&self, price_id: &str) -> Result<Decimal, PriceError> {
        self.prices
            .get(price_id)
            .copied()
            .ok_or_else(|| PriceError::Missing(price_id.to_owned()))
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync + Debug {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// The system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: Decimal,
    expires_at: Instant,
}

/// Per-chain native/USD rates with a fixed TTL.
#[derive(Debug)]
pub struct FiatRateCache<K = SystemClock> {
    ttl: Duration,
    clock: K,
    rates: DashMap<ChainId, CachedRate>,
}

impl<K: Clock> FiatRateCache<K> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration, clock: K) -> Self {
        Self {
            ttl,
            clock,
            rates: DashMap::new(),
        }
    }

    /// Returns the cached rate if it has not expired.
    #[must_use]
    pub fn get(&self, chain_id: ChainId) -> Option<Decimal> {
        let now = self.clock.now();
        self.rates
            .get(&chain_id)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.rate)
    }

    /// Stores a rate for the configured TTL.
    pub fn insert(&self, chain_id: ChainId, rate: Decimal) {
        let expires_at = self.clock.now() + self.ttl;
        self.rates.insert(chain_id, CachedRate { rate, expires_at });
    }
}

/// What to quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRequest {
    /// Chain the call would be sent to.
    pub chain_id: ChainId,
    /// Sender.
    pub account: Address,
    /// The call to estimate.
    pub call: ContractCall,
    /// Refresh request the quote belongs to.
    pub request_id: u64,
}

/// Produces [`FeeQuote`]s.
#[derive(Debug)]
pub struct FeeEstimator<P, K = SystemClock> {
    prices: P,
    cache: FiatRateCache<K>,
}

impl<P: FiatPriceSource> FeeEstimator<P> {
    /// Creates an estimator on the system clock.
    #[must_use]
    pub fn new(prices: P, ttl: Duration) -> Self {
        Self::with_clock(prices, ttl, SystemClock)
    }
}

impl<P: FiatPriceSource, K: Clock> FeeEstimator<P, K> {
    /// Creates an estimator with an explicit clock.
    #[must_use]
    pub fn with_clock(prices: P, ttl: Duration, clock: K) -> Self {
        Self {
            prices,
            cache: FiatRateCache::new(ttl, clock),
        }
    }

    /// The estimator's rate cache.
    #[must_use]
    pub const fn cache(&self) -> &FiatRateCache<K> {
        &self.cache
    }

    /// Quotes the network fee for `request.call`.
    pub async fn estimate<C: ChainClient>(
        &self,
        client: &C,
        registry: &NetworkRegistry,
        request: &FeeRequest,
    ) -> FeeQuote {
        let native = registry.native_token(request.chain_id);
        let (gas, price) = futures_util::future::join(
            client.estimate_gas(request.chain_id, request.account, request.call),
            client.gas_price(request.chain_id),
        )
        .await;
        let (gas, price) = match (gas, price) {
            (Ok(gas), Ok(price)) => (gas, price),
            (Err(_e), _) | (_, Err(_e)) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(chain_id = request.chain_id, error = %_e, "fee estimation failed");
                return FeeQuote::zero(native, request.request_id);
            }
        };
        let Some(fee) = native_amount(gas, price) else {
            return FeeQuote::zero(native, request.request_id);
        };

        let usd_display = match self.fiat_rate(registry, request.chain_id).await {
            Some(rate) => {
                let usd = (fee * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
                format!("(~${usd:.2})")
            }
            None => "($0.00)".to_owned(),
        };
        let fee = fee.round_dp_with_strategy(12, RoundingStrategy::MidpointAwayFromZero);
        FeeQuote {
            fee_display: format!("{fee:.12} {native}"),
            usd_display,
            fetched_at_request_id: request.request_id,
        }
    }

    async fn fiat_rate(&self, registry: &NetworkRegistry, chain_id: ChainId) -> Option<Decimal> {
        if let Some(rate) = self.cache.get(chain_id) {
            return Some(rate);
        }
        let network = registry.network(chain_id)?;
        match self.prices.price_usd(&network.price_id).await {
            Ok(rate) => {
                self.cache.insert(chain_id, rate);
                Some(rate)
            }
            Err(_e) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(chain_id, error = %_e, "fiat price lookup failed");
                None
            }
        }
    }
}

/// `gas × price` wei as a native-token decimal, `None` on overflow.
fn native_amount(gas: u64, price: u128) -> Option<Decimal> {
    let wei = u128::from(gas).checked_mul(price)?;
    let wei = i128::try_from(wei).ok()?;
    Decimal::try_from_i128_with_scale(wei, NATIVE_DECIMALS).ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::str::FromStr;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use alloy_primitives::{TxHash, U256};

    use super::*;
    use crate::chain::{ChainError, Confirmation, ReadCall, TxHandle};
    use crate::networks::tests::polygon;

    #[derive(Debug, Clone)]
    pub(crate) struct ManualClock(Arc<Mutex<Instant>>);

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self(Arc::new(Mutex::new(Instant::now())))
        }

        pub(crate) fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Debug, Default)]
    struct CountingPrices {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl FiatPriceSource for CountingPrices {
        async fn price_usd(&self, price_id: &str) -> Result<Decimal, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PriceError::Unavailable("down".into()))
            } else {
                assert_eq!(price_id, "matic-network");
                Ok(Decimal::from_str("0.5").unwrap())
            }
        }
    }

    #[derive(Debug)]
    struct GasOnly {
        gas: Result<u64, ChainError>,
        price: u128,
    }

    impl ChainClient for GasOnly {
        async fn read(&self, _: ChainId, _: ReadCall) -> Result<Option<U256>, ChainError> {
            Ok(None)
        }

        async fn estimate_gas(
            &self,
            _: ChainId,
            _: Address,
            _: ContractCall,
        ) -> Result<u64, ChainError> {
            self.gas.clone()
        }

        async fn gas_price(&self, _: ChainId) -> Result<u128, ChainError> {
            Ok(self.price)
        }

        async fn simulate(&self, _: ChainId, _: Address, _: ContractCall) -> Result<(), ChainError> {
            Ok(())
        }

        async fn submit(
            &self,
            chain_id: ChainId,
            _: Address,
            _: ContractCall,
        ) -> Result<TxHandle, ChainError> {
            Ok(TxHandle {
                chain_id,
                hash: TxHash::ZERO,
            })
        }

        async fn await_confirmation(&self, _: TxHandle) -> Result<Confirmation, ChainError> {
            Ok(Confirmation::Success)
        }
    }

    fn request(chain_id: ChainId) -> FeeRequest {
        FeeRequest {
            chain_id,
            account: Address::ZERO,
            call: ContractCall::Deposit {
                custody: Address::ZERO,
                amount: U256::from(1u8),
            },
            request_id: 3,
        }
    }

    fn registry() -> NetworkRegistry {
        NetworkRegistry::from_networks([polygon()]).unwrap()
    }

    #[tokio::test]
    async fn test_quote_formats_fee_and_usd() {
        let client = GasOnly {
            gas: Ok(21_000),
            price: 30_000_000_000,
        };
        let estimator = FeeEstimator::new(CountingPrices::default(), DEFAULT_FIAT_RATE_TTL);
        let quote = estimator.estimate(&client, &registry(), &request(137)).await;
        assert_eq!(quote.fee_display, "0.000630000000 POL");
        assert_eq!(quote.usd_display, "(~$0.00)");
        assert_eq!(quote.fetched_at_request_id, 3);

        let client = GasOnly {
            gas: Ok(1_000_000),
            price: 100_000_000_000,
        };
        let quote = estimator.estimate(&client, &registry(), &request(137)).await;
        assert_eq!(quote.fee_display, "0.100000000000 POL");
        assert_eq!(quote.usd_display, "(~$0.05)");
    }

    #[tokio::test]
    async fn test_gas_failure_yields_zero_quote() {
        let client = GasOnly {
            gas: Err(ChainError::Reverted("nope".into())),
            price: 1,
        };
        let estimator = FeeEstimator::new(CountingPrices::default(), DEFAULT_FIAT_RATE_TTL);
        let quote = estimator.estimate(&client, &registry(), &request(137)).await;
        assert_eq!(quote, FeeQuote::zero("POL", 3));
        assert_eq!(quote.fee_display, "0.0 POL");

        let quote = estimator.estimate(&client, &registry(), &request(999)).await;
        assert_eq!(quote.fee_display, "0.0 ETH");
    }

    #[tokio::test]
    async fn test_rate_is_cached_until_ttl() {
        let clock = ManualClock::new();
        let estimator = FeeEstimator::with_clock(
            CountingPrices::default(),
            Duration::from_secs(60),
            clock.clone(),
        );
        let client = GasOnly {
            gas: Ok(21_000),
            price: 1,
        };
        let registry = registry();

        estimator.estimate(&client, &registry, &request(137)).await;
        estimator.estimate(&client, &registry, &request(137)).await;
        assert_eq!(estimator.prices.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(61));
        estimator.estimate(&client, &registry, &request(137)).await;
        assert_eq!(estimator.prices.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_price_is_not_cached() {
        let estimator = FeeEstimator::new(
            CountingPrices {
                calls: AtomicUsize::new(0),
                fail: true,
            },
            DEFAULT_FIAT_RATE_TTL,
        );
        let client = GasOnly {
            gas: Ok(21_000),
            price: 30_000_000_000,
        };
        let quote = estimator.estimate(&client, &registry(), &request(137)).await;
        assert_eq!(quote.fee_display, "0.000630000000 POL");
        assert_eq!(quote.usd_display, "($0.00)");
        assert!(estimator.cache().get(137).is_none());

        estimator.estimate(&client, &registry(), &request(137)).await;
        assert_eq!(estimator.prices.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_static_price_source() {
        let source = StaticPriceSource::new([("ethereum", Decimal::from(3000))]);
        assert_eq!(source.price_usd("ethereum").await.unwrap(), Decimal::from(3000));
        assert_eq!(
            source.price_usd("bitcoin").await,
            Err(PriceError::Missing("bitcoin".into()))
        );
    }

    #[test]
    fn test_native_amount_overflow() {
        assert!(native_amount(u64::MAX, u128::MAX).is_none());
        assert_eq!(
            native_amount(1, 1_000_000_000_000_000_000),
            Some(Decimal::ONE)
        );
    }
}
