#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP fiat price source for papaya network fee quotes.
//!
//! [`CoinGeckoPriceSource`] implements [`papaya::fee::FiatPriceSource`]
//! against a CoinGecko-compatible `GET /api/v3/simple/price` endpoint. The
//! fee estimator caches what it returns, so the source itself does not.
//!
//! # Feature Flags
//!
//! - `telemetry` - Logs failed price lookups via `tracing`

pub mod coingecko;
pub mod error;

pub use coingecko::CoinGeckoPriceSource;
pub use error::CoinGeckoError;
