//! Errors for the HTTP price source.

use papaya::fee::PriceError;
use reqwest::StatusCode;

/// Errors from [`crate::CoinGeckoPriceSource`].
#[derive(Debug, thiserror::Error)]
pub enum CoinGeckoError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {source}")]
    Http {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// The body was not the expected JSON.
    #[error("Failed to deserialize JSON: {source}")]
    JsonDeserialization {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// No USD price was returned for the id.
    #[error("No USD price for {0}")]
    MissingPrice(String),
    /// The returned price is not a decimal number.
    #[error("Invalid USD price for {id}: {value}")]
    InvalidPrice {
        /// Price id.
        id: String,
        /// Raw JSON value.
        value: String,
    },
}

impl From<CoinGeckoError> for PriceError {
    fn from(value: CoinGeckoError) -> Self {
        match value {
            CoinGeckoError::MissingPrice(id) => Self::Missing(id),
            other => Self::Unavailable(other.to_string()),
        }
    }
}
