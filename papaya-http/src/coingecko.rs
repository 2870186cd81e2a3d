//! CoinGecko-compatible `simple/price` client.

use std::str::FromStr;
use std::time::Duration;

use papaya::fee::{FiatPriceSource, PriceError};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use url::Url;

use crate::error::CoinGeckoError;

/// Public CoinGecko API.
pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/";

/// Header carrying a CoinGecko demo API key.
pub const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// Fetches USD prices from a CoinGecko-compatible API.
#[derive(Clone)]
pub struct CoinGeckoPriceSource {
    price_url: Url,
    client: Client,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for CoinGeckoPriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinGeckoPriceSource")
            .field("price_url", &self.price_url.as_str())
            .field("has_api_key", &self.api_key.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CoinGeckoPriceSource {
    /// Creates a source rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CoinGeckoError::UrlParse`] if the price endpoint URL cannot
    /// be built.
    pub fn try_new(base_url: Url) -> Result<Self, CoinGeckoError> {
        let price_url =
            base_url
                .join("./api/v3/simple/price")
                .map_err(|e| CoinGeckoError::UrlParse {
                    context: "Failed to construct ./api/v3/simple/price URL",
                    source: e,
                })?;
        Ok(Self {
            price_url,
            client: Client::new(),
            api_key: None,
            timeout: None,
        })
    }

    /// Sends the key in the [`API_KEY_HEADER`] header.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets a timeout for every request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The `simple/price` endpoint.
    #[must_use]
    pub const fn price_url(&self) -> &Url {
        &self.price_url
    }

    /// USD price of one unit of `price_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoinGeckoError`] on transport failure, a non-200 status, a
    /// malformed body, or when the body has no USD price for the id.
    pub async fn fetch_usd(&self, price_id: &str) -> Result<Decimal, CoinGeckoError> {
        let mut url = self.price_url.clone();
        url.query_pairs_mut()
            .append_pair("ids", price_id)
            .append_pair("vs_currencies", "usd");

        let mut req = self.client.get(url);
        if let Some(api_key) = &self.api_key {
            req = req.header(API_KEY_HEADER, api_key);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|e| CoinGeckoError::Http { source: e })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(CoinGeckoError::HttpStatus { status, body });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoinGeckoError::JsonDeserialization { source: e })?;
        parse_usd(&body, price_id)
    }
}

/// Reads `body[price_id]["usd"]` as a decimal.
fn parse_usd(body: &serde_json::Value, price_id: &str) -> Result<Decimal, CoinGeckoError> {
    let value = body
        .get(price_id)
        .and_then(|entry| entry.get("usd"))
        .ok_or_else(|| CoinGeckoError::MissingPrice(price_id.to_owned()))?;
    let invalid = || CoinGeckoError::InvalidPrice {
        id: price_id.to_owned(),
        value: value.to_string(),
    };
    let serde_json::Value::Number(number) = value else {
        return Err(invalid());
    };
    // Small prices arrive in exponent form, e.g. 1.2e-5
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| invalid())
}

impl TryFrom<&str> for CoinGeckoPriceSource {
    type Error = CoinGeckoError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| CoinGeckoError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

#[async_trait::async_trait]
impl FiatPriceSource for CoinGeckoPriceSource {
    async fn price_usd(&self, price_id: &str) -> Result<Decimal, PriceError> {
        self.fetch_usd(price_id)
            .await
            .inspect_err(|_e| {
                #[cfg(feature = "telemetry")]
                tracing::warn!(price_id, error = %_e, "fiat price lookup failed");
            })
            .map_err(PriceError::from)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn source(server: &MockServer) -> CoinGeckoPriceSource {
        CoinGeckoPriceSource::try_from(server.uri().as_str()).unwrap()
    }

    #[tokio::test]
    async fn test_fetches_usd_price() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/simple/price"))
            .and(query_param("ids", "matic-network"))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "matic-network": { "usd": 0.52 } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let price = source(&server).price_usd("matic-network").await.unwrap();
        assert_eq!(price, Decimal::from_str("0.52").unwrap());
    }

    #[tokio::test]
    async fn test_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header(API_KEY_HEADER, "demo-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "ethereum": { "usd": 3000 } })),
            )
            .mount(&server)
            .await;

        let price = source(&server)
            .with_api_key("demo-key")
            .fetch_usd("ethereum")
            .await
            .unwrap();
        assert_eq!(price, Decimal::from(3000));
    }

    #[tokio::test]
    async fn test_missing_id_is_missing_price() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = source(&server).price_usd("unknown-coin").await.unwrap_err();
        assert_eq!(err, PriceError::Missing("unknown-coin".into()));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = source(&server).fetch_usd("ethereum").await.unwrap_err();
        assert!(matches!(
            err,
            CoinGeckoError::HttpStatus { status, ref body } if status == StatusCode::INTERNAL_SERVER_ERROR && body == "boom"
        ));
        assert!(matches!(PriceError::from(err), PriceError::Unavailable(_)));
    }

    #[test]
    fn test_parse_usd_exponent_and_invalid() {
        let body = serde_json::json!({ "pepe": { "usd": 1.2e-5 }, "bad": { "usd": "n/a" } });
        assert_eq!(parse_usd(&body, "pepe").unwrap(), Decimal::from_str("0.000012").unwrap());
        assert!(matches!(
            parse_usd(&body, "bad"),
            Err(CoinGeckoError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_base_url_normalization() {
        let source = CoinGeckoPriceSource::try_from("https://pro-api.example.com///").unwrap();
        assert_eq!(
            source.price_url().as_str(),
            "https://pro-api.example.com/api/v3/simple/price"
        );
    }
}
