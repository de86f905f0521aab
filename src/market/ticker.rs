//! Public REST ticker - last traded price without authentication

use std::str::FromStr;
use std::time::Duration;

use log::debug;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::grid::{GridError, GridResult};

pub const DEFAULT_REST_URL: &str = "https://api.backpack.exchange";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerResponse {
    last_price: String,
}

/// Parse a `/api/v1/ticker` response body into the last price
pub fn parse_ticker(body: &str) -> GridResult<Decimal> {
    let ticker: TickerResponse = serde_json::from_str(body)?;
    let price = Decimal::from_str(ticker.last_price.trim())?;
    if price <= Decimal::ZERO {
        return Err(GridError::PriceUnavailable(format!(
            "non-positive last price {}",
            price
        )));
    }
    Ok(price)
}

/// Client for the public ticker endpoint
#[derive(Debug, Clone)]
pub struct PublicTicker {
    client: Client,
    base_url: String,
}

impl PublicTicker {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> GridResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn last_price(&self, symbol: &str) -> GridResult<Decimal> {
        let url = format!("{}/api/v1/ticker", self.base_url);
        debug!("Fetching ticker for {}", symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GridError::Transport(format!(
                "ticker request failed with {}: {}",
                status, body
            )));
        }

        parse_ticker(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_ticker() {
        let body = r#"{"symbol":"SOL_USDC","firstPrice":"140.1","lastPrice":"142.37","volume":"1000"}"#;
        assert_eq!(parse_ticker(body).unwrap(), dec!(142.37));
    }

    #[test]
    fn test_parse_ticker_rejects_garbage() {
        assert!(matches!(parse_ticker("{}"), Err(GridError::JsonParse(_))));
        assert!(matches!(
            parse_ticker(r#"{"lastPrice":"abc"}"#),
            Err(GridError::Decimal(_))
        ));
        assert!(matches!(
            parse_ticker(r#"{"lastPrice":"0"}"#),
            Err(GridError::PriceUnavailable(_))
        ));
    }
}
