use crate::error::SourceError;
use crate::http::ApiClient;
use crate::models::PriceQuote;
use bigdecimal::BigDecimal;
use chrono::DateTime;
use serde::Deserialize;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Deserialize)]
struct SimplePriceResponse {
    bitcoin: RawQuote,
    ethereum: RawQuote,
    tezos: RawQuote,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    usd: serde_json::Number,
    last_updated_at: i64,
}

/// USD snapshot of every chain asset, taken once per run.
#[derive(Debug, Clone)]
pub struct Prices {
    pub bitcoin: PriceQuote,
    pub ethereum: PriceQuote,
    pub tezos: PriceQuote,
}

pub struct PriceOracle {
    client: ApiClient,
}

impl PriceOracle {
    pub fn new(api_url: &str) -> Result<Self, SourceError> {
        Ok(PriceOracle {
            client: ApiClient::new(api_url)?,
        })
    }

    pub async fn fetch(&self) -> Result<Prices, SourceError> {
        info!("Fetching latest coin prices...");
        let response: SimplePriceResponse = self
            .client
            .get_json(
                "/api/v3/simple/price",
                &[
                    ("ids", "bitcoin,ethereum,tezos"),
                    ("vs_currencies", "usd"),
                    ("include_market_cap", "false"),
                    ("include_24hr_vol", "false"),
                    ("include_24hr_change", "false"),
                    ("include_last_updated_at", "true"),
                ],
            )
            .await?;

        let prices = Prices {
            bitcoin: quote("bitcoin", response.bitcoin)?,
            ethereum: quote("ethereum", response.ethereum)?,
            tezos: quote("tezos", response.tezos)?,
        };

        for quote in [&prices.bitcoin, &prices.ethereum, &prices.tezos] {
            info!(
                "{}: {} $ ({})",
                quote.asset,
                quote.usd,
                DateTime::from_timestamp(quote.observed_at, 0)
                    .map_or_else(|| quote.observed_at.to_string(), |dt| dt.to_rfc3339())
            );
        }

        Ok(prices)
    }
}

fn quote(asset: &str, raw: RawQuote) -> Result<PriceQuote, SourceError> {
    // parse the JSON literal, not its f64 value, so 0.1 stays 0.1
    let usd = BigDecimal::from_str(&raw.usd.to_string())
        .map_err(|e| SourceError::Parse(format!("{asset} price {}: {e}", raw.usd)))?;

    Ok(PriceQuote {
        asset: asset.to_string(),
        usd,
        observed_at: raw.last_updated_at,
    })
}
