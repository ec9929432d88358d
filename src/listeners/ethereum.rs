use super::ChainListener;
use crate::config::EthereumConfig;
use crate::error::SourceError;
use crate::http::ApiClient;
use crate::models::{NormalizedTransaction, Source, from_base_units};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use bigdecimal::num_bigint::BigInt;
use serde::Deserialize;
use std::str::FromStr;

/// Wei digits dropped before scaling; keeps 8 decimals out of 18.
const TRUNCATED_WEI_DIGITS: usize = 10;
const KEPT_DECIMALS: i64 = 8;
const NO_TRANSACTIONS: &str = "No transactions found";

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEthereumTx {
    pub hash: String,
    pub from: String,
    /// Amount in wei, as a decimal string.
    pub value: String,
    pub time_stamp: String,
    pub block_number: String,
    pub confirmations: Option<String>,
}

pub struct EthereumListener {
    client: ApiClient,
    address: String,
    api_key: String,
}

impl EthereumListener {
    pub fn new(config: &EthereumConfig) -> Result<Self, SourceError> {
        Ok(EthereumListener {
            client: ApiClient::new(&config.api_url)?,
            address: config.address.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

/// Wei string to ether with 8 decimals, truncating (never rounding) the
/// low 10 digits.
pub fn wei_to_ether(value: &str) -> Result<BigDecimal, SourceError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SourceError::Parse(format!("invalid wei value: {value:?}")));
    }

    let kept = if value.len() > TRUNCATED_WEI_DIGITS {
        &value[..value.len() - TRUNCATED_WEI_DIGITS]
    } else {
        "0"
    };
    let units = BigInt::from_str(kept)
        .map_err(|e| SourceError::Parse(format!("invalid wei value {value:?}: {e}")))?;

    Ok(from_base_units(units, KEPT_DECIMALS))
}

/// Unwrap the Etherscan envelope of a `txlist` call.
fn txlist_result(response: EtherscanResponse) -> Result<Vec<RawEthereumTx>, SourceError> {
    if response.status != "1" {
        if response.message == NO_TRANSACTIONS {
            return Ok(Vec::new());
        }
        // On failure Etherscan puts the explanation in `result`.
        let detail = response.result.as_str().unwrap_or_default();
        return Err(SourceError::Api(format!("{} {}", response.message, detail)));
    }

    serde_json::from_value(response.result)
        .map_err(|e| SourceError::Parse(format!("Etherscan txlist: {e}")))
}

fn parse_number<T: FromStr>(field: &str, value: &str) -> Result<T, SourceError> {
    value
        .parse()
        .map_err(|_| SourceError::Parse(format!("invalid {field}: {value:?}")))
}

#[async_trait]
impl ChainListener for EthereumListener {
    type Raw = RawEthereumTx;

    fn source(&self) -> Source {
        Source::Ethereum
    }

    async fn fetch_raw(&self) -> Result<Vec<RawEthereumTx>, SourceError> {
        let response: EtherscanResponse = self
            .client
            .get_json(
                "/api",
                &[
                    ("module", "account"),
                    ("action", "txlist"),
                    ("address", self.address.as_str()),
                    ("startblock", "0"),
                    ("endblock", "99999999"),
                    ("sort", "asc"),
                    ("apikey", self.api_key.as_str()),
                ],
            )
            .await?;

        txlist_result(response)
    }

    fn normalize(
        &self,
        raw: Vec<RawEthereumTx>,
    ) -> Result<Vec<NormalizedTransaction>, SourceError> {
        raw.into_iter()
            .map(|tx| {
                let confirmations = tx
                    .confirmations
                    .as_deref()
                    .map(|c| parse_number("confirmations", c))
                    .transpose()?;

                Ok(NormalizedTransaction {
                    senders: vec![tx.from],
                    receiver: Some(self.address.clone()),
                    amount: wei_to_ether(&tx.value)?,
                    timestamp: Some(parse_number("timeStamp", &tx.time_stamp)?),
                    block: Some(parse_number("blockNumber", &tx.block_number)?),
                    hash: tx.hash,
                    confirmations,
                    currency: None,
                })
            })
            .collect()
    }
}
