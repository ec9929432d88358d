use super::ChainListener;
use crate::config::RevolutConfig;
use crate::error::SourceError;
use crate::http::ApiClient;
use crate::models::{Currency, NormalizedTransaction, Source};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::DateTime;
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{info, warn};

const PAGE_SIZE: usize = 100;
const JWT_BEARER_ASSERTION: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRevolutTx {
    pub id: String,
    pub reference: Option<String>,
    pub created_at: Option<String>,
    /// Unset until the transfer has completed.
    pub completed_at: Option<String>,
    #[serde(default)]
    pub legs: Vec<RawLeg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLeg {
    pub amount: serde_json::Number,
    pub currency: String,
}

pub struct RevolutListener {
    client: ApiClient,
    config: RevolutConfig,
}

impl RevolutListener {
    pub fn new(config: &RevolutConfig) -> Result<Self, SourceError> {
        Ok(RevolutListener {
            client: ApiClient::new(&config.api_url)?,
            config: config.clone(),
        })
    }

    /// Exchange the long-lived refresh token for an access token.
    pub async fn authenticate(&self) -> Result<String, SourceError> {
        info!("Refreshing connection to Revolut API...");
        let response: TokenResponse = self
            .client
            .post_form(
                "/api/1.0/auth/token",
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", self.config.refresh_token.as_str()),
                    ("client_id", self.config.client_id.as_str()),
                    ("client_assertion_type", JWT_BEARER_ASSERTION),
                    ("client_assertion", self.config.client_assertion.as_str()),
                ],
            )
            .await?;
        info!("Connected to Revolut API");
        Ok(response.access_token)
    }
}

/// Completion time in whole seconds; sub-second precision is dropped.
fn completion_timestamp(completed_at: Option<&str>) -> Option<i64> {
    let completed_at = completed_at?;
    match DateTime::parse_from_rfc3339(completed_at) {
        Ok(dt) => Some(dt.timestamp()),
        Err(e) => {
            warn!("Ignoring unparsable Revolut completed_at {:?}: {}", completed_at, e);
            None
        }
    }
}

#[async_trait]
impl ChainListener for RevolutListener {
    type Raw = RawRevolutTx;

    fn source(&self) -> Source {
        Source::Revolut
    }

    async fn fetch_raw(&self) -> Result<Vec<RawRevolutTx>, SourceError> {
        let access_token = self.authenticate().await?;
        let count = PAGE_SIZE.to_string();
        let mut txs: Vec<RawRevolutTx> = Vec::new();
        let mut seen = HashSet::new();
        let mut to: Option<String> = None;

        // newest first; each page ends where the previous one stopped
        loop {
            let mut query = vec![("type", "transfer"), ("count", count.as_str())];
            if let Some(to) = &to {
                query.push(("to", to.as_str()));
            }

            let page: Vec<RawRevolutTx> = self
                .client
                .get_json_authorized("/api/1.0/transactions", &query, &access_token)
                .await?;
            let received = page.len();
            let next_to = page.last().and_then(|tx| tx.created_at.clone());
            // the boundary transfer comes back on the next page
            txs.extend(page.into_iter().filter(|tx| seen.insert(tx.id.clone())));

            match next_to {
                Some(next) if received >= PAGE_SIZE && to.as_ref() != Some(&next) => {
                    to = Some(next)
                }
                _ => break,
            }
        }

        Ok(txs)
    }

    fn normalize(&self, raw: Vec<RawRevolutTx>) -> Result<Vec<NormalizedTransaction>, SourceError> {
        let mut txs = Vec::with_capacity(raw.len());

        for tx in raw {
            let leg = tx.legs.first().ok_or_else(|| {
                SourceError::Parse(format!("Revolut transaction {} has no legs", tx.id))
            })?;

            // the reference identifies the investor; without it nothing can be attributed
            let Some(reference) = tx.reference.clone() else {
                warn!("Skipping Revolut transaction {} without reference", tx.id);
                continue;
            };

            let amount = BigDecimal::from_str(&leg.amount.to_string()).map_err(|e| {
                SourceError::Parse(format!("Revolut amount {} on {}: {e}", leg.amount, tx.id))
            })?;

            txs.push(NormalizedTransaction {
                senders: vec![reference],
                receiver: None,
                amount,
                timestamp: completion_timestamp(tx.completed_at.as_deref()),
                hash: tx.id,
                block: None,
                confirmations: None,
                currency: Currency::from_code(&leg.currency),
            });
        }

        Ok(txs)
    }
}
