use super::ChainListener;
use crate::config::ChainConfig;
use crate::error::SourceError;
use crate::http::ApiClient;
use crate::models::{NormalizedTransaction, Source, from_base_units};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

const MUTEZ_DECIMALS: i64 = 6;
const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct RawTezosOperation {
    /// TzKT's own operation id, increasing over time.
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub hash: Option<String>,
    pub sender: Option<RawTezosAccount>,
    /// Mutez.
    pub amount: Option<u64>,
    pub timestamp: Option<String>,
    pub level: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTezosAccount {
    pub address: String,
}

pub struct TezosListener {
    client: ApiClient,
    address: String,
}

impl TezosListener {
    pub fn new(config: &ChainConfig) -> Result<Self, SourceError> {
        Ok(TezosListener {
            client: ApiClient::new(&config.api_url)?,
            address: config.address.clone(),
        })
    }
}

fn required<T>(value: Option<T>, field: &str, op: &RawTezosOperation) -> Result<T, SourceError> {
    value.ok_or_else(|| {
        SourceError::Parse(format!(
            "Tezos operation {} has no {field}",
            op.hash.as_deref().unwrap_or("<unknown>")
        ))
    })
}

#[async_trait]
impl ChainListener for TezosListener {
    type Raw = RawTezosOperation;

    fn source(&self) -> Source {
        Source::Tezos
    }

    async fn fetch_raw(&self) -> Result<Vec<RawTezosOperation>, SourceError> {
        let path = format!("/v1/accounts/{}/operations", self.address);
        let limit = PAGE_SIZE.to_string();
        let mut operations: Vec<RawTezosOperation> = Vec::new();
        let mut last_id: Option<u64> = None;

        loop {
            let last = last_id.map(|id| id.to_string());
            let mut query = vec![
                ("type", "transaction"),
                ("sort", "0"),
                ("limit", limit.as_str()),
            ];
            if let Some(last) = &last {
                query.push(("lastId", last.as_str()));
            }

            let page: Vec<RawTezosOperation> = self.client.get_json(&path, &query).await?;
            let received = page.len();
            let next_id = page.last().map(|op| op.id);
            operations.extend(page);

            match next_id {
                Some(id) if received >= PAGE_SIZE && last_id.is_none_or(|last| id > last) => {
                    last_id = Some(id)
                }
                _ => break,
            }
        }

        // reveals, delegations and the like carry no funds
        Ok(operations
            .into_iter()
            .filter(|op| op.kind == "transaction")
            .collect())
    }

    fn normalize(
        &self,
        raw: Vec<RawTezosOperation>,
    ) -> Result<Vec<NormalizedTransaction>, SourceError> {
        raw.iter()
            .map(|op| {
                let sender = required(op.sender.as_ref(), "sender", op)?;
                let amount = required(op.amount, "amount", op)?;
                let level = required(op.level, "level", op)?;
                let hash = required(op.hash.clone(), "hash", op)?;
                let timestamp = required(op.timestamp.as_deref(), "timestamp", op)?;
                let timestamp = DateTime::parse_from_rfc3339(timestamp)
                    .map_err(|e| SourceError::Parse(format!("Tezos timestamp {timestamp:?}: {e}")))?
                    .timestamp();

                Ok(NormalizedTransaction {
                    senders: vec![sender.address.clone()],
                    receiver: Some(self.address.clone()),
                    amount: from_base_units(amount, MUTEZ_DECIMALS),
                    timestamp: Some(timestamp),
                    hash,
                    block: Some(level),
                    confirmations: None,
                    currency: None,
                })
            })
            .collect()
    }

    async fn current_finality_depth(&self) -> Result<Option<u64>, SourceError> {
        let count: u64 = self.client.get_json("/v1/blocks/count", &[]).await?;
        Ok(Some(count))
    }
}
