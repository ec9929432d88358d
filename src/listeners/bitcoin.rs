use super::ChainListener;
use crate::config::ChainConfig;
use crate::error::SourceError;
use crate::http::ApiClient;
use crate::models::{NormalizedTransaction, Source, from_base_units};
use async_trait::async_trait;
use serde::Deserialize;

const SATOSHI_DECIMALS: i64 = 8;
const PAGE_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
struct RawAddress {
    n_tx: usize,
    txs: Vec<RawBitcoinTx>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBitcoinTx {
    pub hash: String,
    pub time: i64,
    /// Absent while the transaction sits in the mempool.
    pub block_height: Option<u64>,
    /// Net effect on the watched address, in satoshi.
    pub result: i64,
    #[serde(default)]
    pub inputs: Vec<RawInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInput {
    pub prev_out: Option<RawPrevOut>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPrevOut {
    pub addr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatestBlock {
    height: u64,
}

/// An empty page ends paging even if `n_tx` promised more.
fn is_last_page(received: usize, collected: usize, n_tx: usize) -> bool {
    received == 0 || collected >= n_tx
}

pub struct BitcoinListener {
    client: ApiClient,
    address: String,
}

impl BitcoinListener {
    pub fn new(config: &ChainConfig) -> Result<Self, SourceError> {
        Ok(BitcoinListener {
            client: ApiClient::new(&config.api_url)?,
            address: config.address.clone(),
        })
    }
}

#[async_trait]
impl ChainListener for BitcoinListener {
    type Raw = RawBitcoinTx;

    fn source(&self) -> Source {
        Source::Bitcoin
    }

    async fn fetch_raw(&self) -> Result<Vec<RawBitcoinTx>, SourceError> {
        let path = format!("/rawaddr/{}", self.address);
        let limit = PAGE_SIZE.to_string();
        let mut txs = Vec::new();

        loop {
            let offset = txs.len().to_string();
            let page: RawAddress = self
                .client
                .get_json(&path, &[("limit", limit.as_str()), ("offset", offset.as_str())])
                .await?;

            let received = page.txs.len();
            txs.extend(page.txs);
            if is_last_page(received, txs.len(), page.n_tx) {
                break;
            }
        }

        Ok(txs)
    }

    fn normalize(&self, raw: Vec<RawBitcoinTx>) -> Result<Vec<NormalizedTransaction>, SourceError> {
        Ok(raw
            .into_iter()
            .map(|tx| NormalizedTransaction {
                senders: tx
                    .inputs
                    .into_iter()
                    .filter_map(|input| input.prev_out.and_then(|prev| prev.addr))
                    .collect(),
                receiver: Some(self.address.clone()),
                amount: from_base_units(tx.result, SATOSHI_DECIMALS),
                timestamp: Some(tx.time),
                hash: tx.hash,
                block: tx.block_height,
                confirmations: None,
                currency: None,
            })
            .collect())
    }

    async fn current_finality_depth(&self) -> Result<Option<u64>, SourceError> {
        let latest: LatestBlock = self.client.get_json("/latestblock", &[]).await?;
        Ok(Some(latest.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server::TestServer;
    use crate::models::format_amount;

    fn listener() -> BitcoinListener {
        listener_at("https://blockchain.info")
    }

    fn listener_at(api_url: &str) -> BitcoinListener {
        BitcoinListener::new(&ChainConfig {
            api_url: api_url.to_string(),
            address: "bc1qicoaddress".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_normalize_collects_every_utxo_sender() {
        let raw: Vec<RawBitcoinTx> = serde_json::from_str(
            r#"[{
                "hash": "b6f6991d03df0e2e04dafffcd6bc418aac66049e2cd74b80f14ac86db1e3f0da",
                "time": 1622505600,
                "block_height": 685000,
                "result": 150000000,
                "inputs": [
                    {"prev_out": {"addr": "1SenderA", "value": 100000000}},
                    {"prev_out": {"addr": "1SenderB", "value": 60000000}}
                ]
            }]"#,
        )
        .unwrap();

        let txs = listener().normalize(raw).unwrap();
        assert_eq!(txs.len(), 1);
        let tx = &txs[0];
        assert_eq!(tx.senders, vec!["1SenderA", "1SenderB"]);
        assert_eq!(tx.receiver.as_deref(), Some("bc1qicoaddress"));
        assert_eq!(format_amount(&tx.amount), "1.5");
        assert_eq!(tx.timestamp, Some(1622505600));
        assert_eq!(tx.block, Some(685000));
    }

    #[test]
    fn test_normalize_tolerates_mempool_and_addressless_inputs() {
        let raw: Vec<RawBitcoinTx> = serde_json::from_str(
            r#"[{
                "hash": "pending",
                "time": 1622505700,
                "result": 25000,
                "inputs": [{"prev_out": {"value": 1}}, {}]
            }]"#,
        )
        .unwrap();

        let txs = listener().normalize(raw).unwrap();
        assert!(txs[0].senders.is_empty());
        assert_eq!(txs[0].block, None);
        assert_eq!(format_amount(&txs[0].amount), "0.00025");
    }

    #[test]
    fn test_paging_stops_on_count_or_empty_page() {
        assert!(!is_last_page(50, 50, 120));
        assert!(is_last_page(20, 120, 120));
        assert!(is_last_page(0, 0, 0));
        // the API lied about n_tx
        assert!(is_last_page(0, 70, 120));
    }

    fn page(n_tx: usize, hashes: &[&str]) -> String {
        let txs: Vec<String> = hashes
            .iter()
            .map(|h| {
                format!(r#"{{"hash": "{h}", "time": 1, "block_height": 1, "result": 1}}"#)
            })
            .collect();
        format!(r#"{{"n_tx": {n_tx}, "txs": [{}]}}"#, txs.join(","))
    }

    #[tokio::test]
    async fn test_fetch_raw_follows_offsets() {
        let server = TestServer::start(vec![page(3, &["a", "b"]), page(3, &["c"])]).await;

        let txs = listener_at(&server.url).fetch_raw().await.unwrap();
        let hashes: Vec<&str> = txs.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a", "b", "c"]);

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].target, "/rawaddr/bc1qicoaddress?limit=50&offset=0");
        assert_eq!(requests[1].target, "/rawaddr/bc1qicoaddress?limit=50&offset=2");
    }

    #[tokio::test]
    async fn test_fetch_raw_with_empty_history() {
        let server = TestServer::start(vec![page(0, &[])]).await;

        let txs = listener_at(&server.url).fetch_raw().await.unwrap();
        assert!(txs.is_empty());
        assert_eq!(server.requests().len(), 1);
    }
}
