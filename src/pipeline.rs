use crate::config::Config;
use crate::finality::partition_revolut;
use crate::listeners::Listener;
use crate::models::{NormalizedTransaction, PriceQuote, ReceiverAddresses, Source, TxType};
use crate::prices::{PriceOracle, Prices};
use crate::reconciler::{ReconcileReport, TypeAssignment, reconcile_and_persist};
use crate::repository::{BlockchainRepository, Database};
use crate::selector::select_since;
use anyhow::Result;
use bigdecimal::{BigDecimal, One};
use std::fmt;
use std::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Every source, finality-filtered.
    Full,
    /// Chain sources only, everything since the last recorded timestamp.
    Frequent,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Full => f.write_str("full"),
            PipelineKind::Frequent => f.write_str("frequent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    Recorded(ReconcileReport),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    pub label: String,
    pub status: SourceStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub kind: PipelineKind,
    pub outcomes: Vec<SourceOutcome>,
}

impl RunReport {
    pub fn failed_sources(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, SourceStatus::Failed(_)))
            .map(|o| o.label.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed_sources().is_empty()
    }

    pub fn log(&self) {
        for outcome in &self.outcomes {
            match &outcome.status {
                SourceStatus::Recorded(report) => info!(
                    "{}: {} new transactions, {} sender links, {} already recorded, {} skipped",
                    outcome.label,
                    report.blockchain_rows,
                    report.sender_rows,
                    report.already_recorded,
                    report.skipped
                ),
                SourceStatus::Failed(reason) => error!("{}: failed: {}", outcome.label, reason),
            }
        }

        let failed = self.failed_sources();
        if failed.is_empty() {
            info!("{} run succeeded for all {} sources", self.kind, self.outcomes.len());
        } else {
            error!(
                "{} run: {} of {} sources failed ({})",
                self.kind,
                failed.len(),
                self.outcomes.len(),
                failed.join(", ")
            );
        }
    }
}

/// One stream of transactions waiting to be reconciled.
#[derive(Debug)]
pub struct Batch {
    pub label: String,
    pub txs: Result<Vec<NormalizedTransaction>, String>,
    /// `None` classifies by receiver address.
    pub fixed_type: Option<TxType>,
    pub price: Result<PriceQuote, String>,
}

/// Turn one source's fetch result into the batches it feeds.
///
/// Revolut fans out into its USD and EUR streams, priced with fixed quotes so
/// they do not depend on the oracle.
pub fn build_batches(
    source: Source,
    txs: Result<Vec<NormalizedTransaction>, String>,
    prices: &Result<Prices, String>,
    eur_usd_rate: &BigDecimal,
) -> Vec<Batch> {
    let chain_price = |pick: fn(&Prices) -> &PriceQuote| {
        prices
            .as_ref()
            .map(|p| pick(p).clone())
            .map_err(|e| format!("price unavailable: {e}"))
    };

    match source {
        Source::Bitcoin => vec![Batch {
            label: source.name().to_string(),
            txs,
            fixed_type: None,
            price: chain_price(|p| &p.bitcoin),
        }],
        Source::Ethereum => vec![Batch {
            label: source.name().to_string(),
            txs,
            fixed_type: None,
            price: chain_price(|p| &p.ethereum),
        }],
        Source::Tezos => vec![Batch {
            label: source.name().to_string(),
            txs,
            fixed_type: None,
            price: chain_price(|p| &p.tezos),
        }],
        Source::Revolut => {
            let (usd_txs, eur_txs) = match txs {
                Ok(txs) => {
                    let (usd, eur) = partition_revolut(txs);
                    (Ok(usd), Ok(eur))
                }
                Err(e) => (Err(e.clone()), Err(e)),
            };
            vec![
                Batch {
                    label: TxType::RevolutUsd.as_str().to_string(),
                    txs: usd_txs,
                    fixed_type: Some(TxType::RevolutUsd),
                    price: Ok(PriceQuote::fixed("usd", BigDecimal::one())),
                },
                Batch {
                    label: TxType::RevolutEur.as_str().to_string(),
                    txs: eur_txs,
                    fixed_type: Some(TxType::RevolutEur),
                    price: Ok(PriceQuote::fixed("eur", eur_usd_rate.clone())),
                },
            ]
        }
    }
}

/// Reconcile every batch against the recorded hashes, isolating failures per batch.
pub async fn persist_batches(
    db: &Database,
    addresses: &ReceiverAddresses,
    batches: Vec<Batch>,
) -> Vec<SourceOutcome> {
    info!("Querying the database for the transaction hashes...");
    let repo = BlockchainRepository::new(&db.conn);
    let mut existing_hashes = match repo.get_all_hashes() {
        Ok(hashes) => hashes,
        Err(e) => {
            error!("Failed to load recorded transaction hashes: {:#}", e);
            return batches
                .into_iter()
                .map(|batch| SourceOutcome {
                    label: batch.label,
                    status: SourceStatus::Failed(format!("loading recorded hashes: {e:#}")),
                })
                .collect();
        }
    };
    info!("{} transactions already recorded", existing_hashes.len());

    let mut outcomes = Vec::with_capacity(batches.len());
    for batch in batches {
        let status = match (batch.txs, batch.price) {
            (Err(e), _) | (_, Err(e)) => SourceStatus::Failed(e),
            (Ok(txs), Ok(price)) => {
                let assignment = match batch.fixed_type {
                    Some(tx_type) => TypeAssignment::Fixed(tx_type),
                    None => TypeAssignment::ByReceiver(addresses),
                };
                match reconcile_and_persist(
                    db,
                    &mut existing_hashes,
                    &txs,
                    &batch.label,
                    assignment,
                    &price,
                )
                .await
                {
                    Ok(report) => SourceStatus::Recorded(report),
                    Err(e) => SourceStatus::Failed(format!("{e:#}")),
                }
            }
        };
        outcomes.push(SourceOutcome {
            label: batch.label,
            status,
        });
    }
    outcomes
}

/// Frequent-run tail: keep what is at or after each type's last recorded
/// timestamp, then reconcile. The transaction at that timestamp is selected
/// again every time and only hash deduplication keeps it from being rewritten.
pub async fn persist_since_last_recorded(
    db: &Database,
    addresses: &ReceiverAddresses,
    fetched: Vec<(Source, TxType, Result<Vec<NormalizedTransaction>, String>)>,
    prices: &Result<Prices, String>,
    eur_usd_rate: &BigDecimal,
) -> Vec<SourceOutcome> {
    let repo = BlockchainRepository::new(&db.conn);
    let mut batches = Vec::new();
    for (source, tx_type, txs) in fetched {
        let selected = txs.and_then(|txs| {
            let last_seen = repo
                .get_last_timestamp(tx_type.as_str())
                .map_err(|e| format!("reading last {tx_type} timestamp: {e:#}"))?;
            Ok(select_since(txs, tx_type, last_seen))
        });
        batches.extend(build_batches(source, selected, prices, eur_usd_rate));
    }

    persist_batches(db, addresses, batches).await
}

pub fn chain_tx_type(source: Source) -> Option<TxType> {
    match source {
        Source::Bitcoin => Some(TxType::Btc),
        Source::Ethereum => Some(TxType::Eth),
        Source::Tezos => Some(TxType::Xtz),
        Source::Revolut => None,
    }
}

pub struct Pipeline {
    db: Database,
    listeners: Vec<Listener>,
    oracle: PriceOracle,
    addresses: ReceiverAddresses,
    eur_usd_rate: BigDecimal,
}

impl Pipeline {
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let listeners = Listener::from_config(config)?;
        info!(
            "Listeners enabled: {}",
            listeners
                .iter()
                .map(|l| l.source().name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Pipeline {
            db,
            listeners,
            oracle: PriceOracle::new(&config.price_api_url)?,
            addresses: ReceiverAddresses {
                bitcoin: config.bitcoin.address.clone(),
                ethereum: config.ethereum.address.clone(),
                tezos: config.tezos.address.clone(),
            },
            eur_usd_rate: config.eur_usd_rate.clone(),
        })
    }

    pub async fn run(&self, kind: PipelineKind) -> RunReport {
        let start = Instant::now();
        info!("Starting {} run", kind);

        let report = match kind {
            PipelineKind::Full => self.run_full().await,
            PipelineKind::Frequent => self.run_frequent().await,
        };

        info!("{} run finished in {:?}", kind, start.elapsed());
        report
    }

    async fn run_full(&self) -> RunReport {
        let mut fetched = Vec::with_capacity(self.listeners.len());
        for listener in &self.listeners {
            // Revolut is split and settled-filtered per currency further down
            let result = match listener {
                Listener::Revolut(_) => listener.fetch_normalized().await,
                _ => listener.fetch_final().await,
            };
            fetched.push((listener.source(), self.describe_failure(listener, result)));
        }

        let prices = self.fetch_prices().await;

        let batches = fetched
            .into_iter()
            .flat_map(|(source, txs)| build_batches(source, txs, &prices, &self.eur_usd_rate))
            .collect();

        RunReport {
            kind: PipelineKind::Full,
            outcomes: persist_batches(&self.db, &self.addresses, batches).await,
        }
    }

    async fn run_frequent(&self) -> RunReport {
        let mut fetched = Vec::new();
        for listener in &self.listeners {
            let Some(tx_type) = chain_tx_type(listener.source()) else {
                continue;
            };
            let result = listener.fetch_normalized().await;
            fetched.push((
                listener.source(),
                tx_type,
                self.describe_failure(listener, result),
            ));
        }

        let prices = self.fetch_prices().await;

        RunReport {
            kind: PipelineKind::Frequent,
            outcomes: persist_since_last_recorded(
                &self.db,
                &self.addresses,
                fetched,
                &prices,
                &self.eur_usd_rate,
            )
            .await,
        }
    }

    async fn fetch_prices(&self) -> Result<Prices, String> {
        self.oracle.fetch().await.map_err(|e| {
            error!("Price oracle failed: {}", e);
            e.to_string()
        })
    }

    fn describe_failure(
        &self,
        listener: &Listener,
        result: Result<Vec<NormalizedTransaction>, crate::error::SourceError>,
    ) -> Result<Vec<NormalizedTransaction>, String> {
        result.map_err(|e| {
            error!("{} listener failed: {}", listener.source(), e);
            e.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Currency, from_base_units};
    use std::str::FromStr;

    fn addresses() -> ReceiverAddresses {
        ReceiverAddresses {
            bitcoin: "bc1qico".to_string(),
            ethereum: "0xico".to_string(),
            tezos: "tz1ico".to_string(),
        }
    }

    fn prices() -> Prices {
        let quote = |asset: &str, usd: &str| PriceQuote {
            asset: asset.to_string(),
            usd: BigDecimal::from_str(usd).unwrap(),
            observed_at: 1_622_505_600,
        };
        Prices {
            bitcoin: quote("bitcoin", "36000"),
            ethereum: quote("ethereum", "2600"),
            tezos: quote("tezos", "3.8"),
        }
    }

    fn chain_tx(hash: &str, receiver: &str) -> NormalizedTransaction {
        NormalizedTransaction {
            senders: vec![format!("from-{hash}")],
            receiver: Some(receiver.to_string()),
            amount: from_base_units(1, 0),
            timestamp: Some(1_622_505_000),
            hash: hash.to_string(),
            block: Some(10),
            confirmations: Some(500),
            currency: None,
        }
    }

    fn transfer(hash: &str, currency: Currency) -> NormalizedTransaction {
        NormalizedTransaction {
            senders: vec![format!("REF-{hash}")],
            receiver: None,
            amount: from_base_units(100, 0),
            timestamp: Some(1_622_505_000),
            hash: hash.to_string(),
            block: None,
            confirmations: None,
            currency: Some(currency),
        }
    }

    #[test]
    fn test_revolut_fans_out_with_fixed_quotes() {
        let rate = BigDecimal::from_str("1.21").unwrap();
        let txs = vec![
            transfer("u1", Currency::Usd),
            transfer("e1", Currency::Eur),
            transfer("e2", Currency::Eur),
        ];

        let batches = build_batches(Source::Revolut, Ok(txs), &Err("down".to_string()), &rate);
        assert_eq!(batches.len(), 2);

        assert_eq!(batches[0].label, "Revolut (USD)");
        assert_eq!(batches[0].txs.as_ref().unwrap().len(), 1);
        assert_eq!(batches[0].price.as_ref().unwrap().usd, BigDecimal::one());

        assert_eq!(batches[1].label, "Revolut (EUR)");
        assert_eq!(batches[1].txs.as_ref().unwrap().len(), 2);
        assert_eq!(batches[1].price.as_ref().unwrap().usd, rate);
    }

    #[test]
    fn test_chain_batch_fails_without_prices() {
        let batches = build_batches(
            Source::Tezos,
            Ok(vec![chain_tx("x1", "tz1ico")]),
            &Err("oracle timed out".to_string()),
            &BigDecimal::one(),
        );
        assert_eq!(batches.len(), 1);
        assert!(batches[0].price.is_err());
    }

    #[tokio::test]
    async fn test_failed_source_does_not_block_others() {
        let db = Database::new(":memory:").unwrap();
        let prices = Ok(prices());
        let rate = BigDecimal::one();

        let mut batches = build_batches(
            Source::Bitcoin,
            Err("request to https://blockchain.info timed out".to_string()),
            &prices,
            &rate,
        );
        batches.extend(build_batches(
            Source::Ethereum,
            Ok(vec![chain_tx("0xe1", "0xico")]),
            &prices,
            &rate,
        ));
        batches.extend(build_batches(
            Source::Tezos,
            Ok(vec![chain_tx("oo1", "tz1ico"), chain_tx("oo2", "tz1ico")]),
            &prices,
            &rate,
        ));

        let outcomes = persist_batches(&db, &addresses(), batches).await;
        let report = RunReport {
            kind: PipelineKind::Full,
            outcomes,
        };

        assert_eq!(report.failed_sources(), vec!["Bitcoin"]);
        assert!(!report.is_success());
        match &report.outcomes[1].status {
            SourceStatus::Recorded(r) => assert_eq!(r.blockchain_rows, 1),
            other => panic!("unexpected status {other:?}"),
        }
        match &report.outcomes[2].status {
            SourceStatus::Recorded(r) => assert_eq!(r.blockchain_rows, 2),
            other => panic!("unexpected status {other:?}"),
        }

        let repo = BlockchainRepository::new(&db.conn);
        let eth = repo.query_records(Some("ETH"), 10, 0).unwrap();
        assert_eq!(eth.len(), 1);
        assert_eq!(eth[0].price_dollar, "2600");
    }

    #[tokio::test]
    async fn test_same_hash_across_batches_is_written_once() {
        let db = Database::new(":memory:").unwrap();
        let prices = Ok(prices());
        let rate = BigDecimal::one();

        let mut batches = build_batches(
            Source::Tezos,
            Ok(vec![chain_tx("oo1", "tz1ico")]),
            &prices,
            &rate,
        );
        batches.extend(build_batches(
            Source::Tezos,
            Ok(vec![chain_tx("oo1", "tz1ico")]),
            &prices,
            &rate,
        ));

        let outcomes = persist_batches(&db, &addresses(), batches).await;
        match &outcomes[1].status {
            SourceStatus::Recorded(r) => {
                assert_eq!(r.blockchain_rows, 0);
                assert_eq!(r.already_recorded, 1);
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_chain_tx_types() {
        assert_eq!(chain_tx_type(Source::Bitcoin), Some(TxType::Btc));
        assert_eq!(chain_tx_type(Source::Ethereum), Some(TxType::Eth));
        assert_eq!(chain_tx_type(Source::Tezos), Some(TxType::Xtz));
        assert_eq!(chain_tx_type(Source::Revolut), None);
    }

    fn tezos_at(hash: &str, timestamp: i64) -> NormalizedTransaction {
        NormalizedTransaction {
            timestamp: Some(timestamp),
            ..chain_tx(hash, "tz1ico")
        }
    }

    fn recorded(outcome: &SourceOutcome) -> &ReconcileReport {
        match &outcome.status {
            SourceStatus::Recorded(report) => report,
            other => panic!("{} not recorded: {other:?}", outcome.label),
        }
    }

    #[tokio::test]
    async fn test_frequent_rerun_reselects_latest_but_writes_nothing() {
        let db = Database::new(":memory:").unwrap();
        let prices = Ok(prices());
        let rate = BigDecimal::one();
        let fetched = || {
            vec![(
                Source::Tezos,
                TxType::Xtz,
                Ok(vec![tezos_at("oo1", 100), tezos_at("oo2", 200)]),
            )]
        };

        let first =
            persist_since_last_recorded(&db, &addresses(), fetched(), &prices, &rate).await;
        assert_eq!(recorded(&first[0]).blockchain_rows, 2);

        let repo = BlockchainRepository::new(&db.conn);
        assert_eq!(repo.get_last_timestamp("XTZ").unwrap(), Some(200));

        let second =
            persist_since_last_recorded(&db, &addresses(), fetched(), &prices, &rate).await;
        let report = recorded(&second[0]);
        assert_eq!(report.blockchain_rows, 0);
        assert_eq!(report.sender_rows, 0);
        // oo2 sits exactly at the last recorded timestamp, oo1 is older
        assert_eq!(report.already_recorded, 1);
        assert_eq!(repo.query_records(None, 10, 0).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_frequent_selection_is_per_type() {
        let db = Database::new(":memory:").unwrap();
        let prices = Ok(prices());
        let rate = BigDecimal::one();

        persist_since_last_recorded(
            &db,
            &addresses(),
            vec![(Source::Tezos, TxType::Xtz, Ok(vec![tezos_at("oo1", 500)]))],
            &prices,
            &rate,
        )
        .await;

        // an older ETH transaction is still new for its own type
        let mut eth = chain_tx("0xe1", "0xico");
        eth.timestamp = Some(100);
        let outcomes = persist_since_last_recorded(
            &db,
            &addresses(),
            vec![
                (Source::Ethereum, TxType::Eth, Ok(vec![eth])),
                (Source::Bitcoin, TxType::Btc, Err("blockchain.info down".to_string())),
            ],
            &prices,
            &rate,
        )
        .await;

        assert_eq!(recorded(&outcomes[0]).blockchain_rows, 1);
        assert_eq!(
            outcomes[1].status,
            SourceStatus::Failed("blockchain.info down".to_string())
        );
    }
}
