use crate::models::{NormalizedTransaction, PriceQuote, ReceiverAddresses, TxType, format_amount};
use crate::repository::{BlockchainRecord, BlockchainRepository, Database};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{info, warn};

const STORAGE_MAX_RETRIES: usize = 3;

/// How the `tx_type` of a new record is decided.
#[derive(Debug, Clone, Copy)]
pub enum TypeAssignment<'a> {
    /// Match the receiver against the published chain addresses.
    ByReceiver(&'a ReceiverAddresses),
    /// Every record of the batch gets this type (Revolut streams).
    Fixed(TxType),
}

impl TypeAssignment<'_> {
    fn resolve(&self, tx: &NormalizedTransaction) -> Option<TxType> {
        match self {
            TypeAssignment::Fixed(tx_type) => Some(*tx_type),
            TypeAssignment::ByReceiver(addresses) => {
                tx.receiver.as_deref().and_then(|r| addresses.classify(r))
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Rows added to `blockchain`.
    pub blockchain_rows: usize,
    /// Rows added to `transactions`.
    pub sender_rows: usize,
    pub already_recorded: usize,
    /// Not insertable: unknown receiver or no timestamp.
    pub skipped: usize,
}

fn storage_retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(50)
        .factor(2)
        .max_delay(Duration::from_secs(1))
        .map(jitter)
        .take(STORAGE_MAX_RETRIES)
}

/// Record every transaction whose hash is not yet known.
///
/// Each record is written together with its sender links. `existing_hashes`
/// is extended with every hash written so a later batch of the same run sees
/// them. A write that still fails after the bounded retries stops the batch
/// and is returned; rows written before it stay.
pub async fn reconcile_and_persist(
    db: &Database,
    existing_hashes: &mut HashSet<String>,
    txs: &[NormalizedTransaction],
    label: &str,
    assignment: TypeAssignment<'_>,
    price: &PriceQuote,
) -> Result<ReconcileReport> {
    info!("Adding new {} transactions to the database", label);

    let repo = BlockchainRepository::new(&db.conn);
    let price_dollar = format_amount(&price.usd);
    let mut report = ReconcileReport::default();

    for tx in txs {
        if existing_hashes.contains(&tx.hash) {
            report.already_recorded += 1;
            continue;
        }

        let Some(tx_type) = assignment.resolve(tx) else {
            warn!(
                "Skipping {} transaction {}: receiver {:?} is not a known address",
                label, tx.hash, tx.receiver
            );
            report.skipped += 1;
            continue;
        };

        let Some(tx_date) = tx.timestamp else {
            warn!("Skipping {} transaction {} without timestamp", label, tx.hash);
            report.skipped += 1;
            continue;
        };

        let record = BlockchainRecord {
            tx_type: tx_type.as_str().to_string(),
            tx_hash: tx.hash.clone(),
            amount: format_amount(&tx.amount),
            price_dollar: price_dollar.clone(),
            tx_date,
            price_date: price.observed_at,
        };

        let written = RetryIf::spawn(
            storage_retry_strategy(),
            || std::future::ready(repo.insert_with_senders(&record, &tx.senders)),
            |e: &anyhow::Error| {
                warn!("Failed to record {} transaction {}: {}, retrying", label, tx.hash, e);
                true
            },
        )
        .await
        .with_context(|| {
            format!(
                "failed to record {} transaction {} after {} retries",
                label, tx.hash, STORAGE_MAX_RETRIES
            )
        })?;

        match written {
            Some(links) => {
                report.blockchain_rows += 1;
                report.sender_rows += links;
            }
            // another run recorded it since the hashes were loaded
            None => report.already_recorded += 1,
        }
        existing_hashes.insert(tx.hash.clone());
    }

    info!("{} rows added in table blockchain", report.blockchain_rows);
    info!("{} rows added in table transactions", report.sender_rows);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Currency, from_base_units};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn addresses() -> ReceiverAddresses {
        ReceiverAddresses {
            bitcoin: "bc1qico".to_string(),
            ethereum: "0xico".to_string(),
            tezos: "tz1ico".to_string(),
        }
    }

    fn tx(
        hash: &str,
        senders: &[&str],
        receiver: Option<&str>,
        timestamp: i64,
    ) -> NormalizedTransaction {
        NormalizedTransaction {
            senders: senders.iter().map(|s| s.to_string()).collect(),
            receiver: receiver.map(str::to_string),
            amount: from_base_units(12_345, 4),
            timestamp: Some(timestamp),
            hash: hash.to_string(),
            block: Some(1),
            confirmations: None,
            currency: None,
        }
    }

    fn price(usd: &str, observed_at: i64) -> PriceQuote {
        PriceQuote {
            asset: "tezos".to_string(),
            usd: BigDecimal::from_str(usd).unwrap(),
            observed_at,
        }
    }

    #[tokio::test]
    async fn test_only_unknown_hashes_are_written() {
        let db = Database::new(":memory:").unwrap();
        let addresses = addresses();
        let mut existing: HashSet<String> = ["H1".to_string()].into_iter().collect();
        let txs = vec![
            tx("H1", &["S0"], Some("tz1ico"), 1_000),
            tx("H2", &["S1"], Some("tz1ico"), 2_000),
        ];

        let report = reconcile_and_persist(
            &db,
            &mut existing,
            &txs,
            "Tezos",
            TypeAssignment::ByReceiver(&addresses),
            &price("2.5", 9_999),
        )
        .await
        .unwrap();

        assert_eq!(report.blockchain_rows, 1);
        assert_eq!(report.sender_rows, 1);
        assert_eq!(report.already_recorded, 1);

        let repo = BlockchainRepository::new(&db.conn);
        let records = repo.query_records(None, 10, 0).unwrap();
        assert_eq!(
            records,
            vec![BlockchainRecord {
                tx_type: "XTZ".to_string(),
                tx_hash: "H2".to_string(),
                amount: "1.2345".to_string(),
                price_dollar: "2.5".to_string(),
                tx_date: 2_000,
                price_date: 9_999,
            }]
        );
        let links = repo.get_senders("H2").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].sender_addr, "S1");
        assert!(repo.get_senders("H1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_writes_nothing() {
        let db = Database::new(":memory:").unwrap();
        let addresses = addresses();
        let mut existing = HashSet::new();
        let txs = vec![
            tx("a", &["1A"], Some("bc1qico"), 10),
            tx("b", &["1B"], Some("bc1qico"), 20),
        ];

        let first = reconcile_and_persist(
            &db,
            &mut existing,
            &txs,
            "Bitcoin",
            TypeAssignment::ByReceiver(&addresses),
            &price("30000", 1),
        )
        .await
        .unwrap();
        assert_eq!(first.blockchain_rows, 2);

        let second = reconcile_and_persist(
            &db,
            &mut existing,
            &txs,
            "Bitcoin",
            TypeAssignment::ByReceiver(&addresses),
            &price("31000", 2),
        )
        .await
        .unwrap();
        assert_eq!(second.blockchain_rows, 0);
        assert_eq!(second.sender_rows, 0);
        assert_eq!(second.already_recorded, 2);
    }

    #[tokio::test]
    async fn test_stale_hash_set_does_not_duplicate_rows() {
        let db = Database::new(":memory:").unwrap();
        let addresses = addresses();
        let txs = vec![tx("dup", &["1A"], Some("bc1qico"), 10)];

        for _ in 0..2 {
            // as if two overlapping runs loaded the hashes before either wrote
            let mut stale = HashSet::new();
            reconcile_and_persist(
                &db,
                &mut stale,
                &txs,
                "Bitcoin",
                TypeAssignment::ByReceiver(&addresses),
                &price("30000", 1),
            )
            .await
            .unwrap();
        }

        let repo = BlockchainRepository::new(&db.conn);
        assert_eq!(repo.query_records(None, 10, 0).unwrap().len(), 1);
        assert_eq!(repo.get_senders("dup").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_utxo_fan_in_writes_one_link_per_sender() {
        let db = Database::new(":memory:").unwrap();
        let addresses = addresses();
        let mut existing = HashSet::new();
        let txs = vec![tx("fan-in", &["1A", "1B"], Some("bc1qico"), 10)];

        let report = reconcile_and_persist(
            &db,
            &mut existing,
            &txs,
            "Bitcoin",
            TypeAssignment::ByReceiver(&addresses),
            &price("30000", 1),
        )
        .await
        .unwrap();

        assert_eq!(report.blockchain_rows, 1);
        assert_eq!(report.sender_rows, 2);
        let repo = BlockchainRepository::new(&db.conn);
        let senders: Vec<String> = repo
            .get_senders("fan-in")
            .unwrap()
            .into_iter()
            .map(|l| l.sender_addr)
            .collect();
        assert_eq!(senders, vec!["1A", "1B"]);
    }

    #[tokio::test]
    async fn test_fixed_type_and_unknown_receiver() {
        let db = Database::new(":memory:").unwrap();
        let addresses = addresses();
        let mut existing = HashSet::new();

        let mut transfer = tx("rev-1", &["REF-1"], None, 50);
        transfer.currency = Some(Currency::Eur);
        let report = reconcile_and_persist(
            &db,
            &mut existing,
            &[transfer],
            "Revolut (EUR)",
            TypeAssignment::Fixed(TxType::RevolutEur),
            &price("1.1", 60),
        )
        .await
        .unwrap();
        assert_eq!(report.blockchain_rows, 1);

        let stray = tx("stray", &["tz1x"], Some("tz1somebodyelse"), 70);
        let report = reconcile_and_persist(
            &db,
            &mut existing,
            &[stray],
            "Tezos",
            TypeAssignment::ByReceiver(&addresses),
            &price("3", 80),
        )
        .await
        .unwrap();
        assert_eq!(report.blockchain_rows, 0);
        assert_eq!(report.skipped, 1);

        let repo = BlockchainRepository::new(&db.conn);
        let records = repo.query_records(None, 10, 0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tx_type, "Revolut (EUR)");
        assert_eq!(records[0].price_dollar, "1.1");
    }
}
