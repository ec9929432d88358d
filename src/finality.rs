use crate::models::{Currency, NormalizedTransaction, Source};
use tracing::info;

pub const BITCOIN_MIN_DEPTH: u64 = 3;
pub const ETHEREUM_MIN_CONFIRMATIONS: u64 = 100;
pub const TEZOS_MIN_DEPTH: u64 = 20;

/// Rule deciding when a transaction is treated as irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalityPolicy {
    /// `current_block - tx.block >= depth`
    BlockDepth(u64),
    /// `tx.confirmations >= count`
    Confirmations(u64),
    /// The transfer carries a completion timestamp.
    Settled,
}

impl FinalityPolicy {
    pub fn for_source(source: Source) -> Self {
        match source {
            Source::Bitcoin => FinalityPolicy::BlockDepth(BITCOIN_MIN_DEPTH),
            Source::Ethereum => FinalityPolicy::Confirmations(ETHEREUM_MIN_CONFIRMATIONS),
            Source::Tezos => FinalityPolicy::BlockDepth(TEZOS_MIN_DEPTH),
            Source::Revolut => FinalityPolicy::Settled,
        }
    }

    /// `current_block` is only consulted by [`FinalityPolicy::BlockDepth`]; without
    /// it nothing is final.
    pub fn accepts(&self, tx: &NormalizedTransaction, current_block: Option<u64>) -> bool {
        match self {
            FinalityPolicy::BlockDepth(depth) => match (current_block, tx.block) {
                (Some(current), Some(block)) => current
                    .checked_sub(block)
                    .is_some_and(|confirmed| confirmed >= *depth),
                _ => false,
            },
            FinalityPolicy::Confirmations(count) => {
                tx.confirmations.is_some_and(|confirmations| confirmations >= *count)
            }
            FinalityPolicy::Settled => tx.timestamp.is_some(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FinalityPolicy::BlockDepth(depth) => format!("{depth} or more block confirmations"),
            FinalityPolicy::Confirmations(count) => {
                format!("{count} or more reported confirmations")
            }
            FinalityPolicy::Settled => "completed transfers".to_string(),
        }
    }
}

/// Keep the transactions of `source` that have reached finality.
pub fn filter_final(
    source: Source,
    txs: Vec<NormalizedTransaction>,
    current_block: Option<u64>,
) -> Vec<NormalizedTransaction> {
    let policy = FinalityPolicy::for_source(source);
    let total = txs.len();
    let valid: Vec<NormalizedTransaction> = txs
        .into_iter()
        .filter(|tx| policy.accepts(tx, current_block))
        .collect();

    info!(
        "{} of {} valid {} transactions ({})",
        valid.len(),
        total,
        source,
        policy.describe()
    );
    valid
}

/// Split settled Revolut transfers into their USD and EUR streams.
///
/// Transfers without a completion timestamp or in any other currency are in
/// neither stream.
pub fn partition_revolut(
    txs: Vec<NormalizedTransaction>,
) -> (Vec<NormalizedTransaction>, Vec<NormalizedTransaction>) {
    let settled = filter_final(Source::Revolut, txs, None);

    let mut usd_txs = Vec::new();
    let mut eur_txs = Vec::new();
    for tx in settled {
        match tx.currency {
            Some(Currency::Usd) => usd_txs.push(tx),
            Some(Currency::Eur) => eur_txs.push(tx),
            None => {}
        }
    }

    info!("{} USD transactions", usd_txs.len());
    info!("{} EUR transactions", eur_txs.len());
    (usd_txs, eur_txs)
}
