use crate::models::{NormalizedTransaction, TxType};
use tracing::info;

/// Keep the transactions at or after the last recorded timestamp for `tx_type`.
///
/// The comparison is inclusive, so the latest recorded transaction comes back on
/// every run and relies on hash deduplication downstream. `None` (nothing
/// recorded yet) selects everything with a timestamp.
pub fn select_since(
    txs: Vec<NormalizedTransaction>,
    tx_type: TxType,
    last_seen: Option<i64>,
) -> Vec<NormalizedTransaction> {
    let selected: Vec<NormalizedTransaction> = txs
        .into_iter()
        .filter(|tx| match (tx.timestamp, last_seen) {
            (Some(timestamp), Some(last)) => timestamp >= last,
            (Some(_), None) => true,
            (None, _) => false,
        })
        .collect();

    info!(
        "{} {} transactions at or after {}",
        selected.len(),
        tx_type,
        last_seen.map_or_else(|| "the beginning".to_string(), |ts| ts.to_string())
    );
    selected
}
