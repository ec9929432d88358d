use super::models::{BlockchainRecord, SenderLink};
use anyhow::Result;
use bigdecimal::{BigDecimal, Zero};
use rusqlite::{Row, ToSql, params, params_from_iter};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

pub struct BlockchainRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> BlockchainRepository<'a> {
    // an existing hash makes the insert a no-op instead of an error
    const INSERT_RECORD: &'static str = "INSERT OR IGNORE INTO blockchain (
            tx_type, tx_hash, amount, price_dollar, tx_date, price_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

    const INSERT_SENDER: &'static str =
        "INSERT INTO transactions (sender_addr, tx_hash) VALUES (?1, ?2)";

    const SELECT_HASHES: &'static str = "SELECT tx_hash FROM blockchain";

    const SELECT_LAST_TIMESTAMP: &'static str =
        "SELECT MAX(tx_date) FROM blockchain WHERE tx_type = ?1";

    const SELECT_RECORD: &'static str =
        "SELECT tx_type, tx_hash, amount, price_dollar, tx_date, price_date FROM blockchain";

    const SELECT_SENDERS: &'static str =
        "SELECT sender_addr, tx_hash FROM transactions WHERE tx_hash = ?1 ORDER BY rowid";

    const SELECT_SENDER_COUNTS: &'static str = "SELECT b.tx_type, COUNT(DISTINCT t.sender_addr)
        FROM transactions t INNER JOIN blockchain b ON b.tx_hash = t.tx_hash
        GROUP BY b.tx_type";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Hashes of every recorded transaction, all sources together.
    pub fn get_all_hashes(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare(Self::SELECT_HASHES)?;
        let hashes = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(hashes)
    }

    pub fn get_last_timestamp(&self, tx_type: &str) -> Result<Option<i64>> {
        let timestamp: Option<i64> =
            self.conn
                .query_row(Self::SELECT_LAST_TIMESTAMP, params![tx_type], |row| {
                    row.get(0)
                })?;
        Ok(timestamp)
    }

    /// Insert a record and its sender links as one unit.
    ///
    /// Returns `None` when the hash was already recorded (nothing written),
    /// otherwise the number of sender links inserted.
    pub fn insert_with_senders(
        &self,
        record: &BlockchainRecord,
        senders: &[String],
    ) -> Result<Option<usize>> {
        let tx = self.conn.unchecked_transaction()?;

        let inserted = tx.execute(
            Self::INSERT_RECORD,
            params![
                record.tx_type,
                record.tx_hash,
                record.amount,
                record.price_dollar,
                record.tx_date,
                record.price_date,
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }

        let mut links = 0;
        {
            let mut stmt = tx.prepare(Self::INSERT_SENDER)?;
            for sender in senders {
                links += stmt.execute(params![sender, record.tx_hash])?;
            }
        }

        tx.commit()?;
        Ok(Some(links))
    }

    pub fn query_records(
        &self,
        tx_type: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BlockchainRecord>> {
        let mut query = Self::SELECT_RECORD.to_string();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(tx_type) = tx_type {
            query.push_str(" WHERE tx_type = ?");
            params.push(Box::new(tx_type.to_string()));
        }

        query.push_str(&format!(
            " ORDER BY tx_date DESC, rowid DESC LIMIT {limit} OFFSET {offset}"
        ));

        let mut stmt = self.conn.prepare(&query)?;
        let records = stmt
            .query_map(params_from_iter(params), Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn get_senders(&self, tx_hash: &str) -> Result<Vec<SenderLink>> {
        let mut stmt = self.conn.prepare(Self::SELECT_SENDERS)?;
        let links = stmt
            .query_map(params![tx_hash], |row| {
                Ok(SenderLink {
                    sender_addr: row.get(0)?,
                    tx_hash: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    /// Per-`tx_type` totals, ordered by type.
    pub fn get_statistics(&self) -> Result<Vec<TypeStats>> {
        let mut stats: BTreeMap<String, TypeStats> = BTreeMap::new();

        let mut stmt = self.conn.prepare(Self::SELECT_RECORD)?;
        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        for record in records {
            let amount = Self::parse_decimal(&record.amount)?;
            let price = Self::parse_decimal(&record.price_dollar)?;

            let entry = stats
                .entry(record.tx_type.clone())
                .or_insert_with(|| TypeStats::empty(&record.tx_type));
            entry.records += 1;
            entry.total_usd += &amount * &price;
            entry.total_amount += amount;
            entry.first_tx_date = Some(
                entry
                    .first_tx_date
                    .map_or(record.tx_date, |d| d.min(record.tx_date)),
            );
            entry.last_tx_date = Some(
                entry
                    .last_tx_date
                    .map_or(record.tx_date, |d| d.max(record.tx_date)),
            );
        }

        let mut stmt = self.conn.prepare(Self::SELECT_SENDER_COUNTS)?;
        let sender_counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        for (tx_type, count) in sender_counts {
            if let Some(entry) = stats.get_mut(&tx_type) {
                entry.unique_senders = count;
            }
        }

        Ok(stats.into_values().collect())
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<BlockchainRecord> {
        Ok(BlockchainRecord {
            tx_type: row.get(0)?,
            tx_hash: row.get(1)?,
            amount: row.get(2)?,
            price_dollar: row.get(3)?,
            tx_date: row.get(4)?,
            price_date: row.get(5)?,
        })
    }

    fn parse_decimal(value: &str) -> Result<BigDecimal> {
        BigDecimal::from_str(value)
            .map_err(|_| anyhow::anyhow!("Invalid decimal format in database: {}", value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeStats {
    pub tx_type: String,
    pub records: usize,
    pub unique_senders: usize,
    pub total_amount: BigDecimal,
    pub total_usd: BigDecimal,
    pub first_tx_date: Option<i64>,
    pub last_tx_date: Option<i64>,
}

impl TypeStats {
    fn empty(tx_type: &str) -> Self {
        TypeStats {
            tx_type: tx_type.to_string(),
            records: 0,
            unique_senders: 0,
            total_amount: BigDecimal::zero(),
            total_usd: BigDecimal::zero(),
            first_tx_date: None,
            last_tx_date: None,
        }
    }
}
