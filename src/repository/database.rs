use anyhow::{Context, Result};
use rusqlite::Connection;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path)
            .context("Failed to open database")?;

        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        // One row per received transaction
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS blockchain (
                tx_type TEXT NOT NULL,
                tx_hash TEXT NOT NULL UNIQUE,
                amount TEXT NOT NULL,
                price_dollar TEXT NOT NULL,
                tx_date INTEGER NOT NULL,
                price_date INTEGER NOT NULL
            )",
            [],
        )?;

        // One row per (sender, transaction) pair
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS transactions (
                sender_addr TEXT NOT NULL,
                tx_hash TEXT NOT NULL,
                FOREIGN KEY (tx_hash) REFERENCES blockchain(tx_hash)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_blockchain_type_date
             ON blockchain(tx_type, tx_date)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transactions_hash
             ON transactions(tx_hash)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transactions_sender
             ON transactions(sender_addr)",
            [],
        )?;

        Ok(())
    }
}
