#[derive(Debug, Clone, PartialEq)]
pub struct BlockchainRecord {
    pub tx_type: String,
    pub tx_hash: String,
    pub amount: String,
    pub price_dollar: String,
    pub tx_date: i64,
    pub price_date: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SenderLink {
    pub sender_addr: String,
    pub tx_hash: String,
}
