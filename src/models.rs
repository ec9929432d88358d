use bigdecimal::BigDecimal;
use bigdecimal::num_bigint::BigInt;
use std::fmt;

/// External system a transaction was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Bitcoin,
    Ethereum,
    Tezos,
    Revolut,
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::Bitcoin => "Bitcoin",
            Source::Ethereum => "Ethereum",
            Source::Tezos => "Tezos",
            Source::Revolut => "Revolut",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settlement currency of a Revolut transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Usd,
    Eur,
}

impl Currency {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "USD" => Some(Currency::Usd),
            "EUR" => Some(Currency::Eur),
            _ => None,
        }
    }
}

/// Value of the `tx_type` column in the `blockchain` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxType {
    Btc,
    Eth,
    Xtz,
    RevolutUsd,
    RevolutEur,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Btc => "BTC",
            TxType::Eth => "ETH",
            TxType::Xtz => "XTZ",
            TxType::RevolutUsd => "Revolut (USD)",
            TxType::RevolutEur => "Revolut (EUR)",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction in the common shape every listener produces.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTransaction {
    /// More than one entry only for Bitcoin transactions spending several UTXOs.
    pub senders: Vec<String>,
    /// Receiving address; `None` for Revolut.
    pub receiver: Option<String>,
    /// Quantity in the asset's display unit.
    pub amount: BigDecimal,
    /// Seconds since epoch; `None` for Revolut transfers that have not completed.
    pub timestamp: Option<i64>,
    pub hash: String,
    pub block: Option<u64>,
    /// Reported by Ethereum only.
    pub confirmations: Option<u64>,
    /// Revolut only.
    pub currency: Option<Currency>,
}

/// USD price of an asset captured once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub asset: String,
    pub usd: BigDecimal,
    pub observed_at: i64,
}

impl PriceQuote {
    /// Quote observed now, truncated to whole seconds.
    pub fn fixed(asset: &str, usd: BigDecimal) -> Self {
        PriceQuote {
            asset: asset.to_string(),
            usd,
            observed_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Receiving addresses the ICO publishes, used to tell chain transactions apart.
#[derive(Debug, Clone)]
pub struct ReceiverAddresses {
    pub bitcoin: String,
    pub ethereum: String,
    pub tezos: String,
}

impl ReceiverAddresses {
    pub fn classify(&self, receiver: &str) -> Option<TxType> {
        if receiver == self.bitcoin {
            Some(TxType::Btc)
        } else if receiver.eq_ignore_ascii_case(&self.ethereum) {
            Some(TxType::Eth)
        } else if receiver == self.tezos {
            Some(TxType::Xtz)
        } else {
            None
        }
    }
}

/// Convert an integer amount of base units into the display unit.
pub fn from_base_units(units: impl Into<BigInt>, decimals: i64) -> BigDecimal {
    BigDecimal::new(units.into(), decimals)
}

/// Plain decimal rendering with trailing zeros removed, e.g. `0.00123`, `2.5`, `1`.
pub fn format_amount(value: &BigDecimal) -> String {
    let plain = value.to_plain_string();
    if !plain.contains('.') {
        return plain;
    }
    let trimmed = plain.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
