use crate::models::format_amount;
use crate::repository::{BlockchainRecord, SenderLink, TypeStats};
use chrono::DateTime;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

pub fn format_records(records: &[BlockchainRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_records_table(records),
        OutputFormat::Json => format_records_json(records),
        OutputFormat::Csv => format_records_csv(records),
    }
}

fn format_records_table(records: &[BlockchainRecord]) -> String {
    if records.is_empty() {
        return "No transactions found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "Date",
            "Type",
            "Amount",
            "Price (USD)",
            "Price Date",
            "Tx Hash",
        ]);

    for record in records {
        table.add_row(vec![
            Cell::new(format_date(record.tx_date)),
            Cell::new(&record.tx_type),
            Cell::new(&record.amount),
            Cell::new(&record.price_dollar),
            Cell::new(format_date(record.price_date)),
            Cell::new(format_tx_hash(&record.tx_hash)),
        ]);
    }

    table.to_string()
}

fn format_records_json(records: &[BlockchainRecord]) -> String {
    let json_records: Vec<_> = records
        .iter()
        .map(|r| {
            json!({
                "tx_type": r.tx_type,
                "tx_hash": r.tx_hash,
                "amount": r.amount,
                "price_dollar": r.price_dollar,
                "tx_date": r.tx_date,
                "price_date": r.price_date,
            })
        })
        .collect();

    serde_json::to_string_pretty(&json_records).unwrap_or_else(|_| "[]".to_string())
}

fn format_records_csv(records: &[BlockchainRecord]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "tx_type",
        "tx_hash",
        "amount",
        "price_dollar",
        "tx_date",
        "price_date",
    ]);

    for record in records {
        let _ = wtr.write_record([
            &record.tx_type,
            &record.tx_hash,
            &record.amount,
            &record.price_dollar,
            &record.tx_date.to_string(),
            &record.price_date.to_string(),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_senders(tx_hash: &str, links: &[SenderLink], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if links.is_empty() {
                return format!("No senders recorded for {tx_hash}.");
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["#", "Sender"]);
            for (i, link) in links.iter().enumerate() {
                table.add_row(vec![Cell::new(i + 1), Cell::new(&link.sender_addr)]);
            }
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "tx_hash": tx_hash,
            "senders": links.iter().map(|l| &l.sender_addr).collect::<Vec<_>>(),
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["sender_addr", "tx_hash"]);
            for link in links {
                let _ = wtr.write_record([&link.sender_addr, &link.tx_hash]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_stats(stats: &[TypeStats], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if stats.is_empty() {
                return "No transactions recorded yet.".to_string();
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    "Type",
                    "Transactions",
                    "Unique Senders",
                    "Total Amount",
                    "Total (USD)",
                    "First",
                    "Last",
                ]);

            for s in stats {
                table.add_row(vec![
                    Cell::new(&s.tx_type),
                    Cell::new(s.records),
                    Cell::new(s.unique_senders),
                    Cell::new(format_amount(&s.total_amount)),
                    Cell::new(format_amount(&s.total_usd.round(2))),
                    Cell::new(s.first_tx_date.map_or("N/A".to_string(), format_date)),
                    Cell::new(s.last_tx_date.map_or("N/A".to_string(), format_date)),
                ]);
            }

            table.to_string()
        }
        OutputFormat::Json => {
            let json_stats: Vec<_> = stats
                .iter()
                .map(|s| {
                    json!({
                        "tx_type": s.tx_type,
                        "transactions": s.records,
                        "unique_senders": s.unique_senders,
                        "total_amount": format_amount(&s.total_amount),
                        "total_usd": format_amount(&s.total_usd),
                        "first_tx_date": s.first_tx_date,
                        "last_tx_date": s.last_tx_date,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json_stats).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "tx_type",
                "transactions",
                "unique_senders",
                "total_amount",
                "total_usd",
                "first_tx_date",
                "last_tx_date",
            ]);
            for s in stats {
                let _ = wtr.write_record([
                    &s.tx_type,
                    &s.records.to_string(),
                    &s.unique_senders.to_string(),
                    &format_amount(&s.total_amount),
                    &format_amount(&s.total_usd),
                    &s.first_tx_date.map_or(String::new(), |d| d.to_string()),
                    &s.last_tx_date.map_or(String::new(), |d| d.to_string()),
                ]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

fn format_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn format_tx_hash(hash: &str) -> String {
    if hash.len() <= 16 || !hash.is_ascii() {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..8], &hash[hash.len() - 6..])
}
