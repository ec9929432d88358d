use crate::query::formatters::{OutputFormat, format_records, format_senders, format_stats};
use crate::repository::BlockchainRepository;
use anyhow::Result;

#[derive(Debug, Default)]
pub struct RecordQuery {
    pub tx_type: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

pub fn cmd_records(
    repo: &BlockchainRepository,
    query: RecordQuery,
    format: &OutputFormat,
) -> Result<()> {
    let records = repo.query_records(query.tx_type.as_deref(), query.limit, query.offset)?;
    let output = format_records(&records, format);
    println!("{output}");

    Ok(())
}

pub fn cmd_senders(
    repo: &BlockchainRepository,
    tx_hash: &str,
    format: &OutputFormat,
) -> Result<()> {
    let links = repo.get_senders(tx_hash)?;
    let output = format_senders(tx_hash, &links, format);
    println!("{output}");

    Ok(())
}

pub fn cmd_stats(repo: &BlockchainRepository, format: &OutputFormat) -> Result<()> {
    let stats = repo.get_statistics()?;
    let output = format_stats(&stats, format);
    println!("{output}");

    Ok(())
}
