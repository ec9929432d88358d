use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub api_url: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct EthereumConfig {
    pub api_url: String,
    pub address: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct RevolutConfig {
    pub api_url: String,
    pub refresh_token: String,
    pub client_id: String,
    pub client_assertion: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bitcoin: ChainConfig,
    pub ethereum: EthereumConfig,
    pub tezos: ChainConfig,
    /// `None` when no refresh token is configured; the Revolut listener is then disabled.
    pub revolut: Option<RevolutConfig>,
    pub price_api_url: String,
    pub eur_usd_rate: BigDecimal,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let database_url = Self::database_url();

        let bitcoin = ChainConfig {
            api_url: env_or("BITCOIN_API", "https://blockchain.info"),
            address: std::env::var("BITCOIN_ADDRESS")
                .context("BITCOIN_ADDRESS must be set in .env")?,
        };

        let ethereum = EthereumConfig {
            api_url: env_or("ETHEREUM_API", "https://api.etherscan.io"),
            address: std::env::var("ETHEREUM_ADDRESS")
                .context("ETHEREUM_ADDRESS must be set in .env")?,
            api_key: env_or("ETHERSCAN_TOKEN", ""),
        };

        let tezos = ChainConfig {
            api_url: env_or("TEZOS_API", "https://api.tzkt.io"),
            address: std::env::var("TEZOS_ADDRESS")
                .context("TEZOS_ADDRESS must be set in .env")?,
        };

        let revolut = match std::env::var("REVOLUT_REFRESH_TOKEN") {
            Ok(refresh_token) => Some(RevolutConfig {
                api_url: env_or("REVOLUT_API", "https://b2b.revolut.com"),
                refresh_token,
                client_id: std::env::var("REVOLUT_CLIENT_ID")
                    .context("REVOLUT_CLIENT_ID must be set when REVOLUT_REFRESH_TOKEN is")?,
                client_assertion: std::env::var("REVOLUT_JWT")
                    .context("REVOLUT_JWT must be set when REVOLUT_REFRESH_TOKEN is")?,
            }),
            Err(_) => None,
        };

        let eur_usd_rate_str = env_or("EUR_USD_RATE", "1");
        let eur_usd_rate = BigDecimal::from_str(&eur_usd_rate_str)
            .context("Invalid EUR_USD_RATE format")?;

        Ok(Config {
            database_url,
            bitcoin,
            ethereum,
            tezos,
            revolut,
            price_api_url: env_or("PRICE_API", "https://api.coingecko.com"),
            eur_usd_rate,
        })
    }

    /// Database location alone, for tools that never reach the sources.
    pub fn database_url() -> String {
        dotenv::dotenv().ok();
        env_or("DATABASE_URL", "sqlite:./ico.db")
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
