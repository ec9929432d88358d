pub mod bitcoin;
pub mod ethereum;
pub mod revolut;
pub mod tezos;

pub use bitcoin::BitcoinListener;
pub use ethereum::EthereumListener;
pub use revolut::RevolutListener;
pub use tezos::TezosListener;

use crate::config::Config;
use crate::error::SourceError;
use crate::finality::filter_final;
use crate::models::{NormalizedTransaction, Source};
use async_trait::async_trait;
use tracing::info;

/// Adapter for one external source of incoming funds.
#[async_trait]
pub trait ChainListener: Send + Sync {
    /// Payload shape returned by the source's API.
    type Raw: Send;

    fn source(&self) -> Source;

    async fn fetch_raw(&self) -> Result<Vec<Self::Raw>, SourceError>;

    fn normalize(&self, raw: Vec<Self::Raw>) -> Result<Vec<NormalizedTransaction>, SourceError>;

    /// Current chain height, for sources whose finality is measured in blocks.
    async fn current_finality_depth(&self) -> Result<Option<u64>, SourceError> {
        Ok(None)
    }
}

pub async fn fetch_normalized<L: ChainListener>(
    listener: &L,
) -> Result<Vec<NormalizedTransaction>, SourceError> {
    info!("Fetching {} transactions...", listener.source());
    let raw = listener.fetch_raw().await?;
    info!("{} {} transactions fetched", raw.len(), listener.source());
    listener.normalize(raw)
}

pub async fn fetch_final<L: ChainListener>(
    listener: &L,
) -> Result<Vec<NormalizedTransaction>, SourceError> {
    let txs = fetch_normalized(listener).await?;
    let depth = listener.current_finality_depth().await?;
    if let Some(depth) = depth {
        info!("Current {} block is {}", listener.source(), depth);
    }
    Ok(filter_final(listener.source(), txs, depth))
}

/// One configured source, dispatched statically.
pub enum Listener {
    Bitcoin(BitcoinListener),
    Ethereum(EthereumListener),
    Tezos(TezosListener),
    Revolut(RevolutListener),
}

impl Listener {
    /// Build every listener the configuration enables, in pipeline order.
    pub fn from_config(config: &Config) -> Result<Vec<Listener>, SourceError> {
        let mut listeners = vec![
            Listener::Bitcoin(BitcoinListener::new(&config.bitcoin)?),
            Listener::Ethereum(EthereumListener::new(&config.ethereum)?),
            Listener::Tezos(TezosListener::new(&config.tezos)?),
        ];
        if let Some(revolut) = &config.revolut {
            listeners.push(Listener::Revolut(RevolutListener::new(revolut)?));
        }
        Ok(listeners)
    }

    pub fn source(&self) -> Source {
        match self {
            Listener::Bitcoin(l) => l.source(),
            Listener::Ethereum(l) => l.source(),
            Listener::Tezos(l) => l.source(),
            Listener::Revolut(l) => l.source(),
        }
    }

    pub async fn fetch_normalized(&self) -> Result<Vec<NormalizedTransaction>, SourceError> {
        match self {
            Listener::Bitcoin(l) => fetch_normalized(l).await,
            Listener::Ethereum(l) => fetch_normalized(l).await,
            Listener::Tezos(l) => fetch_normalized(l).await,
            Listener::Revolut(l) => fetch_normalized(l).await,
        }
    }

    /// Normalized transactions that passed the source's finality policy.
    pub async fn fetch_final(&self) -> Result<Vec<NormalizedTransaction>, SourceError> {
        match self {
            Listener::Bitcoin(l) => fetch_final(l).await,
            Listener::Ethereum(l) => fetch_final(l).await,
            Listener::Tezos(l) => fetch_final(l).await,
            Listener::Revolut(l) => fetch_final(l).await,
        }
    }
}
