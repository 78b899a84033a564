//! Read-only market data seams: the pool listing service, the token-safety
//! scoring service, and the fiat price feed.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::pool::Pool;
use crate::domain::safety::TokenSafetyData;

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected response: {0}")]
    Malformed(String),
    #[error("no data available and no cache to fall back on")]
    NoData,
}

/// The external pool listing service (C1).
#[async_trait]
pub trait PoolDirectoryPort: Send + Sync {
    /// All WSOL-quoted pools, cached with a short TTL. On a fetch failure the
    /// last cached result is returned; with no cache the error surfaces.
    async fn list_wsol_pools(&self) -> Result<Vec<Pool>, MarketDataError>;

    /// One pool by id, from cache or a direct lookup.
    async fn pool_by_id(&self, pool_id: &str) -> Result<Option<Pool>, MarketDataError>;

    /// The deepest WSOL pool trading `mint`, if any. Used by the recovery
    /// sweep to sell orphan tokens.
    async fn wsol_pool_for_mint(&self, mint: &str) -> Result<Option<Pool>, MarketDataError>;

    /// Which of the given mints are LP mints, and for which pools. Used by
    /// the recovery sweep to find orphan LP tokens from previous runs.
    async fn pools_for_lp_mints(&self, lp_mints: &[String])
        -> Result<Vec<Pool>, MarketDataError>;
}

/// The external token-safety scoring service (C2, layer 3).
#[async_trait]
pub trait TokenSafetyPort: Send + Sync {
    /// Normalized safety report for a mint; `None` when the service has no
    /// data for it.
    async fn token_report(&self, mint: &str) -> Result<Option<TokenSafetyData>, MarketDataError>;
}

/// The fiat price feed (C4). Display-only; never drives a trading decision.
#[async_trait]
pub trait PriceFeedPort: Send + Sync {
    /// Current SOL/USD, cached ~60 s; 0.0 when every source is down and no
    /// price was ever seen.
    async fn sol_price_usd(&self) -> f64;
}
