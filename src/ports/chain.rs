//! Raw chain queries needed by the LP-lock layer of the safety screen.
//!
//! Kept separate from the execution backend: these are read-only RPC lookups
//! with no custody implications.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

#[async_trait]
pub trait ChainQueryPort: Send + Sync {
    /// Native balance of an address, in lamports.
    async fn native_balance(&self, address: &str) -> Result<u64, ChainError>;

    /// Current supply of a mint, raw units.
    async fn token_supply(&self, mint: &str) -> Result<u64, ChainError>;

    /// The ~20 largest token accounts for a mint: (account address, amount).
    async fn largest_token_accounts(&self, mint: &str)
        -> Result<Vec<(String, u64)>, ChainError>;

    /// Token authority (the wallet or PDA controlling the tokens) for each
    /// token account. Accounts that no longer exist map to the system
    /// program, which classification reads as burned.
    async fn account_authorities(
        &self,
        accounts: &[String],
    ) -> Result<HashMap<String, String>, ChainError>;

    /// Owning program of each address. Regular wallets resolve to the system
    /// program; PDAs resolve to their parent program.
    async fn account_owners(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, String>, ChainError>;
}
