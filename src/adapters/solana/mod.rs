//! Wallet and read-only chain access.

mod chain;
mod wallet;

pub use chain::ChainQueries;
pub use wallet::{Wallet, WalletError, WALLET_KEY_ENV};
