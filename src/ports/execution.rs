//! The contract the engine expects from the swap-execution backend.
//!
//! The backend owns transaction building, signing, submission, and
//! confirmation. It must read on-chain balances at call time rather than
//! trusting caller-supplied amounts, retry transient network errors
//! internally, and never silently partial-succeed: if funds moved before a
//! later step failed, the intermediate state surfaces as an error.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Network blip, rate limit, socket reset. Retried with backoff inside
    /// the backend; surfaces only after the attempts are exhausted.
    #[error("transient backend failure: {0}")]
    Transient(String),
    /// 4xx responses, malformed payloads. Never retried.
    #[error("permanent backend failure: {0}")]
    Permanent(String),
    /// Transaction submitted but failed on chain.
    #[error("transaction failed on-chain: {message}")]
    Exec {
        message: String,
        signatures: Vec<String>,
        logs: Vec<String>,
    },
    /// The hard wall-clock timeout elapsed; treated as transient.
    #[error("backend call timed out after {0}s")]
    Timeout(u64),
    /// Master kill switch is off; no real transactions.
    #[error("trading is disabled")]
    Disabled,
}

impl ExecutionError {
    /// Whether a caller-side retry is reasonable.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutionError::Transient(_) | ExecutionError::Timeout(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapDirection {
    /// SOL into the pool's other token.
    Buy,
    /// The pool's other token back into SOL.
    Sell,
}

/// Result of a confirmed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutcome {
    pub signatures: Vec<String>,
}

/// Result of a confirmed add-liquidity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddLiquidityOutcome {
    pub signatures: Vec<String>,
    /// LP mint of the pool entered, reported by the backend.
    pub lp_mint: String,
}

/// One LP valuation reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LpValuation {
    pub value_sol: f64,
    pub price_ratio: f64,
    pub lp_balance_raw: u64,
}

/// Request row for the batched valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpValueRequest {
    pub pool_id: String,
    pub lp_mint: String,
}

/// One wallet token holding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenHolding {
    pub mint: String,
    pub balance_raw: u64,
}

/// Result of closing empty token accounts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CloseAccountsOutcome {
    pub closed: u32,
    pub reclaimed_sol: f64,
}

#[async_trait]
pub trait ExecutionPort: Send + Sync {
    /// Pair the wallet's holdings into the pool; confirmed before returning.
    async fn add_liquidity(
        &self,
        pool_id: &str,
        slippage_pct: f64,
    ) -> Result<AddLiquidityOutcome, ExecutionError>;

    /// Withdraw the wallet's whole on-chain LP balance for the pool.
    async fn remove_liquidity(
        &self,
        pool_id: &str,
        slippage_pct: f64,
    ) -> Result<TxOutcome, ExecutionError>;

    /// Swap through the pool. `amount_in_sol = 0.0` means sell-all.
    async fn swap(
        &self,
        pool_id: &str,
        amount_in_sol: f64,
        slippage_pct: f64,
        direction: SwapDirection,
    ) -> Result<TxOutcome, ExecutionError>;

    /// Value the wallet's LP holding for one pool from live reserves.
    async fn lp_value(&self, pool_id: &str, lp_mint: &str)
        -> Result<LpValuation, ExecutionError>;

    /// Value many holdings in at most two bulk reads, keyed by pool id.
    async fn lp_value_batch(
        &self,
        entries: &[LpValueRequest],
    ) -> Result<HashMap<String, LpValuation>, ExecutionError>;

    /// Raw balance of one mint in the wallet.
    async fn balance(&self, mint: &str) -> Result<u64, ExecutionError>;

    /// All non-zero token holdings in the wallet.
    async fn list_tokens(&self) -> Result<Vec<TokenHolding>, ExecutionError>;

    /// Close empty token accounts, reclaiming rent. `keep_mints` are never
    /// touched.
    async fn close_empty_accounts(
        &self,
        keep_mints: &[String],
    ) -> Result<CloseAccountsOutcome, ExecutionError>;

    /// Unwrap the whole wrapped-native balance; returns the amount in SOL.
    async fn unwrap_native(&self) -> Result<f64, ExecutionError>;
}
