//! Dry-run execution backend.
//!
//! Simulates confirmations without touching the chain, so the whole engine
//! path (scan, entry, monitoring, exits, recovery) can run with zero risk.
//! Valuations stay flat at the entry amount; the point of a paper session is
//! exercising the machinery, not forecasting P&L.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ports::execution::{
    AddLiquidityOutcome, CloseAccountsOutcome, ExecutionError, ExecutionPort, LpValuation,
    LpValueRequest, SwapDirection, TokenHolding, TxOutcome,
};

const PAPER_LP_RAW: u64 = 1_000_000_000;

#[derive(Default)]
struct PaperState {
    /// SOL committed by the last buy swap, waiting for add_liquidity.
    pending_buys: HashMap<String, f64>,
    /// pool_id -> (lp_mint, simulated entry value in SOL)
    holdings: HashMap<String, (String, f64)>,
}

#[derive(Default)]
pub struct PaperExecution {
    state: Mutex<PaperState>,
}

impl PaperExecution {
    pub fn new() -> Self {
        Self::default()
    }

    fn sig(prefix: &str, pool_id: &str) -> String {
        let short = &pool_id[..pool_id.len().min(8)];
        format!("PAPER_{prefix}_{short}")
    }
}

#[async_trait]
impl ExecutionPort for PaperExecution {
    async fn add_liquidity(
        &self,
        pool_id: &str,
        _slippage_pct: f64,
    ) -> Result<AddLiquidityOutcome, ExecutionError> {
        let mut state = self.state.lock().unwrap();
        // Both halves of the sized amount end up in the pool.
        let committed = state.pending_buys.remove(pool_id).unwrap_or(0.0) * 2.0;
        let lp_mint = format!("PAPERLP{}", &pool_id[..pool_id.len().min(8)]);
        state
            .holdings
            .insert(pool_id.to_string(), (lp_mint.clone(), committed));
        tracing::info!("paper add-liquidity on {pool_id}: {committed:.4} SOL");
        Ok(AddLiquidityOutcome {
            signatures: vec![Self::sig("ADD", pool_id)],
            lp_mint,
        })
    }

    async fn remove_liquidity(
        &self,
        pool_id: &str,
        _slippage_pct: f64,
    ) -> Result<TxOutcome, ExecutionError> {
        self.state.lock().unwrap().holdings.remove(pool_id);
        tracing::info!("paper remove-liquidity on {pool_id}");
        Ok(TxOutcome {
            signatures: vec![Self::sig("REMOVE", pool_id)],
        })
    }

    async fn swap(
        &self,
        pool_id: &str,
        amount_in_sol: f64,
        _slippage_pct: f64,
        direction: SwapDirection,
    ) -> Result<TxOutcome, ExecutionError> {
        if direction == SwapDirection::Buy {
            self.state
                .lock()
                .unwrap()
                .pending_buys
                .insert(pool_id.to_string(), amount_in_sol);
        }
        tracing::info!("paper swap {direction:?} {amount_in_sol:.4} via {pool_id}");
        Ok(TxOutcome {
            signatures: vec![Self::sig("SWAP", pool_id)],
        })
    }

    async fn lp_value(&self, pool_id: &str, _lp_mint: &str) -> Result<LpValuation, ExecutionError> {
        let state = self.state.lock().unwrap();
        Ok(match state.holdings.get(pool_id) {
            Some((_, value)) => LpValuation {
                value_sol: *value,
                price_ratio: 1.0,
                lp_balance_raw: PAPER_LP_RAW,
            },
            None => LpValuation {
                value_sol: 0.0,
                price_ratio: 0.0,
                lp_balance_raw: 0,
            },
        })
    }

    async fn lp_value_batch(
        &self,
        entries: &[LpValueRequest],
    ) -> Result<HashMap<String, LpValuation>, ExecutionError> {
        let mut results = HashMap::new();
        for entry in entries {
            results.insert(
                entry.pool_id.clone(),
                self.lp_value(&entry.pool_id, &entry.lp_mint).await?,
            );
        }
        Ok(results)
    }

    async fn balance(&self, mint: &str) -> Result<u64, ExecutionError> {
        let state = self.state.lock().unwrap();
        let held = state
            .holdings
            .values()
            .any(|(lp_mint, _)| lp_mint == mint);
        Ok(if held { PAPER_LP_RAW } else { 0 })
    }

    async fn list_tokens(&self) -> Result<Vec<TokenHolding>, ExecutionError> {
        Ok(Vec::new())
    }

    async fn close_empty_accounts(
        &self,
        _keep_mints: &[String],
    ) -> Result<CloseAccountsOutcome, ExecutionError> {
        Ok(CloseAccountsOutcome {
            closed: 0,
            reclaimed_sol: 0.0,
        })
    }

    async fn unwrap_native(&self) -> Result<f64, ExecutionError> {
        Ok(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entry_flow_grants_simulated_lp() {
        let paper = PaperExecution::new();
        paper
            .swap("AmmPool1", 0.5, 5.0, SwapDirection::Buy)
            .await
            .unwrap();
        let outcome = paper.add_liquidity("AmmPool1", 5.0).await.unwrap();
        assert!(outcome.lp_mint.starts_with("PAPERLP"));
        assert_eq!(paper.balance(&outcome.lp_mint).await.unwrap(), PAPER_LP_RAW);

        let valuation = paper.lp_value("AmmPool1", &outcome.lp_mint).await.unwrap();
        assert!((valuation.value_sol - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn remove_clears_holding() {
        let paper = PaperExecution::new();
        paper
            .swap("AmmPool1", 0.5, 5.0, SwapDirection::Buy)
            .await
            .unwrap();
        let outcome = paper.add_liquidity("AmmPool1", 5.0).await.unwrap();
        paper.remove_liquidity("AmmPool1", 5.0).await.unwrap();
        assert_eq!(paper.balance(&outcome.lp_mint).await.unwrap(), 0);
        let valuation = paper.lp_value("AmmPool1", &outcome.lp_mint).await.unwrap();
        assert_eq!(valuation.lp_balance_raw, 0);
    }
}
