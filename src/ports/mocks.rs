//! Scripted in-memory ports for tests.
//!
//! Each mock records the calls it receives and serves responses configured
//! up front, so engine behavior can be driven deterministically without any
//! network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::pool::Pool;
use crate::domain::safety::TokenSafetyData;
use crate::ports::chain::{ChainError, ChainQueryPort};
use crate::ports::execution::{
    AddLiquidityOutcome, CloseAccountsOutcome, ExecutionError, ExecutionPort, LpValuation,
    LpValueRequest, SwapDirection, TokenHolding, TxOutcome,
};
use crate::ports::market_data::{
    MarketDataError, PoolDirectoryPort, PriceFeedPort, TokenSafetyPort,
};

/// Scripted execution backend.
#[derive(Default)]
pub struct MockExecution {
    inner: Mutex<MockExecutionState>,
}

#[derive(Default)]
struct MockExecutionState {
    calls: Vec<String>,
    balances: HashMap<String, u64>,
    valuations: HashMap<String, LpValuation>,
    lp_mints: HashMap<String, String>,
    lp_granted_on_add: u64,
    fail_swap: bool,
    fail_add: bool,
    fail_remove: bool,
    unwrap_amount: f64,
}

impl MockExecution {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MockExecutionState {
                lp_granted_on_add: 1_000_000_000,
                ..Default::default()
            }),
        })
    }

    pub fn set_lp_mint(&self, pool_id: &str, lp_mint: &str) {
        self.inner
            .lock()
            .unwrap()
            .lp_mints
            .insert(pool_id.to_string(), lp_mint.to_string());
    }

    pub fn set_valuation(&self, pool_id: &str, valuation: LpValuation) {
        self.inner
            .lock()
            .unwrap()
            .valuations
            .insert(pool_id.to_string(), valuation);
    }

    pub fn set_balance(&self, mint: &str, raw: u64) {
        self.inner
            .lock()
            .unwrap()
            .balances
            .insert(mint.to_string(), raw);
    }

    pub fn set_unwrap_amount(&self, sol: f64) {
        self.inner.lock().unwrap().unwrap_amount = sol;
    }

    pub fn fail_swap(&self, fail: bool) {
        self.inner.lock().unwrap().fail_swap = fail;
    }

    pub fn fail_add(&self, fail: bool) {
        self.inner.lock().unwrap().fail_add = fail;
    }

    pub fn fail_remove(&self, fail: bool) {
        self.inner.lock().unwrap().fail_remove = fail;
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ExecutionPort for MockExecution {
    async fn add_liquidity(
        &self,
        pool_id: &str,
        _slippage_pct: f64,
    ) -> Result<AddLiquidityOutcome, ExecutionError> {
        self.record(format!("add_liquidity:{pool_id}"));
        let mut state = self.inner.lock().unwrap();
        if state.fail_add {
            return Err(ExecutionError::Permanent("scripted add failure".into()));
        }
        let lp_mint = state
            .lp_mints
            .get(pool_id)
            .cloned()
            .unwrap_or_else(|| format!("lp-{pool_id}"));
        let granted = state.lp_granted_on_add;
        state.balances.insert(lp_mint.clone(), granted);
        Ok(AddLiquidityOutcome {
            signatures: vec![format!("sig-add-{pool_id}")],
            lp_mint,
        })
    }

    async fn remove_liquidity(
        &self,
        pool_id: &str,
        _slippage_pct: f64,
    ) -> Result<TxOutcome, ExecutionError> {
        self.record(format!("remove_liquidity:{pool_id}"));
        let mut state = self.inner.lock().unwrap();
        if state.fail_remove {
            return Err(ExecutionError::Transient("scripted remove failure".into()));
        }
        if let Some(lp_mint) = state.lp_mints.get(pool_id).cloned() {
            state.balances.insert(lp_mint, 0);
        }
        Ok(TxOutcome {
            signatures: vec![format!("sig-remove-{pool_id}")],
        })
    }

    async fn swap(
        &self,
        pool_id: &str,
        amount_in_sol: f64,
        _slippage_pct: f64,
        direction: SwapDirection,
    ) -> Result<TxOutcome, ExecutionError> {
        self.record(format!("swap:{pool_id}:{direction:?}:{amount_in_sol}"));
        if self.inner.lock().unwrap().fail_swap {
            return Err(ExecutionError::Transient("scripted swap failure".into()));
        }
        Ok(TxOutcome {
            signatures: vec![format!("sig-swap-{pool_id}")],
        })
    }

    async fn lp_value(&self, pool_id: &str, _lp_mint: &str) -> Result<LpValuation, ExecutionError> {
        self.record(format!("lp_value:{pool_id}"));
        self.inner
            .lock()
            .unwrap()
            .valuations
            .get(pool_id)
            .copied()
            .ok_or_else(|| ExecutionError::Permanent("no valuation scripted".into()))
    }

    async fn lp_value_batch(
        &self,
        entries: &[LpValueRequest],
    ) -> Result<HashMap<String, LpValuation>, ExecutionError> {
        self.record(format!("lp_value_batch:{}", entries.len()));
        let state = self.inner.lock().unwrap();
        Ok(entries
            .iter()
            .filter_map(|e| state.valuations.get(&e.pool_id).map(|v| (e.pool_id.clone(), *v)))
            .collect())
    }

    async fn balance(&self, mint: &str) -> Result<u64, ExecutionError> {
        self.record(format!("balance:{mint}"));
        Ok(self
            .inner
            .lock()
            .unwrap()
            .balances
            .get(mint)
            .copied()
            .unwrap_or(0))
    }

    async fn list_tokens(&self) -> Result<Vec<TokenHolding>, ExecutionError> {
        self.record("list_tokens".to_string());
        Ok(self
            .inner
            .lock()
            .unwrap()
            .balances
            .iter()
            .filter(|(_, raw)| **raw > 0)
            .map(|(mint, raw)| TokenHolding {
                mint: mint.clone(),
                balance_raw: *raw,
            })
            .collect())
    }

    async fn close_empty_accounts(
        &self,
        keep_mints: &[String],
    ) -> Result<CloseAccountsOutcome, ExecutionError> {
        self.record(format!("close_empty_accounts:{}", keep_mints.len()));
        let state = self.inner.lock().unwrap();
        let closed = state.balances.values().filter(|raw| **raw == 0).count() as u32;
        Ok(CloseAccountsOutcome {
            closed,
            reclaimed_sol: closed as f64 * 0.002,
        })
    }

    async fn unwrap_native(&self) -> Result<f64, ExecutionError> {
        self.record("unwrap_native".to_string());
        let mut state = self.inner.lock().unwrap();
        let amount = state.unwrap_amount;
        state.unwrap_amount = 0.0;
        Ok(amount)
    }
}

/// Scripted pool directory.
#[derive(Default)]
pub struct MockDirectory {
    pools: Mutex<Vec<Pool>>,
}

impl MockDirectory {
    pub fn new(pools: Vec<Pool>) -> Arc<Self> {
        Arc::new(Self {
            pools: Mutex::new(pools),
        })
    }

    pub fn set_pools(&self, pools: Vec<Pool>) {
        *self.pools.lock().unwrap() = pools;
    }
}

#[async_trait]
impl PoolDirectoryPort for MockDirectory {
    async fn list_wsol_pools(&self) -> Result<Vec<Pool>, MarketDataError> {
        Ok(self.pools.lock().unwrap().clone())
    }

    async fn pool_by_id(&self, pool_id: &str) -> Result<Option<Pool>, MarketDataError> {
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.pool_id == pool_id)
            .cloned())
    }

    async fn wsol_pool_for_mint(&self, mint: &str) -> Result<Option<Pool>, MarketDataError> {
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.risked_mint() == Some(mint))
            .cloned())
    }

    async fn pools_for_lp_mints(
        &self,
        lp_mints: &[String],
    ) -> Result<Vec<Pool>, MarketDataError> {
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .filter(|p| lp_mints.contains(&p.lp_mint))
            .cloned()
            .collect())
    }
}

/// Scripted token-safety service.
#[derive(Default)]
pub struct MockTokenSafety {
    reports: Mutex<HashMap<String, TokenSafetyData>>,
}

impl MockTokenSafety {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_report(&self, mint: &str, report: TokenSafetyData) {
        self.reports
            .lock()
            .unwrap()
            .insert(mint.to_string(), report);
    }
}

#[async_trait]
impl TokenSafetyPort for MockTokenSafety {
    async fn token_report(
        &self,
        mint: &str,
    ) -> Result<Option<TokenSafetyData>, MarketDataError> {
        Ok(self.reports.lock().unwrap().get(mint).cloned())
    }
}

/// Scripted chain queries for LP-lock analysis.
#[derive(Default)]
pub struct MockChainQuery {
    pub lamports: Mutex<u64>,
    pub supplies: Mutex<HashMap<String, u64>>,
    pub holders: Mutex<HashMap<String, Vec<(String, u64)>>>,
    pub authorities: Mutex<HashMap<String, String>>,
    pub owners: Mutex<HashMap<String, String>>,
}

impl MockChainQuery {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_supply(&self, mint: &str, supply: u64) {
        self.supplies
            .lock()
            .unwrap()
            .insert(mint.to_string(), supply);
    }

    pub fn set_holders(&self, mint: &str, holders: Vec<(String, u64)>) {
        self.holders.lock().unwrap().insert(mint.to_string(), holders);
    }

    pub fn set_lamports(&self, lamports: u64) {
        *self.lamports.lock().unwrap() = lamports;
    }

    pub fn set_authority(&self, account: &str, authority: &str) {
        self.authorities
            .lock()
            .unwrap()
            .insert(account.to_string(), authority.to_string());
    }
}

#[async_trait]
impl ChainQueryPort for MockChainQuery {
    async fn native_balance(&self, _address: &str) -> Result<u64, ChainError> {
        Ok(*self.lamports.lock().unwrap())
    }

    async fn token_supply(&self, mint: &str) -> Result<u64, ChainError> {
        Ok(self.supplies.lock().unwrap().get(mint).copied().unwrap_or(0))
    }

    async fn largest_token_accounts(
        &self,
        mint: &str,
    ) -> Result<Vec<(String, u64)>, ChainError> {
        Ok(self
            .holders
            .lock()
            .unwrap()
            .get(mint)
            .cloned()
            .unwrap_or_default())
    }

    async fn account_authorities(
        &self,
        accounts: &[String],
    ) -> Result<HashMap<String, String>, ChainError> {
        let map = self.authorities.lock().unwrap();
        Ok(accounts
            .iter()
            .filter_map(|a| map.get(a).map(|v| (a.clone(), v.clone())))
            .collect())
    }

    async fn account_owners(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, String>, ChainError> {
        let map = self.owners.lock().unwrap();
        Ok(addresses
            .iter()
            .filter_map(|a| map.get(a).map(|v| (a.clone(), v.clone())))
            .collect())
    }
}

/// Fixed fiat price.
pub struct MockPriceFeed(pub f64);

#[async_trait]
impl PriceFeedPort for MockPriceFeed {
    async fn sol_price_usd(&self) -> f64 {
        self.0
    }
}
