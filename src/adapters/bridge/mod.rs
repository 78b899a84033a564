//! Execution backend over a sidecar process.
//!
//! The AMM transaction library lives in a separate executable that speaks
//! JSON over stdout: one process per call, reaped on completion or timeout.
//! The sidecar reads on-chain balances itself at call time, builds, signs,
//! submits, and confirms before printing its result, so the engine never
//! hands it an amount it could get wrong.
//!
//! Valuations are NOT computed by the sidecar: it returns the raw pool
//! accounting (vaults, open-orders totals, pnl offsets, the AMM's internal
//! LP counter) as strings, and this adapter runs the reserve math through
//! [`crate::domain::math`] so every integer survives intact. JavaScript-side
//! arithmetic would squeeze 64-bit amounts through a 53-bit mantissa.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::config::loader::BridgeSection;
use crate::domain::math::PoolReserves;
use crate::ports::execution::{
    AddLiquidityOutcome, CloseAccountsOutcome, ExecutionError, ExecutionPort, LpValuation,
    LpValueRequest, SwapDirection, TokenHolding, TxOutcome,
};

pub struct BridgeExecution {
    command: String,
    base_args: Vec<String>,
    timeout: Duration,
    max_retries: u32,
    trading_enabled: bool,
}

impl BridgeExecution {
    pub fn new(section: &BridgeSection, timeout_sec: u64, trading_enabled: bool) -> Self {
        Self {
            command: section.command.clone(),
            base_args: section.args.clone(),
            timeout: Duration::from_secs(timeout_sec),
            max_retries: section.max_retries.max(1),
            trading_enabled,
        }
    }

    /// Run the sidecar once and parse the last stdout line as JSON.
    async fn call_once(&self, args: &[&str]) -> Result<Value, ExecutionError> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.base_args)
            .args(args)
            .kill_on_drop(true)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| ExecutionError::Transient(format!("failed to spawn backend: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecutionError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| ExecutionError::Transient(format!("backend io error: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let last_line = stdout.lines().rev().find(|l| !l.trim().is_empty());
        let parsed: Option<Value> = last_line.and_then(|l| serde_json::from_str(l).ok());

        match parsed {
            Some(value) if value.get("success").and_then(Value::as_bool) == Some(true) => Ok(value),
            Some(value) => Err(classify_failure(&value)),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if output.status.success() {
                    Err(ExecutionError::Permanent(
                        "backend produced no JSON response".to_string(),
                    ))
                } else {
                    Err(ExecutionError::Transient(format!(
                        "backend exited with {}: {}",
                        output.status,
                        stderr.trim()
                    )))
                }
            }
        }
    }

    /// Retry transient failures with exponential backoff. Permanent and
    /// on-chain failures surface immediately; a retry against already
    /// committed state is how capital gets moved twice.
    async fn call(&self, args: &[&str]) -> Result<Value, ExecutionError> {
        let mut backoff = Duration::from_secs(1);
        let mut last_err = None;
        for attempt in 1..=self.max_retries {
            match self.call_once(args).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    tracing::warn!(
                        "backend call {:?} failed (attempt {attempt}/{}): {e}",
                        args.first(),
                        self.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| ExecutionError::Transient("retries exhausted".into())))
    }

    fn guard_trading(&self) -> Result<(), ExecutionError> {
        if self.trading_enabled {
            Ok(())
        } else {
            Err(ExecutionError::Disabled)
        }
    }
}

fn classify_failure(value: &Value) -> ExecutionError {
    let message = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown backend error")
        .to_string();
    let signatures = string_list(value.get("signatures"));
    if !signatures.is_empty() {
        // The transaction made it on chain and failed there.
        return ExecutionError::Exec {
            message,
            signatures,
            logs: string_list(value.get("logs")),
        };
    }
    let lowered = message.to_lowercase();
    let transient = ["429", "rate limit", "timeout", "timed out", "connection", "blockhash"]
        .iter()
        .any(|marker| lowered.contains(marker));
    if transient {
        ExecutionError::Transient(message)
    } else {
        ExecutionError::Permanent(message)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Read a numeric field that the sidecar may serialize as number or string.
fn field_u64(value: &Value, key: &str) -> u64 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn field_f64(value: &Value, key: &str) -> f64 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Build a valuation from the sidecar's raw pool accounting.
///
/// All amount fields arrive as strings (the sidecar never runs them through
/// its own number type); the reserve math happens here in wide integers.
fn valuation_from(value: &Value) -> LpValuation {
    let reserves = PoolReserves {
        base_vault: field_u64(value, "baseVault"),
        quote_vault: field_u64(value, "quoteVault"),
        base_open_orders: field_u64(value, "baseOpenOrders"),
        quote_open_orders: field_u64(value, "quoteOpenOrders"),
        base_need_take_pnl: field_u64(value, "baseNeedTakePnl"),
        quote_need_take_pnl: field_u64(value, "quoteNeedTakePnl"),
        lp_circulating: field_u64(value, "lpCirculating"),
        base_decimals: field_u64(value, "baseDecimals") as u8,
        quote_decimals: field_u64(value, "quoteDecimals") as u8,
    };
    let base_is_wsol = value
        .get("baseIsWsol")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let lp_balance_raw = field_u64(value, "lpBalance");
    LpValuation {
        value_sol: reserves.lp_value_sol(lp_balance_raw, base_is_wsol),
        price_ratio: reserves.price_ratio(),
        lp_balance_raw,
    }
}

#[async_trait]
impl ExecutionPort for BridgeExecution {
    async fn add_liquidity(
        &self,
        pool_id: &str,
        slippage_pct: f64,
    ) -> Result<AddLiquidityOutcome, ExecutionError> {
        self.guard_trading()?;
        let slippage = slippage_pct.to_string();
        let value = self.call(&["add", pool_id, &slippage]).await?;
        Ok(AddLiquidityOutcome {
            signatures: string_list(value.get("signatures")),
            lp_mint: value
                .get("lpMint")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    async fn remove_liquidity(
        &self,
        pool_id: &str,
        slippage_pct: f64,
    ) -> Result<TxOutcome, ExecutionError> {
        self.guard_trading()?;
        let slippage = slippage_pct.to_string();
        let value = self.call(&["remove", pool_id, &slippage]).await?;
        Ok(TxOutcome {
            signatures: string_list(value.get("signatures")),
        })
    }

    async fn swap(
        &self,
        pool_id: &str,
        amount_in_sol: f64,
        slippage_pct: f64,
        direction: SwapDirection,
    ) -> Result<TxOutcome, ExecutionError> {
        self.guard_trading()?;
        let amount = amount_in_sol.to_string();
        let slippage = slippage_pct.to_string();
        let dir = match direction {
            SwapDirection::Buy => "buy",
            SwapDirection::Sell => "sell",
        };
        let value = self.call(&["swap", pool_id, &amount, &slippage, dir]).await?;
        Ok(TxOutcome {
            signatures: string_list(value.get("signatures")),
        })
    }

    async fn lp_value(&self, pool_id: &str, lp_mint: &str) -> Result<LpValuation, ExecutionError> {
        let value = self.call(&["lpvalue", pool_id, lp_mint]).await?;
        Ok(valuation_from(&value))
    }

    async fn lp_value_batch(
        &self,
        entries: &[LpValueRequest],
    ) -> Result<HashMap<String, LpValuation>, ExecutionError> {
        if entries.is_empty() {
            return Ok(HashMap::new());
        }
        let payload = serde_json::to_string(
            &entries
                .iter()
                .map(|e| {
                    serde_json::json!({"poolId": e.pool_id, "lpMint": e.lp_mint})
                })
                .collect::<Vec<_>>(),
        )
        .map_err(|e| ExecutionError::Permanent(e.to_string()))?;
        let value = self.call(&["batchlpvalue", &payload]).await?;
        let results = value
            .get("results")
            .and_then(Value::as_object)
            .ok_or_else(|| ExecutionError::Permanent("batch response missing results".into()))?;
        Ok(results
            .iter()
            .map(|(pool_id, entry)| (pool_id.clone(), valuation_from(entry)))
            .collect())
    }

    async fn balance(&self, mint: &str) -> Result<u64, ExecutionError> {
        let value = self.call(&["balance", mint]).await?;
        Ok(field_u64(&value, "balance"))
    }

    async fn list_tokens(&self) -> Result<Vec<TokenHolding>, ExecutionError> {
        let value = self.call(&["listtokens"]).await?;
        Ok(value
            .get("tokens")
            .and_then(Value::as_array)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(|t| {
                        let mint = t.get("mint")?.as_str()?.to_string();
                        let balance_raw = field_u64(t, "balance");
                        Some(TokenHolding { mint, balance_raw })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn close_empty_accounts(
        &self,
        keep_mints: &[String],
    ) -> Result<CloseAccountsOutcome, ExecutionError> {
        self.guard_trading()?;
        let keep = keep_mints.join(",");
        let value = if keep.is_empty() {
            self.call(&["closeaccounts"]).await?
        } else {
            self.call(&["closeaccounts", &keep]).await?
        };
        Ok(CloseAccountsOutcome {
            closed: field_u64(&value, "closed") as u32,
            reclaimed_sol: field_f64(&value, "reclaimedSol"),
        })
    }

    async fn unwrap_native(&self) -> Result<f64, ExecutionError> {
        self.guard_trading()?;
        let value = self.call(&["unwrap"]).await?;
        Ok(field_f64(&value, "unwrapped"))
    }
}
