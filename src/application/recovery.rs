//! Startup reconciliation.
//!
//! Runs synchronously before any worker starts, against the state already
//! restored from disk: unwrap wrapped-native dust, close ghost positions
//! whose LP vanished on-chain, recover orphan LP tokens left by previous
//! runs, sell stranded non-SOL tokens back, and close empty token accounts.
//! Finally the operator is asked whether to keep tracking the restored
//! positions or close them now.

use std::io::IsTerminal;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::pool::WSOL_MINT;
use crate::domain::position::{ExitReason, Position};
use crate::ports::execution::{LpValueRequest, SwapDirection};

use super::engine::EngineInner;

/// Wrapped-native dust below this is not worth a transaction.
const UNWRAP_THRESHOLD_LAMPORTS: u64 = 1_000_000;

#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub unwrapped_sol: f64,
    pub ghosts_closed: usize,
    pub orphan_lps_recovered: usize,
    pub tokens_swept: usize,
    pub accounts_closed: u32,
}

/// Run the full reconciliation pass. `interactive` enables the operator
/// prompt for restored positions (disabled for the `recover` subcommand and
/// non-TTY sessions).
pub async fn run_recovery(
    engine: &Arc<EngineInner>,
    interactive: bool,
) -> anyhow::Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    if engine.config.trading.dry_run {
        tracing::info!("dry run: skipping on-chain recovery");
        if interactive {
            prompt_restored_positions(engine).await?;
        }
        return Ok(report);
    }

    // 1. Unwrap wrapped-native dust back to native.
    match engine.execution.balance(WSOL_MINT).await {
        Ok(raw) if raw > UNWRAP_THRESHOLD_LAMPORTS => {
            match engine.execution.unwrap_native().await {
                Ok(amount) if amount > 0.0 => {
                    tracing::info!("unwrapped {amount:.4} wrapped SOL");
                    report.unwrapped_sol = amount;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("unwrap failed: {e}"),
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("could not read wrapped balance: {e}"),
    }

    // 2. Ghost-check every restored position in one batch.
    report.ghosts_closed = close_ghosts(engine).await;

    // 3. Recover orphan LP tokens from previous runs.
    report.orphan_lps_recovered = recover_orphan_lps(engine).await;

    // 4. Sell stranded non-SOL tokens (from failed exit swaps).
    report.tokens_swept = sweep_leftover_tokens(engine).await;

    // 5. Close empty token accounts, keeping held mints.
    let keep: Vec<String> =
        engine.with_state(|s| s.open_positions().map(|p| p.lp_mint.clone()).collect());
    match engine.execution.close_empty_accounts(&keep).await {
        Ok(outcome) if outcome.closed > 0 => {
            tracing::info!(
                "closed {} empty token account(s), reclaimed ~{:.4} SOL rent",
                outcome.closed,
                outcome.reclaimed_sol
            );
            report.accounts_closed = outcome.closed;
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("account cleanup failed: {e}"),
    }

    engine.persist();

    // 6. Let the operator decide what happens to restored positions.
    if interactive {
        prompt_restored_positions(engine).await?;
    }
    Ok(report)
}

/// Close every restored position whose on-chain LP balance reads zero.
async fn close_ghosts(engine: &Arc<EngineInner>) -> usize {
    let requests: Vec<LpValueRequest> = engine.with_state(|s| {
        s.open_positions()
            .map(|p| LpValueRequest {
                pool_id: p.pool_id.clone(),
                lp_mint: p.lp_mint.clone(),
            })
            .collect()
    });
    if requests.is_empty() {
        return 0;
    }

    let valuations = match engine.execution.lp_value_batch(&requests).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("could not value restored positions: {e}");
            return 0;
        }
    };

    let mut ghosts: Vec<Position> = Vec::new();
    engine.with_state(|state| {
        for request in &requests {
            let gone = valuations
                .get(&request.pool_id)
                .map(|v| v.lp_balance_raw == 0)
                .unwrap_or(false);
            if gone {
                if let Ok(position) = state.take(&request.pool_id) {
                    ghosts.push(position);
                }
            }
        }
    });
    if ghosts.is_empty() {
        return 0;
    }

    tracing::warn!("{} ghost position(s) found (LP=0 on-chain)", ghosts.len());
    let sol_price = engine.price.sol_price_usd().await;
    let now = Utc::now();
    let policy = engine.config.cooldown_policy();
    let count = ghosts.len();
    for position in ghosts {
        let pool_id = position.pool_id.clone();
        tracing::info!("closing ghost: {}", position.pool_name);
        // Whatever token dust the rug left behind still gets swept in step 4.
        let trade = position.into_closed(ExitReason::Ghost, 0.0, sol_price, now);
        if let Err(e) = engine.store.append_trade(&trade) {
            tracing::error!("could not record ghost close: {e}");
        }
        engine.with_state(|state| {
            state
                .penalties
                .record_exit(&pool_id, ExitReason::Ghost, &policy, now);
            state.snapshots.clear_pool(&pool_id);
        });
    }
    engine.persist();
    count
}

/// Remove-liquidity and sell back any LP tokens in the wallet that do not
/// belong to a tracked position.
async fn recover_orphan_lps(engine: &Arc<EngineInner>) -> usize {
    let holdings = match engine.execution.list_tokens().await {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!("could not list wallet tokens: {e}");
            return 0;
        }
    };
    let known_lp: std::collections::HashSet<String> =
        engine.with_state(|s| s.open_positions().map(|p| p.lp_mint.clone()).collect());

    let candidates: Vec<String> = holdings
        .iter()
        .filter(|t| t.balance_raw > 0 && t.mint != WSOL_MINT && !known_lp.contains(&t.mint))
        .map(|t| t.mint.clone())
        .collect();
    if candidates.is_empty() {
        return 0;
    }

    let orphan_pools = match engine.directory.pools_for_lp_mints(&candidates).await {
        Ok(pools) => pools,
        Err(e) => {
            tracing::warn!("LP mint lookup failed: {e}");
            return 0;
        }
    };
    if orphan_pools.is_empty() {
        return 0;
    }

    tracing::info!("recovering {} orphan LP position(s)", orphan_pools.len());
    let slippage = engine.config.trading.slippage_pct;
    let mut recovered = 0;
    for pool in orphan_pools {
        match engine.execution.remove_liquidity(&pool.pool_id, slippage).await {
            Ok(_) => {
                if engine
                    .execution
                    .swap(&pool.pool_id, 0.0, slippage, SwapDirection::Sell)
                    .await
                    .is_err()
                {
                    tracing::warn!(
                        "could not sell {} after removing liquidity; the token sweep will retry",
                        pool.name
                    );
                }
                if let Err(e) = engine.execution.unwrap_native().await {
                    tracing::debug!("unwrap after recovery failed: {e}");
                }
                tracing::info!("recovered {}", pool.name);
                recovered += 1;
            }
            Err(e) => tracing::warn!("could not recover {}: {e}", pool.name),
        }
    }
    recovered
}

/// Sell any remaining non-SOL tokens through their deepest WSOL pool.
async fn sweep_leftover_tokens(engine: &Arc<EngineInner>) -> usize {
    let holdings = match engine.execution.list_tokens().await {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!("could not list wallet tokens: {e}");
            return 0;
        }
    };
    let keep: std::collections::HashSet<String> =
        engine.with_state(|s| s.open_positions().map(|p| p.lp_mint.clone()).collect());

    let mut swept = 0;
    for holding in holdings {
        if holding.balance_raw == 0
            || holding.mint == WSOL_MINT
            || keep.contains(&holding.mint)
        {
            continue;
        }
        let pool = match engine.directory.wsol_pool_for_mint(&holding.mint).await {
            Ok(Some(pool)) => pool,
            Ok(None) => {
                tracing::warn!("no WSOL pool found for leftover token {}", holding.mint);
                continue;
            }
            Err(e) => {
                tracing::warn!("pool lookup failed for {}: {e}", holding.mint);
                continue;
            }
        };
        match engine
            .execution
            .swap(
                &pool.pool_id,
                0.0,
                engine.config.trading.slippage_pct,
                SwapDirection::Sell,
            )
            .await
        {
            Ok(_) => {
                tracing::info!("sold leftover {} tokens back to SOL", pool.name);
                swept += 1;
            }
            Err(e) => tracing::warn!("could not sell leftover {}: {e}", pool.name),
        }
    }
    swept
}

/// Show restored positions and ask the operator: continue tracking, close
/// specific ones, or close all. Skipped when stdin is not a terminal.
async fn prompt_restored_positions(engine: &Arc<EngineInner>) -> anyhow::Result<()> {
    let positions: Vec<Position> =
        engine.with_state(|s| s.open_positions().cloned().collect());
    if positions.is_empty() {
        return Ok(());
    }
    if !std::io::stdin().is_terminal() {
        tracing::info!(
            "continuing with {} restored position(s) (non-interactive session)",
            positions.len()
        );
        return Ok(());
    }

    let sol_price = engine.price.sol_price_usd().await;
    let now = Utc::now();
    println!("\n{}", "═".repeat(60));
    println!("  restored positions ({})", positions.len());
    if sol_price > 0.0 {
        println!("  SOL price: ${sol_price:.2}");
    }
    println!("{}", "═".repeat(60));
    for (i, p) in positions.iter().enumerate() {
        println!(
            "  #{}: {}  entry {:.4} SOL  value {:.4} SOL ({:+.2}%)  held {:.1}h",
            i + 1,
            p.pool_name,
            p.entry_amount_sol,
            p.last_value_sol,
            p.last_pnl_pct,
            p.hold_hours(now)
        );
    }
    println!("\n  [Enter]   continue with these positions");
    println!("  [1 2 ..]  close specific position(s) by number");
    println!("  [all]     close ALL positions");
    print!("  > ");
    use std::io::Write;
    std::io::stdout().flush()?;

    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;
    let answer = answer.trim().to_lowercase();

    if answer.is_empty() {
        println!("  continuing with {} position(s)\n", positions.len());
        return Ok(());
    }

    let to_close: Vec<&Position> = if answer == "all" {
        positions.iter().collect()
    } else {
        answer
            .replace(',', " ")
            .split_whitespace()
            .filter_map(|part| part.parse::<usize>().ok())
            .filter_map(|n| positions.get(n.checked_sub(1)?))
            .collect()
    };
    if to_close.is_empty() {
        println!("  nothing selected; continuing\n");
        return Ok(());
    }

    println!("  closing {} position(s)...", to_close.len());
    for position in to_close {
        let taken = engine.with_state(|s| s.take(&position.pool_id));
        match taken {
            Ok(position) => {
                Arc::clone(engine)
                    .execute_exit(position, ExitReason::Manual)
                    .await;
            }
            Err(e) => tracing::error!("could not close {}: {e}", position.pool_name),
        }
    }
    if let Err(e) = engine.execution.unwrap_native().await {
        tracing::debug!("unwrap after manual close failed: {e}");
    }
    engine.refresh_balance(true).await;
    Ok(())
}
