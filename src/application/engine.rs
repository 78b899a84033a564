//! The position-management engine.
//!
//! Four cooperating workers over one mutex-guarded state value:
//!
//! - display: renders a status snapshot; never touches the backend
//! - position-update: batch-values all open positions, updates metrics,
//!   evaluates exits, fans confirmed exits out to parallel sells
//! - pool-scan: discovery -> safety screen -> scoring -> entry queue
//! - entry worker: drains the entry queue strictly one at a time, because
//!   concurrent entries compete for the same wallet reserve
//!
//! Every backend and HTTP call happens with the lock released. A stop signal
//! lets each worker finish its current iteration; open positions stay open
//! on-chain and are picked up again on the next run.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::Config;
use crate::domain::exit::{self, ExitDecision};
use crate::domain::pool::Pool;
use crate::domain::position::{ExitReason, Position};
use crate::domain::safety::SafetyScreen;
use crate::domain::score::{self, Score};
use crate::domain::state::{AppState, StateError, StateStore};
use crate::ports::chain::ChainQueryPort;
use crate::ports::execution::{
    ExecutionError, ExecutionPort, LpValueRequest, SwapDirection,
};
use crate::ports::market_data::{PoolDirectoryPort, PriceFeedPort, TokenSafetyPort};

use super::display;

/// Ranked pools below this score never enter.
const MIN_ENTRY_SCORE: f64 = 50.0;
/// Entry queue depth; scans beyond this wait for the worker to catch up.
const ENTRY_QUEUE_CAP: usize = 8;
/// Wallet balance reads are throttled to this unless forced.
const BALANCE_REFRESH_SEC: u64 = 60;
/// Delays before re-polling the LP balance after an add-liquidity.
const LP_POLL_DELAYS_SEC: [u64; 3] = [2, 3, 5];
/// Delays between sell-swap attempts during an exit.
const SELL_RETRY_DELAYS_SEC: [u64; 3] = [0, 3, 5];

struct EntryOrder {
    pool: Pool,
    score: Score,
}

#[derive(Default)]
struct BalanceCache {
    sol: f64,
    refreshed_at: Option<Instant>,
}

/// Everything the workers share.
pub struct EngineInner {
    pub config: Config,
    pub state: Mutex<AppState>,
    pub store: StateStore,
    pub execution: Arc<dyn ExecutionPort>,
    pub directory: Arc<dyn PoolDirectoryPort>,
    pub chain: Arc<dyn ChainQueryPort>,
    pub price: Arc<dyn PriceFeedPort>,
    pub safety: SafetyScreen,
    pub wallet_address: String,
    entry_tx: mpsc::Sender<EntryOrder>,
    /// Pools currently sitting in the entry queue.
    queued: Mutex<HashSet<String>>,
    /// Pools whose entry failed this scan cycle; cleared on the next scan.
    failed: Mutex<HashSet<String>>,
    balance: Mutex<BalanceCache>,
    stop_tx: watch::Sender<bool>,
}

pub struct Engine {
    inner: Arc<EngineInner>,
    entry_rx: mpsc::Receiver<EntryOrder>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        state: AppState,
        store: StateStore,
        execution: Arc<dyn ExecutionPort>,
        directory: Arc<dyn PoolDirectoryPort>,
        token_safety: Arc<dyn TokenSafetyPort>,
        chain: Arc<dyn ChainQueryPort>,
        price: Arc<dyn PriceFeedPort>,
        wallet_address: String,
    ) -> Self {
        let (entry_tx, entry_rx) = mpsc::channel(ENTRY_QUEUE_CAP);
        let (stop_tx, _) = watch::channel(false);
        let safety = SafetyScreen::new(config.safety_policy(), Arc::clone(&chain), token_safety);
        let inner = Arc::new(EngineInner {
            config,
            state: Mutex::new(state),
            store,
            execution,
            directory,
            chain,
            price,
            safety,
            wallet_address,
            entry_tx,
            queued: Mutex::new(HashSet::new()),
            failed: Mutex::new(HashSet::new()),
            balance: Mutex::new(BalanceCache::default()),
            stop_tx,
        });
        Self { inner, entry_rx }
    }

    pub fn inner(&self) -> Arc<EngineInner> {
        Arc::clone(&self.inner)
    }

    /// Request a graceful stop. Each worker finishes its current iteration.
    pub fn stop_handle(&self) -> watch::Sender<bool> {
        self.inner.stop_tx.clone()
    }

    /// Spawn the four workers and run until the stop flag is raised.
    pub async fn run(self) -> anyhow::Result<()> {
        let Engine { inner, entry_rx } = self;
        inner.refresh_balance(true).await;

        let mut workers = JoinSet::new();
        workers.spawn(EngineInner::display_loop(
            Arc::clone(&inner),
            inner.stop_tx.subscribe(),
        ));
        workers.spawn(EngineInner::position_loop(
            Arc::clone(&inner),
            inner.stop_tx.subscribe(),
        ));
        workers.spawn(EngineInner::scan_loop(
            Arc::clone(&inner),
            inner.stop_tx.subscribe(),
        ));
        workers.spawn(EngineInner::entry_loop(
            Arc::clone(&inner),
            entry_rx,
            inner.stop_tx.subscribe(),
        ));

        // SIGINT raises the stop flag; workers honor it at their next
        // iteration boundary. In-flight backend calls run to confirmation.
        let stop_tx = inner.stop_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                let _ = stop_tx.send(true);
            }
        });

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!("worker task panicked: {e}");
            }
        }

        inner.persist();
        let open = inner.with_state(|s| s.open_count());
        if open > 0 {
            tracing::info!(
                "state saved with {open} open position(s); they remain open on-chain and resume next run"
            );
        } else {
            tracing::info!("state saved");
        }
        Ok(())
    }
}

impl EngineInner {
    pub fn with_state<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut state = self.state.lock().expect("state mutex poisoned");
        f(&mut state)
    }

    /// Snapshot the state to disk; failures are logged, never fatal.
    pub fn persist(&self) {
        let result = {
            let state = self.state.lock().expect("state mutex poisoned");
            self.store.snapshot(&state)
        };
        if let Err(e) = result {
            tracing::error!("could not persist state: {e}");
        }
    }

    /// A duplicate open position means the uniqueness invariant broke.
    /// Persist what we have and exit non-zero; continuing would let two
    /// workers fight over one pool.
    fn fatal_invariant(&self, err: &StateError) -> ! {
        tracing::error!("invariant violation: {err}; persisting state and aborting");
        self.persist();
        std::process::exit(2);
    }

    /// Wallet balance in SOL, throttled to one read per minute unless forced
    /// (entry and exit paths force it).
    pub async fn refresh_balance(&self, force: bool) -> f64 {
        if self.config.trading.dry_run {
            let mut cache = self.balance.lock().unwrap();
            if cache.refreshed_at.is_none() {
                cache.sol = 1.0;
                cache.refreshed_at = Some(Instant::now());
                tracing::info!("dry run: simulated wallet balance {:.4} SOL", cache.sol);
            }
            return cache.sol;
        }

        {
            let cache = self.balance.lock().unwrap();
            if !force {
                if let Some(at) = cache.refreshed_at {
                    if at.elapsed() < std::time::Duration::from_secs(BALANCE_REFRESH_SEC) {
                        return cache.sol;
                    }
                }
            }
        }

        match self.chain.native_balance(&self.wallet_address).await {
            Ok(lamports) => {
                let sol = lamports as f64 / 1e9;
                let mut cache = self.balance.lock().unwrap();
                if (sol - cache.sol).abs() > 0.0001 {
                    tracing::info!("wallet balance: {sol:.4} SOL");
                }
                cache.sol = sol;
                cache.refreshed_at = Some(Instant::now());
                sol
            }
            Err(e) => {
                tracing::warn!("balance refresh failed: {e}");
                self.balance.lock().unwrap().sol
            }
        }
    }

    pub fn cached_balance(&self) -> f64 {
        self.balance.lock().unwrap().sol
    }

    // ── workers ─────────────────────────────────────────────────────

    async fn display_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(self.config.scheduler.display_sec));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *stop.borrow() {
                        break;
                    }
                    self.display_tick().await;
                }
                _ = stop.changed() => break,
            }
        }
    }

    async fn position_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(self.config.scheduler.position_check_sec));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *stop.borrow() {
                        break;
                    }
                    if let Err(e) = Arc::clone(&self).position_tick().await {
                        tracing::error!("position check error: {e}");
                    }
                }
                _ = stop.changed() => break,
            }
        }
    }

    async fn scan_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(self.config.scheduler.pool_scan_sec));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *stop.borrow() {
                        break;
                    }
                    if let Err(e) = self.scan_tick().await {
                        tracing::error!("pool scan error: {e}");
                    }
                }
                _ = stop.changed() => break,
            }
        }
    }

    async fn entry_loop(
        self: Arc<Self>,
        mut entry_rx: mpsc::Receiver<EntryOrder>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                order = entry_rx.recv() => {
                    let Some(order) = order else { break };
                    if *stop.borrow() {
                        break;
                    }
                    let EntryOrder { pool, score } = order;
                    let pool_id = pool.pool_id.clone();
                    if let Err(e) = self.execute_entry(pool, score).await {
                        tracing::error!("entry failed for {pool_id}: {e}");
                        self.failed.lock().unwrap().insert(pool_id.clone());
                    }
                    self.queued.lock().unwrap().remove(&pool_id);
                }
                _ = stop.changed() => break,
            }
        }
    }

    // ── display ─────────────────────────────────────────────────────

    async fn display_tick(&self) {
        self.refresh_balance(false).await;
        let sol_price = self.price.sol_price_usd().await;
        let snapshot = self.with_state(|state| display::Snapshot::capture(state, &self.config));
        display::render(&snapshot, self.cached_balance(), sol_price, &self.config);
    }

    // ── position updates and exits ──────────────────────────────────

    /// One position-update cycle: batch valuation, metric refresh, exit
    /// evaluation, parallel sells. Public so tests can drive single cycles.
    pub async fn position_tick(self: Arc<Self>) -> anyhow::Result<()> {
        let requests: Vec<LpValueRequest> = self.with_state(|state| {
            state
                .open_positions()
                .map(|p| LpValueRequest {
                    pool_id: p.pool_id.clone(),
                    lp_mint: p.lp_mint.clone(),
                })
                .collect()
        });
        if requests.is_empty() {
            return Ok(());
        }

        // One batched backend call for every open position, lock released.
        let valuations = match self.execution.lp_value_batch(&requests).await {
            Ok(v) => v,
            Err(e) if e.is_transient() => {
                tracing::warn!("batch valuation unavailable this tick: {e}");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let policy = self.config.exit_policy();
        let mut exits: Vec<(Position, ExitReason)> = Vec::new();

        self.with_state(|state| {
            let pool_ids: Vec<String> =
                state.open_positions().map(|p| p.pool_id.clone()).collect();
            for pool_id in pool_ids {
                let valuation = valuations.get(&pool_id);
                let decision = match state.position_mut(&pool_id) {
                    Some(position) => {
                        if let Some(v) = valuation {
                            if v.lp_balance_raw > 0 {
                                position.update_metrics(v.value_sol, v.price_ratio, now);
                            }
                        }
                        exit::evaluate(
                            position,
                            valuation.map(|v| v.lp_balance_raw),
                            &policy,
                            now,
                        )
                    }
                    None => continue,
                };
                if let ExitDecision::Exit(reason) = decision {
                    // Out of the open set before the sell is dispatched: no
                    // other worker may observe it as open from here.
                    match state.take(&pool_id) {
                        Ok(position) => {
                            tracing::warn!(
                                "exit trigger on {}: {reason} (pnl {:+.2}%, il {:+.2}%)",
                                position.pool_name,
                                position.last_pnl_pct,
                                position.last_il_pct
                            );
                            exits.push((position, reason));
                        }
                        Err(e) => tracing::error!("exit bookkeeping error: {e}"),
                    }
                }
            }
        });

        if exits.is_empty() {
            return Ok(());
        }
        self.persist();

        // Independent positions cannot fail each other; sell in parallel.
        if exits.len() > 1 {
            tracing::info!("executing {} exits in parallel", exits.len());
        }
        let mut sells = JoinSet::new();
        for (position, reason) in exits {
            let engine = Arc::clone(&self);
            sells.spawn(async move { engine.execute_exit(position, reason).await });
        }
        while let Some(result) = sells.join_next().await {
            if let Err(e) = result {
                tracing::error!("sell task panicked: {e}");
            }
        }
        self.refresh_balance(true).await;
        Ok(())
    }

    /// Full on-chain exit for one position already removed from the open set.
    /// On an unrecoverable sell failure the position is reinserted so the
    /// next tick sees it as still open.
    pub(crate) async fn execute_exit(self: Arc<Self>, position: Position, reason: ExitReason) {
        let pool_id = position.pool_id.clone();
        let slippage = self.config.trading.slippage_pct;

        if reason != ExitReason::Ghost {
            match self.execution.remove_liquidity(&pool_id, slippage).await {
                Ok(outcome) => {
                    tracing::info!(
                        "liquidity removed from {} ({})",
                        position.pool_name,
                        outcome.signatures.first().map(String::as_str).unwrap_or("?")
                    );
                }
                Err(e) => {
                    // A previous exit may have succeeded without the state
                    // being saved; only a live LP balance makes this fatal.
                    let still_on_chain = self
                        .execution
                        .balance(&position.lp_mint)
                        .await
                        .map(|raw| raw > 0)
                        .unwrap_or(true);
                    if still_on_chain {
                        tracing::error!(
                            "remove-liquidity failed for {}; position stays open: {e}",
                            position.pool_name
                        );
                        self.with_state(|state| {
                            if let Err(e) = state.open(position.clone()) {
                                tracing::error!("could not reinstate position: {e}");
                            }
                        });
                        self.persist();
                        return;
                    }
                    tracing::info!(
                        "LP already withdrawn on-chain for {}; cleaning up stale position",
                        position.pool_name
                    );
                }
            }

            if !self.sell_all_with_retry(&pool_id).await {
                tracing::warn!(
                    "could not sell {} tokens after {} attempts; the startup sweep will retry",
                    position.pool_name,
                    SELL_RETRY_DELAYS_SEC.len()
                );
            }
        }

        let exit_value = if reason == ExitReason::Ghost {
            0.0
        } else {
            position.last_value_sol
        };
        let sol_price = self.price.sol_price_usd().await;
        let now = Utc::now();
        let pool_name = position.pool_name.clone();
        let trade = position.into_closed(reason, exit_value, sol_price, now);
        if let Err(e) = self.store.append_trade(&trade) {
            tracing::error!("could not append trade history: {e}");
        }

        let cooldown_policy = self.config.cooldown_policy();
        self.with_state(|state| {
            state
                .penalties
                .record_exit(&pool_id, reason, &cooldown_policy, now);
            state.snapshots.clear_pool(&pool_id);
        });
        self.persist();
        tracing::info!(
            "closed {pool_name}: {reason}, exit value {exit_value:.4} SOL ({:+.2}%)",
            trade.realized_pnl_pct
        );
    }

    /// Sell the pool's non-SOL token back, retrying transient failures.
    async fn sell_all_with_retry(&self, pool_id: &str) -> bool {
        let slippage = self.config.trading.slippage_pct;
        for (attempt, delay) in SELL_RETRY_DELAYS_SEC.iter().enumerate() {
            if *delay > 0 {
                tokio::time::sleep(Duration::from_secs(*delay)).await;
            }
            match self
                .execution
                .swap(pool_id, 0.0, slippage, SwapDirection::Sell)
                .await
            {
                Ok(_) => return true,
                Err(e) => tracing::warn!(
                    "sell-all attempt {}/{} failed for {pool_id}: {e}",
                    attempt + 1,
                    SELL_RETRY_DELAYS_SEC.len()
                ),
            }
        }
        false
    }

    // ── scanning and entry ──────────────────────────────────────────

    /// One discovery cycle: listing, pre-filter, safety screen, scoring,
    /// entry queueing. Public so tests can drive single cycles.
    pub async fn scan_tick(&self) -> anyhow::Result<()> {
        let pools = self.directory.list_wsol_pools().await?;
        let prefiltered: Vec<Pool> = pools.into_iter().filter(|p| self.prefilter(p)).collect();

        // Snapshots are recorded before the safety screen so the stability
        // window builds even for pools not entered yet.
        self.with_state(|state| {
            for pool in &prefiltered {
                if pool.tvl_usd > 0.0 {
                    state.snapshots.record(
                        &pool.pool_id,
                        pool.volume_24h_usd,
                        pool.tvl_usd,
                        pool.price_ratio,
                    );
                }
            }
        });

        let mut admitted = Vec::new();
        for pool in &prefiltered {
            let report = self.safety.screen(pool).await;
            if report.is_safe() {
                admitted.push(pool.clone());
            } else {
                tracing::debug!(
                    "rejected {}: {}",
                    pool.name,
                    report.reasons.join("; ")
                );
            }
        }

        let available = self.refresh_balance(true).await;
        let ranked = score::rank_pools(
            &admitted,
            &self.with_state(|s| s.snapshots.clone()),
            available,
            &self.config.sizing_policy(),
            self.config.pools.top_n,
        );

        tracing::info!(
            "scan: {} prefiltered, {} safe, top score {:.1}",
            prefiltered.len(),
            admitted.len(),
            ranked.first().map(|(_, s)| s.score).unwrap_or(0.0)
        );

        // Entry failures only bar a pool for one scan cycle.
        self.failed.lock().unwrap().clear();
        self.queue_entries(ranked, available);
        self.persist();
        Ok(())
    }

    /// Threshold and sanity pre-filter ahead of the safety screen.
    fn prefilter(&self, pool: &Pool) -> bool {
        let pools_cfg = &self.config.pools;
        if pool.tvl_usd <= 0.0 || pool.tvl_usd < pools_cfg.min_liquidity_usd {
            return false;
        }
        if pool.volume_tvl_ratio() < pools_cfg.min_volume_tvl_ratio {
            return false;
        }
        if pool.apr_24h_pct < pools_cfg.min_apr_24h {
            return false;
        }
        // An APR nobody sustains is a manipulation tell, and so is a tiny
        // pool with a four-digit APR.
        if pool.apr_24h_pct > 1_000.0 {
            return false;
        }
        if pool.tvl_usd < 5_000.0 && pool.apr_24h_pct > 500.0 {
            return false;
        }
        pool.risked_mint().is_some()
    }

    fn queue_entries(&self, ranked: Vec<(Pool, Score)>, available: f64) {
        let sizing = &self.config.sizing;
        let deployable = available - sizing.reserve_sol;
        if deployable < sizing.min_position_sol {
            return;
        }

        let now = Utc::now();
        let mut capacity = self.with_state(|state| {
            state.penalties.prune(now);
            sizing
                .max_concurrent_positions
                .saturating_sub(state.open_count())
        });

        for (pool, score) in ranked {
            if capacity == 0 {
                break;
            }
            if score.score < MIN_ENTRY_SCORE {
                continue;
            }
            let pool_id = pool.pool_id.clone();
            let skip = self.with_state(|state| {
                state.has_position(&pool_id) || !state.penalties.is_eligible(&pool_id, now)
            }) || self.failed.lock().unwrap().contains(&pool_id)
                || self.queued.lock().unwrap().contains(&pool_id);
            if skip {
                continue;
            }

            // Marked queued before the send: the entry worker un-marks after
            // processing, so the mark must already be visible when it picks
            // the order up.
            self.queued.lock().unwrap().insert(pool_id.clone());
            match self.entry_tx.try_send(EntryOrder { pool, score }) {
                Ok(()) => capacity -= 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.queued.lock().unwrap().remove(&pool_id);
                    tracing::debug!("entry queue full; remaining candidates wait for next scan");
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.queued.lock().unwrap().remove(&pool_id);
                    break;
                }
            }
        }
    }

    /// One entry, executed by the single entry worker: swap half the sized
    /// amount into the pool token, pair both sides into the pool, confirm the
    /// LP balance is visible, then open the position. Any failure rolls back
    /// by selling the token side again.
    pub async fn execute_entry(&self, pool: Pool, score: Score) -> anyhow::Result<()> {
        let pool_id = pool.pool_id.clone();

        if !self.config.trading.enabled && !self.config.trading.dry_run {
            tracing::warn!("trading disabled; skipping entry for {}", pool.name);
            return Ok(());
        }

        // Re-check under the live balance: the scan's sizing may be stale.
        let available = self.refresh_balance(true).await;
        let sizing = &self.config.sizing;
        let now = Utc::now();
        let blocked = self.with_state(|state| {
            state.open_count() >= sizing.max_concurrent_positions
                || state.has_position(&pool_id)
                || !state.penalties.is_eligible(&pool_id, now)
        });
        if blocked {
            return Ok(());
        }
        let size = score
            .sized_amount_sol
            .min(available - sizing.reserve_sol)
            .min(sizing.max_position_sol);
        if size < sizing.min_position_sol {
            tracing::info!(
                "skipping {}: sized amount {size:.4} SOL below minimum",
                pool.name
            );
            return Ok(());
        }

        tracing::info!(
            "entering {} (score {:.1}): {size:.4} SOL",
            pool.name,
            score.score
        );
        let slippage = self.config.trading.slippage_pct;

        // Half the position swaps into the risked token; add-liquidity pairs
        // it with the SOL half.
        self.execution
            .swap(&pool_id, size / 2.0, slippage, SwapDirection::Buy)
            .await?;

        let added = match self.execution.add_liquidity(&pool_id, slippage).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("add-liquidity failed for {}; selling back: {e}", pool.name);
                self.sell_all_with_retry(&pool_id).await;
                self.refresh_balance(true).await;
                return Err(e.into());
            }
        };
        let lp_mint = if added.lp_mint.is_empty() {
            pool.lp_mint.clone()
        } else {
            added.lp_mint.clone()
        };

        // The freshly minted LP can lag a moment behind confirmation.
        let mut lp_raw = 0u64;
        for delay in LP_POLL_DELAYS_SEC {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            match self.execution.balance(&lp_mint).await {
                Ok(raw) if raw > 0 => {
                    lp_raw = raw;
                    break;
                }
                Ok(_) => tracing::debug!("LP balance not visible yet for {}", pool.name),
                Err(e) => tracing::warn!("LP balance poll failed: {e}"),
            }
        }
        if lp_raw == 0 {
            tracing::error!(
                "LP tokens never appeared for {}; rolling the entry back",
                pool.name
            );
            self.sell_all_with_retry(&pool_id).await;
            self.refresh_balance(true).await;
            return Err(ExecutionError::Permanent("LP balance missing after add".into()).into());
        }

        // Entry price from live reserves; the listing price is the fallback.
        let entry_ratio = match self.execution.lp_value(&pool_id, &lp_mint).await {
            Ok(valuation) if valuation.price_ratio > 0.0 => valuation.price_ratio,
            _ => pool.price_ratio,
        };

        let position = Position::new(
            &pool_id,
            &pool.name,
            &lp_mint,
            pool.lp_decimals,
            entry_ratio,
            size,
            lp_raw,
            now,
        );
        let opened = self.with_state(|state| state.open(position));
        if let Err(e) = opened {
            // Checked above under the same mutex discipline, so a duplicate
            // here means the engine raced itself.
            self.fatal_invariant(&e);
        }

        self.persist();
        self.refresh_balance(true).await;
        tracing::info!(
            "opened {} with {} LP units ({})",
            pool.name,
            lp_raw,
            added.signatures.first().map(String::as_str).unwrap_or("?")
        );
        Ok(())
    }
}
