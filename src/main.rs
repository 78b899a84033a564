#![allow(dead_code)]
//! Sluice - autonomous liquidity-provision bot for WSOL constant-product pools

mod adapters;
mod application;
mod config;
mod domain;
mod ports;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::adapters::bridge::BridgeExecution;
use crate::adapters::paper::PaperExecution;
use crate::adapters::price::SolPriceFeed;
use crate::adapters::raydium::PoolDirectory;
use crate::adapters::rugcheck::RugcheckClient;
use crate::adapters::solana::{ChainQueries, Wallet, WALLET_KEY_ENV};
use crate::application::{run_recovery, Engine};
use crate::config::{load_config, Config};
use crate::domain::state::{RestoreOutcome, StateStore};
use crate::ports::execution::ExecutionPort;

#[derive(Parser)]
#[command(name = "sluice", version, about = "Autonomous LP bot for WSOL constant-product pools")]
struct Cli {
    /// Increase log verbosity
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Debug-level logging
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot
    Run(RunCmd),
    /// Show wallet balance and tracked positions
    Status(StatusCmd),
    /// Show the closed-trade history
    History(HistoryCmd),
    /// Sweep orphan LP tokens and stranded balances, then exit
    Recover(RecoverCmd),
}

#[derive(Parser)]
struct RunCmd {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Paper trading: simulate everything, touch nothing on-chain
    #[arg(long)]
    paper: bool,
    /// Live trading with real funds
    #[arg(long)]
    live: bool,
    /// Required acknowledgement for --live
    #[arg(long)]
    i_accept_losses: bool,
}

#[derive(Parser)]
struct StatusCmd {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser)]
struct HistoryCmd {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Show at most this many recent trades
    #[arg(short = 'n', long, default_value_t = 20)]
    limit: usize,
}

#[derive(Parser)]
struct RecoverCmd {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets come from .env, never from config.toml.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);

    match cli.command {
        Command::Run(cmd) => run_command(cmd).await,
        Command::Status(cmd) => status_command(cmd).await,
        Command::History(cmd) => history_command(cmd),
        Command::Recover(cmd) => recover_command(cmd).await,
    }
}

fn init_logging(verbose: bool, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("sluice=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).init();
}

/// Safety checks before any real funds move.
fn preflight_checks(config: &Config, keypair_path: &str) -> Result<()> {
    #[cfg(unix)]
    if std::path::Path::new(keypair_path).exists() {
        let mode = std::fs::metadata(keypair_path)
            .with_context(|| format!("cannot access keypair file {keypair_path}"))?
            .permissions()
            .mode();
        if mode & 0o077 != 0 {
            bail!(
                "keypair file {keypair_path} has unsafe permissions {:o}; \
                 live trading requires 600 or stricter (chmod 600 {keypair_path})",
                mode & 0o777
            );
        }
    }

    let rpc = config.solana.effective_rpc_url();
    if rpc.contains("devnet") {
        bail!("live trading configured against a devnet RPC ({rpc}); use a mainnet endpoint");
    }
    tracing::info!("preflight checks passed (rpc: {rpc})");
    Ok(())
}

fn load_wallet(config: &Config, dry_run: bool) -> Result<Wallet> {
    if std::env::var(WALLET_KEY_ENV).is_ok() {
        return Wallet::from_env().context("failed to parse wallet key from environment");
    }
    let keypair_path = shellexpand::tilde(&config.solana.keypair_path).to_string();
    match Wallet::from_file(&keypair_path) {
        Ok(wallet) => Ok(wallet),
        Err(e) if dry_run => {
            tracing::warn!("no wallet at {keypair_path} ({e}); using a random one for paper mode");
            Ok(Wallet::new_random())
        }
        Err(e) => Err(e).with_context(|| {
            format!(
                "a wallet is required for live trading: set {WALLET_KEY_ENV} or create {keypair_path} \
                 (solana-keygen new --outfile {keypair_path})"
            )
        }),
    }
}

/// Wire up the adapters and restore state; shared by `run` and `recover`.
fn build_engine(config: Config, wallet: &Wallet) -> Result<Engine> {
    let store = StateStore::new(&config.data.dir);
    let (state, outcome) = store.restore().context("failed to restore state")?;
    match &outcome {
        RestoreOutcome::Fresh => tracing::info!("no saved state; starting fresh"),
        RestoreOutcome::Restored { saved_at } => tracing::info!(
            "restored state saved at {saved_at} ({} open position(s))",
            state.open_count()
        ),
        RestoreOutcome::CorruptBackedUp { backup } => tracing::warn!(
            "previous state was unreadable; backed up to {}",
            backup.display()
        ),
    }

    let directory = Arc::new(
        PoolDirectory::new(config.pools.api_url.clone(), config.pools.cache_ttl_sec)
            .context("failed to build pool directory client")?,
    );
    let token_safety = Arc::new(
        RugcheckClient::new(config.token_safety.api_url.clone())
            .context("failed to build token safety client")?,
    );
    let price = Arc::new(SolPriceFeed::new(std::env::var("PRICE_API_KEY").ok()));
    let chain = Arc::new(ChainQueries::new(config.solana.effective_rpc_url()));

    let execution: Arc<dyn ExecutionPort> = if config.trading.dry_run {
        Arc::new(PaperExecution::new())
    } else {
        Arc::new(BridgeExecution::new(
            &config.bridge,
            config.scheduler.backend_timeout_sec,
            config.trading.enabled,
        ))
    };

    Ok(Engine::new(
        config,
        state,
        store,
        execution,
        directory,
        token_safety,
        chain,
        price,
        wallet.public_key(),
    ))
}

async fn run_command(cmd: RunCmd) -> Result<()> {
    let mut config = load_config(&cmd.config).context("failed to load configuration")?;

    if cmd.live && cmd.paper {
        bail!("--live and --paper cannot be combined");
    }
    if cmd.paper {
        config.trading.dry_run = true;
    }
    if cmd.live {
        if !cmd.i_accept_losses {
            bail!(
                "live trading risks real funds; acknowledge with:\n  sluice run --live --i-accept-losses"
            );
        }
        config.trading.dry_run = false;
        let keypair_path = shellexpand::tilde(&config.solana.keypair_path).to_string();
        preflight_checks(&config, &keypair_path)?;
        tracing::warn!("LIVE TRADING MODE - real funds at risk");
    }
    if config.trading.dry_run {
        tracing::warn!("paper trading mode - no real transactions");
    } else if !config.trading.enabled {
        tracing::warn!("trading disabled in config - monitoring only");
    }

    let wallet = load_wallet(&config, config.trading.dry_run)?;
    tracing::info!("wallet: {}", wallet.public_key());

    let engine = build_engine(config, &wallet)?;
    let inner = engine.inner();

    let report = run_recovery(&inner, true)
        .await
        .context("startup recovery failed")?;
    if report.ghosts_closed + report.orphan_lps_recovered + report.tokens_swept > 0 {
        tracing::info!(
            "recovery: {} ghost(s) closed, {} orphan LP(s) recovered, {} token(s) swept",
            report.ghosts_closed,
            report.orphan_lps_recovered,
            report.tokens_swept
        );
    }

    engine.run().await?;
    tracing::info!("sluice stopped");
    Ok(())
}

async fn status_command(cmd: StatusCmd) -> Result<()> {
    let config = load_config(&cmd.config)?;
    let store = StateStore::new(&config.data.dir);
    let (state, _) = store.restore()?;

    let wallet = load_wallet(&config, true)?;
    println!("wallet: {}", wallet.public_key());

    if !config.trading.dry_run {
        let chain = ChainQueries::new(config.solana.effective_rpc_url());
        use crate::ports::chain::ChainQueryPort;
        match chain.native_balance(&wallet.public_key()).await {
            Ok(lamports) => {
                println!("balance: {} lamports ({:.4} SOL)", lamports, lamports as f64 / 1e9)
            }
            Err(e) => println!("balance: unavailable ({e})"),
        }
    }

    println!(
        "open positions: {} | cooldowns: {} | blacklisted: {}",
        state.open_count(),
        state.penalties.cooldowns().count(),
        state.penalties.blacklist().count()
    );
    let now = chrono::Utc::now();
    for position in state.open_positions() {
        println!(
            "  {}  entry {:.4} SOL  last value {:.4} SOL ({:+.2}%)  held {:.1}h",
            position.pool_name,
            position.entry_amount_sol,
            position.last_value_sol,
            position.last_pnl_pct,
            position.hold_hours(now)
        );
    }
    Ok(())
}

fn history_command(cmd: HistoryCmd) -> Result<()> {
    let config = load_config(&cmd.config)?;
    let store = StateStore::new(&config.data.dir);
    let history = store.load_history()?;
    if history.is_empty() {
        println!("no closed trades yet");
        return Ok(());
    }

    let wins = history.iter().filter(|t| t.realized_pnl_pct > 0.0).count();
    let total_pnl: f64 = history
        .iter()
        .map(|t| t.exit_value_sol - t.position.entry_amount_sol)
        .sum();
    println!(
        "{} closed trade(s), {} winner(s) ({:.0}%), net {:+.4} SOL",
        history.len(),
        wins,
        100.0 * wins as f64 / history.len() as f64,
        total_pnl
    );
    println!();
    for trade in history.iter().rev().take(cmd.limit) {
        println!(
            "  {}  {}  {:+.2}%  {:.4} -> {:.4} SOL  held {:.1}h  ({})",
            trade.closed_at.format("%Y-%m-%d %H:%M"),
            trade.position.pool_name,
            trade.realized_pnl_pct,
            trade.position.entry_amount_sol,
            trade.exit_value_sol,
            trade.hold_seconds as f64 / 3600.0,
            trade.exit_reason
        );
    }
    Ok(())
}

async fn recover_command(cmd: RecoverCmd) -> Result<()> {
    let config = load_config(&cmd.config)?;
    if config.trading.dry_run {
        bail!("recover needs live mode; nothing to sweep in dry run");
    }
    let wallet = load_wallet(&config, false)?;
    tracing::info!("wallet: {}", wallet.public_key());

    let engine = build_engine(config, &wallet)?;
    let inner = engine.inner();
    let report = run_recovery(&inner, false).await?;
    println!(
        "recovery complete: unwrapped {:.4} SOL, {} ghost(s) closed, {} orphan LP(s) recovered, \
         {} token(s) swept, {} account(s) closed",
        report.unwrapped_sol,
        report.ghosts_closed,
        report.orphan_lps_recovered,
        report.tokens_swept,
        report.accounts_closed
    );
    Ok(())
}
