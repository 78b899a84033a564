//! Configuration loading and validation.
//!
//! Everything lives in one TOML file; secrets (wallet key, API keys) come
//! from the environment and are never written to config. Every option has a
//! default matching the shipped `config.toml`, so a partial file works.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::domain::blacklist::CooldownPolicy;
use crate::domain::exit::ExitPolicy;
use crate::domain::safety::SafetyPolicy;
use crate::domain::score::SizingPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub trading: TradingSection,
    #[serde(default)]
    pub sizing: SizingSection,
    #[serde(default)]
    pub exits: ExitsSection,
    #[serde(default)]
    pub pools: PoolsSection,
    #[serde(default)]
    pub token_safety: TokenSafetySection,
    #[serde(default)]
    pub lp_lock: LpLockSection,
    #[serde(default)]
    pub cooldowns: CooldownsSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub solana: SolanaSection,
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub data: DataSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingSection {
    /// Master kill switch; false = no real transactions, ever.
    pub enabled: bool,
    /// Simulate entries and exits without touching the chain.
    pub dry_run: bool,
    /// Slippage tolerance passed through to the execution backend, percent.
    pub slippage_pct: f64,
}

impl Default for TradingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            dry_run: false,
            slippage_pct: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SizingSection {
    pub max_position_sol: f64,
    pub min_position_sol: f64,
    pub max_concurrent_positions: usize,
    /// SOL held back for transaction fees and rent.
    pub reserve_sol: f64,
    /// TVL at which a pool no longer scales the position down.
    pub tvl_ref_usd: f64,
}

impl Default for SizingSection {
    fn default() -> Self {
        Self {
            max_position_sol: 5.0,
            min_position_sol: 0.05,
            max_concurrent_positions: 3,
            reserve_sol: 0.05,
            tvl_ref_usd: 50_000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExitsSection {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_hold_hours: f64,
    pub max_il_pct: f64,
}

impl Default for ExitsSection {
    fn default() -> Self {
        Self {
            stop_loss_pct: -15.0,
            take_profit_pct: 10.0,
            max_hold_hours: 168.0,
            max_il_pct: -5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolsSection {
    pub min_liquidity_usd: f64,
    pub min_volume_tvl_ratio: f64,
    pub min_apr_24h: f64,
    pub min_burn_pct: f64,
    pub cache_ttl_sec: u64,
    /// How many ranked pools a scan forwards to the entry queue filter.
    pub top_n: usize,
    /// Listing service base URL.
    pub api_url: String,
}

impl Default for PoolsSection {
    fn default() -> Self {
        Self {
            min_liquidity_usd: 5_000.0,
            min_volume_tvl_ratio: 0.5,
            min_apr_24h: 100.0,
            min_burn_pct: 50.0,
            cache_ttl_sec: 60,
            top_n: 10,
            api_url: "https://api-v3.raydium.io".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenSafetySection {
    pub enabled: bool,
    /// Normalized risk score above which the token is rejected (0-100).
    pub max_score: u32,
    pub max_top10_holder_pct: f64,
    pub max_single_holder_pct: f64,
    pub min_token_holders: u64,
    pub api_url: String,
}

impl Default for TokenSafetySection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_score: 60,
            max_top10_holder_pct: 50.0,
            max_single_holder_pct: 20.0,
            min_token_holders: 100,
            api_url: "https://api.rugcheck.xyz/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LpLockSection {
    pub enabled: bool,
    /// Minimum burned+locked share of LP supply, percent.
    pub min_safe_lp_pct: f64,
    /// Largest unlocked single holder tolerated, percent of LP supply.
    pub max_single_lp_holder_pct: f64,
}

impl Default for LpLockSection {
    fn default() -> Self {
        Self {
            enabled: true,
            min_safe_lp_pct: 50.0,
            max_single_lp_holder_pct: 25.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CooldownsSection {
    /// Escalating cooldown seconds per consecutive stop loss.
    pub tiers_sec: Vec<u64>,
    pub permanent_blacklist_strikes: u32,
}

impl Default for CooldownsSection {
    fn default() -> Self {
        Self {
            tiers_sec: vec![86_400, 172_800],
            permanent_blacklist_strikes: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    pub display_sec: u64,
    pub position_check_sec: u64,
    pub pool_scan_sec: u64,
    /// Hard wall-clock timeout for every backend call, seconds.
    pub backend_timeout_sec: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            display_sec: 4,
            position_check_sec: 1,
            pool_scan_sec: 180,
            backend_timeout_sec: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolanaSection {
    pub rpc_url: String,
    pub keypair_path: String,
}

impl Default for SolanaSection {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            keypair_path: "~/.config/solana/id.json".to_string(),
        }
    }
}

impl SolanaSection {
    /// RPC URL with the `SOLANA_RPC_URL` env override.
    pub fn effective_rpc_url(&self) -> String {
        std::env::var("SOLANA_RPC_URL").unwrap_or_else(|_| self.rpc_url.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeSection {
    /// Sidecar executable that implements the execution backend.
    pub command: String,
    pub args: Vec<String>,
    pub max_retries: u32,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            command: "node".to_string(),
            args: vec!["bridge/amm_bridge.js".to_string()],
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSection {
    pub dir: String,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            dir: "data".to_string(),
        }
    }
}

/// Load configuration from a TOML file. A missing file yields the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let config = if path.as_ref().exists() {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::Validation(msg));

        if self.trading.slippage_pct <= 0.0 || self.trading.slippage_pct > 50.0 {
            return fail(format!(
                "slippage_pct must be in (0, 50], got {}",
                self.trading.slippage_pct
            ));
        }
        if self.sizing.min_position_sol <= 0.0 {
            return fail(format!(
                "min_position_sol must be > 0, got {}",
                self.sizing.min_position_sol
            ));
        }
        if self.sizing.max_position_sol < self.sizing.min_position_sol {
            return fail(format!(
                "max_position_sol {} below min_position_sol {}",
                self.sizing.max_position_sol, self.sizing.min_position_sol
            ));
        }
        if self.sizing.max_concurrent_positions == 0 {
            return fail("max_concurrent_positions must be > 0".to_string());
        }
        if self.exits.stop_loss_pct >= 0.0 {
            return fail(format!(
                "stop_loss_pct must be negative, got {}",
                self.exits.stop_loss_pct
            ));
        }
        if self.exits.take_profit_pct <= 0.0 {
            return fail(format!(
                "take_profit_pct must be positive, got {}",
                self.exits.take_profit_pct
            ));
        }
        if self.exits.max_il_pct >= 0.0 {
            return fail(format!(
                "max_il_pct must be negative, got {}",
                self.exits.max_il_pct
            ));
        }
        if self.exits.max_hold_hours <= 0.0 {
            return fail("max_hold_hours must be > 0".to_string());
        }
        if self.pools.min_burn_pct < 0.0 || self.pools.min_burn_pct > 100.0 {
            return fail(format!(
                "min_burn_pct must be 0-100, got {}",
                self.pools.min_burn_pct
            ));
        }
        if self.cooldowns.tiers_sec.is_empty() {
            return fail("cooldowns.tiers_sec must not be empty".to_string());
        }
        if self.cooldowns.permanent_blacklist_strikes == 0 {
            return fail("permanent_blacklist_strikes must be > 0".to_string());
        }
        if self.scheduler.position_check_sec == 0 || self.scheduler.pool_scan_sec == 0 {
            return fail("scheduler periods must be > 0".to_string());
        }
        if self.solana.rpc_url.is_empty() {
            return fail("solana.rpc_url cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn exit_policy(&self) -> ExitPolicy {
        ExitPolicy {
            stop_loss_pct: self.exits.stop_loss_pct,
            take_profit_pct: self.exits.take_profit_pct,
            max_il_pct: self.exits.max_il_pct,
            max_hold_hours: self.exits.max_hold_hours,
        }
    }

    pub fn sizing_policy(&self) -> SizingPolicy {
        SizingPolicy {
            min_position_sol: self.sizing.min_position_sol,
            max_position_sol: self.sizing.max_position_sol,
            reserve_sol: self.sizing.reserve_sol,
            tvl_ref_usd: self.sizing.tvl_ref_usd,
        }
    }

    pub fn safety_policy(&self) -> SafetyPolicy {
        SafetyPolicy {
            min_burn_pct: self.pools.min_burn_pct,
            check_lp_lock: self.lp_lock.enabled,
            min_safe_lp_pct: self.lp_lock.min_safe_lp_pct,
            max_single_lp_holder_pct: self.lp_lock.max_single_lp_holder_pct,
            check_token_safety: self.token_safety.enabled,
            max_token_score: self.token_safety.max_score,
            max_top10_holder_pct: self.token_safety.max_top10_holder_pct,
            max_single_holder_pct: self.token_safety.max_single_holder_pct,
            min_token_holders: self.token_safety.min_token_holders,
        }
    }

    pub fn cooldown_policy(&self) -> CooldownPolicy {
        CooldownPolicy {
            tiers_sec: self.cooldowns.tiers_sec.clone(),
            permanent_strikes: self.cooldowns.permanent_blacklist_strikes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = load_config("/nonexistent/config.toml").unwrap();
        assert_eq!(config.sizing.max_concurrent_positions, 3);
        assert_eq!(config.scheduler.pool_scan_sec, 180);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[exits]\nstop_loss_pct = -20.0\ntake_profit_pct = 15.0\nmax_hold_hours = 48.0\nmax_il_pct = -4.0"
        )
        .unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.exits.stop_loss_pct, -20.0);
        // untouched sections keep defaults
        assert_eq!(config.pools.min_burn_pct, 50.0);
        assert!(config.trading.enabled);
    }

    #[test]
    fn positive_stop_loss_rejected() {
        let mut config = Config::default();
        config.exits.stop_loss_pct = 5.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn empty_cooldown_tiers_rejected() {
        let mut config = Config::default();
        config.cooldowns.tiers_sec.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_sizing_rejected() {
        let mut config = Config::default();
        config.sizing.max_position_sol = 0.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn policies_mirror_sections() {
        let config = Config::default();
        let exits = config.exit_policy();
        assert_eq!(exits.stop_loss_pct, -15.0);
        let sizing = config.sizing_policy();
        assert_eq!(sizing.max_position_sol, 5.0);
        let safety = config.safety_policy();
        assert_eq!(safety.max_token_score, 60);
        let cooldowns = config.cooldown_policy();
        assert_eq!(cooldowns.tiers_sec, vec![86_400, 172_800]);
    }
}
