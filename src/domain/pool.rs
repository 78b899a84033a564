//! Pool records as returned by the listing service.
//!
//! A `Pool` is immutable within one scan cycle; the directory adapter
//! re-fetches the whole set on every cache refresh.

use serde::{Deserialize, Serialize};

/// Mint address of wrapped SOL.
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// One WSOL-quoted constant-product pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    /// AMM pool account address.
    pub pool_id: String,
    /// Display name, "SYMA/SYMB".
    pub name: String,
    pub lp_mint: String,
    pub lp_decimals: u8,
    pub base_mint: String,
    pub quote_mint: String,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub tvl_usd: f64,
    pub volume_24h_usd: f64,
    pub apr_24h_pct: f64,
    /// Share of the initial LP supply destroyed via token burn, 0-100.
    pub burn_pct: f64,
    pub fee_tier_bps: u32,
    /// Pool open time, unix seconds; 0 when the API omits it.
    pub open_time: u64,
    /// Quote-per-base ratio as reported by the listing service. Indicative
    /// only; entries and valuations read the on-chain reserves instead.
    pub price_ratio: f64,
}

impl Pool {
    /// True when one of the two mints is wrapped SOL.
    pub fn is_wsol_pair(&self) -> bool {
        self.base_mint == WSOL_MINT || self.quote_mint == WSOL_MINT
    }

    /// The non-WSOL side of the pair, i.e. the asset actually at risk.
    ///
    /// Returns `None` for pools where neither mint is WSOL (the directory
    /// filters those out, but restored state may predate a config change).
    pub fn risked_mint(&self) -> Option<&str> {
        if self.base_mint == WSOL_MINT {
            Some(&self.quote_mint)
        } else if self.quote_mint == WSOL_MINT {
            Some(&self.base_mint)
        } else {
            None
        }
    }

    /// 24h volume over TVL; 0 when TVL is unknown.
    pub fn volume_tvl_ratio(&self) -> f64 {
        if self.tvl_usd > 0.0 {
            self.volume_24h_usd / self.tvl_usd
        } else {
            0.0
        }
    }

    /// Token symbol of the risked side, derived from the pool name.
    pub fn risked_symbol(&self) -> String {
        self.name
            .replace("WSOL/", "")
            .replace("/WSOL", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool(pool_id: &str) -> Pool {
        Pool {
            pool_id: pool_id.to_string(),
            name: "DOGWIF/WSOL".to_string(),
            lp_mint: format!("lp-{pool_id}"),
            lp_decimals: 9,
            base_mint: "DogWifMint1111111111111111111111111111111111".to_string(),
            quote_mint: WSOL_MINT.to_string(),
            base_decimals: 6,
            quote_decimals: 9,
            tvl_usd: 80_000.0,
            volume_24h_usd: 120_000.0,
            apr_24h_pct: 180.0,
            burn_pct: 97.0,
            fee_tier_bps: 25,
            open_time: 1_700_000_000,
            price_ratio: 0.004,
        }
    }

    #[test]
    fn risked_mint_is_the_non_wsol_side() {
        let pool = test_pool("amm1");
        assert_eq!(
            pool.risked_mint(),
            Some("DogWifMint1111111111111111111111111111111111")
        );
        assert!(pool.is_wsol_pair());
    }

    #[test]
    fn risked_mint_none_without_wsol() {
        let mut pool = test_pool("amm1");
        pool.quote_mint = "Usdc111111111111111111111111111111111111111".to_string();
        assert_eq!(pool.risked_mint(), None);
        assert!(!pool.is_wsol_pair());
    }

    #[test]
    fn volume_tvl_ratio_handles_zero_tvl() {
        let mut pool = test_pool("amm1");
        assert!((pool.volume_tvl_ratio() - 1.5).abs() < 1e-9);
        pool.tvl_usd = 0.0;
        assert_eq!(pool.volume_tvl_ratio(), 0.0);
    }

    #[test]
    fn risked_symbol_strips_wsol() {
        let pool = test_pool("amm1");
        assert_eq!(pool.risked_symbol(), "DOGWIF");
    }
}
