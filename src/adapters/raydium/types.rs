//! Wire types for the pool listing service's V3-style API.
//!
//! The API nests per-window stats and wraps paginated payloads twice. Fields
//! the engine does not consume are simply not declared.

use serde::Deserialize;

use crate::domain::pool::Pool;

#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPage {
    #[serde(default)]
    pub data: Vec<ApiPool>,
    #[serde(default, rename = "hasNextPage")]
    pub has_next_page: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiMint {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub decimals: u8,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiDayStats {
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub apr: f64,
}

#[derive(Debug, Deserialize)]
pub struct ApiPool {
    pub id: String,
    #[serde(default, rename = "programId")]
    pub program_id: String,
    #[serde(rename = "mintA")]
    pub mint_a: ApiMint,
    #[serde(rename = "mintB")]
    pub mint_b: ApiMint,
    #[serde(default, rename = "lpMint")]
    pub lp_mint: Option<ApiMint>,
    #[serde(default)]
    pub tvl: f64,
    #[serde(default)]
    pub day: ApiDayStats,
    #[serde(default, rename = "burnPercent")]
    pub burn_percent: f64,
    /// Fraction, e.g. 0.0025 for 25 bps.
    #[serde(default, rename = "feeRate")]
    pub fee_rate: f64,
    /// The API serves this as a string of unix seconds.
    #[serde(default, rename = "openTime")]
    pub open_time: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, rename = "mintAmountA")]
    pub mint_amount_a: f64,
    #[serde(default, rename = "mintAmountB")]
    pub mint_amount_b: f64,
}

impl ApiPool {
    /// Flatten the wire shape into the engine's pool record.
    pub fn into_pool(self) -> Pool {
        let lp = self.lp_mint.unwrap_or(ApiMint {
            address: String::new(),
            symbol: String::new(),
            decimals: 9,
        });
        // Reserve-derived price beats the API's own price field when both
        // sides are present.
        let price_ratio = if self.mint_amount_a > 0.0 && self.mint_amount_b > 0.0 {
            self.mint_amount_b / self.mint_amount_a
        } else {
            self.price
        };
        Pool {
            pool_id: self.id,
            name: format!("{}/{}", self.mint_a.symbol, self.mint_b.symbol),
            lp_mint: lp.address,
            lp_decimals: lp.decimals,
            base_mint: self.mint_a.address,
            quote_mint: self.mint_b.address,
            base_decimals: self.mint_a.decimals,
            quote_decimals: self.mint_b.decimals,
            tvl_usd: self.tvl,
            volume_24h_usd: self.day.volume,
            apr_24h_pct: self.day.apr,
            burn_pct: self.burn_percent,
            fee_tier_bps: (self.fee_rate * 10_000.0).round() as u32,
            open_time: self.open_time.parse().unwrap_or(0),
            price_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL_JSON: &str = r#"{
        "id": "AmmPool111",
        "programId": "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
        "mintA": {"address": "TokMintA", "symbol": "TOK", "decimals": 6},
        "mintB": {"address": "So11111111111111111111111111111111111111112", "symbol": "WSOL", "decimals": 9},
        "lpMint": {"address": "LpMintA", "symbol": "", "decimals": 9},
        "tvl": 81234.5,
        "day": {"volume": 120000.0, "apr": 181.2},
        "burnPercent": 96.5,
        "feeRate": 0.0025,
        "openTime": "1700000000"
    }"#;

    #[test]
    fn pool_deserializes_and_flattens() {
        let api: ApiPool = serde_json::from_str(POOL_JSON).unwrap();
        let pool = api.into_pool();
        assert_eq!(pool.pool_id, "AmmPool111");
        assert_eq!(pool.name, "TOK/WSOL");
        assert_eq!(pool.lp_mint, "LpMintA");
        assert_eq!(pool.fee_tier_bps, 25);
        assert_eq!(pool.open_time, 1_700_000_000);
        assert!(pool.is_wsol_pair());
    }

    #[test]
    fn missing_optionals_default() {
        let api: ApiPool = serde_json::from_str(
            r#"{"id": "x", "mintA": {"address": "a"}, "mintB": {"address": "b"}}"#,
        )
        .unwrap();
        let pool = api.into_pool();
        assert_eq!(pool.burn_pct, 0.0);
        assert_eq!(pool.open_time, 0);
        assert_eq!(pool.lp_decimals, 9);
        assert_eq!(pool.name, "/");
    }

    #[test]
    fn envelope_unwraps_page() {
        let json = format!(
            r#"{{"success": true, "data": {{"data": [{POOL_JSON}], "hasNextPage": false}}}}"#
        );
        let envelope: ApiEnvelope<ApiPage> = serde_json::from_str(&json).unwrap();
        let page = envelope.data.unwrap();
        assert_eq!(page.data.len(), 1);
        assert!(!page.has_next_page);
    }
}
