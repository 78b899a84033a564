//! Pool scoring and position sizing.
//!
//! Five factors, each mapped monotonically into [0, 100] with a saturating
//! cap, combined with fixed weights. The IL factor comes from the snapshot
//! tracker's price-stability window and defaults to a neutral 50 when a pool
//! has no history yet.

use serde::{Deserialize, Serialize};

use crate::domain::pool::Pool;
use crate::domain::snapshots::SnapshotTracker;

const W_APR: f64 = 0.35;
const W_VOL_TVL: f64 = 0.20;
const W_LIQ: f64 = 0.20;
const W_IL: f64 = 0.10;
const W_BURN: f64 = 0.15;

/// APR at which the log-scaled factor saturates.
const APR_CAP_PCT: f64 = 1000.0;
/// Volume/TVL ratio at which that factor saturates.
const VOL_TVL_CAP: f64 = 2.0;
/// TVL at which the liquidity factor saturates.
const LIQ_CAP_USD: f64 = 1_000_000.0;
/// IL factor used when a pool has no snapshot history.
const NEUTRAL_IL: f64 = 50.0;

/// Per-factor breakdown, kept for ranking transparency in logs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub apr: f64,
    pub vol_tvl: f64,
    pub liq: f64,
    pub il: f64,
    pub burn: f64,
}

/// A scored, sized entry candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub pool_id: String,
    pub score: f64,
    pub components: ScoreComponents,
    pub sized_amount_sol: f64,
}

/// Sizing bounds, from the `[sizing]` config section.
#[derive(Debug, Clone, Copy)]
pub struct SizingPolicy {
    pub min_position_sol: f64,
    pub max_position_sol: f64,
    pub reserve_sol: f64,
    /// TVL at which a pool no longer scales the position down.
    pub tvl_ref_usd: f64,
}

/// Score one pool against the current snapshot history.
pub fn score_pool(pool: &Pool, snapshots: &SnapshotTracker) -> (f64, ScoreComponents) {
    let apr = saturate((1.0 + pool.apr_24h_pct.max(0.0)).ln() / (1.0 + APR_CAP_PCT).ln());
    let vol_tvl = saturate(pool.volume_tvl_ratio() / VOL_TVL_CAP);
    let liq = saturate(pool.tvl_usd / LIQ_CAP_USD);
    let il = snapshots
        .price_stability(&pool.pool_id)
        .unwrap_or(NEUTRAL_IL);
    let burn = pool.burn_pct.clamp(0.0, 100.0);

    let components = ScoreComponents { apr, vol_tvl, liq, il, burn };
    let score = W_APR * apr + W_VOL_TVL * vol_tvl + W_LIQ * liq + W_IL * il + W_BURN * burn;
    (score.clamp(0.0, 100.0), components)
}

/// Position size for a scored pool.
///
/// `available_sol` is the wallet balance before holding back the reserve.
/// Shallow pools scale the size down linearly up to `tvl_ref_usd`; the result
/// is clamped into `[min_position_sol, max_position_sol]`.
pub fn size_position(score: f64, pool: &Pool, available_sol: f64, policy: &SizingPolicy) -> f64 {
    let base = (available_sol - policy.reserve_sol).max(0.0);
    let pool_factor = if policy.tvl_ref_usd > 0.0 {
        (pool.tvl_usd / policy.tvl_ref_usd).min(1.0)
    } else {
        1.0
    };
    (base * (score / 100.0) * pool_factor).clamp(policy.min_position_sol, policy.max_position_sol)
}

/// Score every pool and return the top `n` in descending score order.
pub fn rank_pools(
    pools: &[Pool],
    snapshots: &SnapshotTracker,
    available_sol: f64,
    policy: &SizingPolicy,
    top_n: usize,
) -> Vec<(Pool, Score)> {
    let mut scored: Vec<(Pool, Score)> = pools
        .iter()
        .map(|pool| {
            let (score, components) = score_pool(pool, snapshots);
            let sized_amount_sol = size_position(score, pool, available_sol, policy);
            (
                pool.clone(),
                Score {
                    pool_id: pool.pool_id.clone(),
                    score,
                    components,
                    sized_amount_sol,
                },
            )
        })
        .collect();
    scored.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
    scored.truncate(top_n);
    scored
}

fn saturate(fraction: f64) -> f64 {
    (fraction.max(0.0) * 100.0).min(100.0)
}
