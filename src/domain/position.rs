//! Open positions and closed-trade records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::math;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Time,
    Il,
    Ghost,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ExitReason::StopLoss => "stop loss",
            ExitReason::TakeProfit => "take profit",
            ExitReason::Time => "max hold time",
            ExitReason::Il => "impermanent loss",
            ExitReason::Ghost => "ghost (LP gone on-chain)",
            ExitReason::Manual => "manual",
        };
        f.write_str(label)
    }
}

/// One live LP position. Owned by the position store; at most one per pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: String,
    pub pool_id: String,
    pub pool_name: String,
    pub lp_mint: String,
    pub lp_decimals: u8,
    /// Quote-per-base ratio at entry, from reserves.
    pub entry_price_ratio: f64,
    pub entry_amount_sol: f64,
    /// Raw LP units received at entry; always > 0 for a live position.
    pub entry_lp_raw: u64,
    pub opened_at: DateTime<Utc>,
    pub last_value_sol: f64,
    pub last_price_ratio: f64,
    pub last_pnl_pct: f64,
    pub last_il_pct: f64,
    pub last_updated_at: DateTime<Utc>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool_id: &str,
        pool_name: &str,
        lp_mint: &str,
        lp_decimals: u8,
        entry_price_ratio: f64,
        entry_amount_sol: f64,
        entry_lp_raw: u64,
        opened_at: DateTime<Utc>,
    ) -> Self {
        let short = &pool_id[..pool_id.len().min(8)];
        Self {
            position_id: format!("{short}-{}", opened_at.timestamp()),
            pool_id: pool_id.to_string(),
            pool_name: pool_name.to_string(),
            lp_mint: lp_mint.to_string(),
            lp_decimals,
            entry_price_ratio,
            entry_amount_sol,
            entry_lp_raw,
            opened_at,
            last_value_sol: entry_amount_sol,
            last_price_ratio: entry_price_ratio,
            last_pnl_pct: 0.0,
            last_il_pct: 0.0,
            last_updated_at: opened_at,
        }
    }

    /// Refresh valuation-derived metrics from a fresh LP reading. O(1).
    pub fn update_metrics(&mut self, value_sol: f64, price_ratio: f64, now: DateTime<Utc>) {
        self.last_value_sol = value_sol;
        if price_ratio > 0.0 {
            self.last_price_ratio = price_ratio;
        }
        self.last_pnl_pct = if self.entry_amount_sol > 0.0 {
            100.0 * (value_sol - self.entry_amount_sol) / self.entry_amount_sol
        } else {
            0.0
        };
        self.last_il_pct =
            math::impermanent_loss(self.entry_price_ratio, self.last_price_ratio) * 100.0;
        self.last_updated_at = now;
    }

    pub fn hold_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_seconds().max(0)
    }

    pub fn hold_hours(&self, now: DateTime<Utc>) -> f64 {
        self.hold_seconds(now) as f64 / 3600.0
    }

    pub fn unrealized_pnl_sol(&self) -> f64 {
        self.last_value_sol - self.entry_amount_sol
    }

    /// Close into an append-only trade record.
    ///
    /// `fees_collected_sol` is an instrumentation-only estimate: the part of
    /// the value change not explained by impermanent loss.
    pub fn into_closed(
        self,
        reason: ExitReason,
        exit_value_sol: f64,
        sol_price_usd: f64,
        closed_at: DateTime<Utc>,
    ) -> ClosedTrade {
        let realized_pnl_pct = if self.entry_amount_sol > 0.0 {
            100.0 * (exit_value_sol - self.entry_amount_sol) / self.entry_amount_sol
        } else {
            0.0
        };
        let il_sol = (self.last_il_pct / 100.0) * self.entry_amount_sol;
        let fees_collected_sol = (exit_value_sol - self.entry_amount_sol - il_sol).max(0.0);
        let hold_seconds = self.hold_seconds(closed_at);
        ClosedTrade {
            position: self,
            closed_at,
            exit_value_sol,
            realized_pnl_pct,
            fees_collected_sol,
            hold_seconds,
            exit_reason: reason,
            sol_price_usd,
        }
    }
}

/// A finished trade, one JSONL line in the history file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    #[serde(flatten)]
    pub position: Position,
    pub closed_at: DateTime<Utc>,
    pub exit_value_sol: f64,
    pub realized_pnl_pct: f64,
    pub fees_collected_sol: f64,
    pub hold_seconds: i64,
    pub exit_reason: ExitReason,
    pub sol_price_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_position(pool_id: &str) -> Position {
        Position::new(
            pool_id,
            "TOK/WSOL",
            "LpMint111111111111111111111111111111111111",
            9,
            0.004,
            1.0,
            1_000_000_000,
            Utc::now(),
        )
    }

    #[test]
    fn new_position_seeds_metrics_from_entry() {
        let pos = test_position("AmmPool1111111111111111111111111111111111");
        assert_eq!(pos.last_value_sol, 1.0);
        assert_eq!(pos.last_pnl_pct, 0.0);
        assert_eq!(pos.last_il_pct, 0.0);
        assert!(pos.position_id.starts_with("AmmPool1-"));
        assert_eq!(pos.opened_at, pos.last_updated_at);
    }

    #[test]
    fn update_metrics_computes_pnl_and_il() {
        let mut pos = test_position("amm");
        let now = pos.opened_at + Duration::minutes(5);
        pos.update_metrics(0.9, 0.016, now);
        assert!((pos.last_pnl_pct + 10.0).abs() < 1e-9);
        // 4x price move: IL = -20%
        assert!((pos.last_il_pct + 20.0).abs() < 1e-9);
        assert_eq!(pos.last_updated_at, now);
    }

    #[test]
    fn update_metrics_keeps_last_ratio_on_zero() {
        let mut pos = test_position("amm");
        let now = pos.opened_at + Duration::minutes(1);
        pos.update_metrics(1.1, 0.0, now);
        assert_eq!(pos.last_price_ratio, 0.004);
    }

    #[test]
    fn closing_records_reason_and_hold_time() {
        let pos = test_position("amm");
        let closed_at = pos.opened_at + Duration::hours(3);
        let trade = pos.into_closed(ExitReason::TakeProfit, 1.12, 150.0, closed_at);
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.hold_seconds, 3 * 3600);
        assert!((trade.realized_pnl_pct - 12.0).abs() < 1e-9);
        assert!(trade.fees_collected_sol > 0.0);
    }

    #[test]
    fn ghost_close_has_zero_value() {
        let pos = test_position("amm");
        let closed_at = pos.opened_at + Duration::minutes(30);
        let trade = pos.into_closed(ExitReason::Ghost, 0.0, 150.0, closed_at);
        assert_eq!(trade.exit_value_sol, 0.0);
        assert!((trade.realized_pnl_pct + 100.0).abs() < 1e-9);
        assert_eq!(trade.fees_collected_sol, 0.0);
    }

    #[test]
    fn exit_reason_serializes_screaming_snake() {
        let json = serde_json::to_string(&ExitReason::StopLoss).unwrap();
        assert_eq!(json, "\"STOP_LOSS\"");
        let back: ExitReason = serde_json::from_str("\"GHOST\"").unwrap();
        assert_eq!(back, ExitReason::Ghost);
    }
}
