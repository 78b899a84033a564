//! Exit arbitration.
//!
//! Five independent triggers, evaluated in a fixed order with first-wins
//! priority. GHOST is a correctness condition (a zero-balance position must
//! stop being treated as live), stop loss is capital protection and pre-empts
//! take profit under rapid reversals, the IL gate bounds divergence risk, and
//! the time stop keeps capital from stranding.

use chrono::{DateTime, Utc};

use crate::domain::position::{ExitReason, Position};

/// Exit thresholds, from the `[exits]` config section.
#[derive(Debug, Clone, Copy)]
pub struct ExitPolicy {
    /// Exit when pnl_pct falls to or below this (negative, e.g. -15.0).
    pub stop_loss_pct: f64,
    /// Exit when pnl_pct rises to or above this (e.g. 10.0).
    pub take_profit_pct: f64,
    /// Exit when il_pct falls to or below this (negative, e.g. -5.0).
    pub max_il_pct: f64,
    pub max_hold_hours: f64,
}

/// Verdict for one position at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Hold,
    Exit(ExitReason),
}

/// A freshly-confirmed add-liquidity can take a moment to show an LP balance;
/// within this window a zero reading is not treated as a rug.
const GHOST_GRACE_SECS: i64 = 180;

/// Evaluate the exit predicates for one position.
///
/// `lp_balance_raw` is the latest batch valuation's on-chain LP balance;
/// `None` means the batch had no reading for this position this tick (the
/// ghost check is then skipped, not assumed).
pub fn evaluate(
    position: &Position,
    lp_balance_raw: Option<u64>,
    policy: &ExitPolicy,
    now: DateTime<Utc>,
) -> ExitDecision {
    if lp_balance_raw == Some(0) && (now - position.opened_at).num_seconds() > GHOST_GRACE_SECS {
        return ExitDecision::Exit(ExitReason::Ghost);
    }
    if position.last_pnl_pct <= policy.stop_loss_pct {
        return ExitDecision::Exit(ExitReason::StopLoss);
    }
    if position.last_pnl_pct >= policy.take_profit_pct {
        return ExitDecision::Exit(ExitReason::TakeProfit);
    }
    if position.last_il_pct <= policy.max_il_pct {
        return ExitDecision::Exit(ExitReason::Il);
    }
    if position.hold_hours(now) >= policy.max_hold_hours {
        return ExitDecision::Exit(ExitReason::Time);
    }
    ExitDecision::Hold
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn policy() -> ExitPolicy {
        ExitPolicy {
            stop_loss_pct: -15.0,
            take_profit_pct: 10.0,
            max_il_pct: -5.0,
            max_hold_hours: 168.0,
        }
    }

    fn position() -> Position {
        Position::new(
            "amm",
            "TOK/WSOL",
            "lp-mint",
            9,
            1.0,
            1.0,
            1_000_000_000,
            Utc::now() - Duration::hours(1),
        )
    }

    #[test]
    fn holds_inside_all_bounds() {
        let mut pos = position();
        pos.last_pnl_pct = 2.0;
        pos.last_il_pct = -0.5;
        assert_eq!(
            evaluate(&pos, Some(1_000_000_000), &policy(), Utc::now()),
            ExitDecision::Hold
        );
    }

    #[test]
    fn ghost_wins_over_everything() {
        let mut pos = position();
        pos.last_pnl_pct = -99.0; // would also trip the stop loss
        assert_eq!(
            evaluate(&pos, Some(0), &policy(), Utc::now()),
            ExitDecision::Exit(ExitReason::Ghost)
        );
    }

    #[test]
    fn ghost_respects_grace_window() {
        let mut pos = position();
        pos.opened_at = Utc::now() - Duration::seconds(30);
        pos.last_pnl_pct = 0.0;
        assert_eq!(
            evaluate(&pos, Some(0), &policy(), Utc::now()),
            ExitDecision::Hold
        );
    }

    #[test]
    fn missing_balance_reading_skips_ghost_check() {
        let mut pos = position();
        pos.last_pnl_pct = 0.0;
        assert_eq!(evaluate(&pos, None, &policy(), Utc::now()), ExitDecision::Hold);
    }

    #[test]
    fn stop_loss_preempts_take_profit() {
        // Malformed thresholds can make both true at once; the order decides.
        let mut pos = position();
        pos.last_pnl_pct = -20.0;
        let mut p = policy();
        p.take_profit_pct = -30.0;
        assert_eq!(
            evaluate(&pos, Some(1), &p, Utc::now()),
            ExitDecision::Exit(ExitReason::StopLoss)
        );
    }

    #[test]
    fn stop_loss_preempts_time() {
        let mut pos = position();
        pos.opened_at = Utc::now() - Duration::hours(200);
        pos.last_pnl_pct = -20.0;
        assert_eq!(
            evaluate(&pos, Some(1), &policy(), Utc::now()),
            ExitDecision::Exit(ExitReason::StopLoss)
        );
    }

    #[test]
    fn take_profit_at_threshold() {
        let mut pos = position();
        pos.last_pnl_pct = 10.0;
        assert_eq!(
            evaluate(&pos, Some(1), &policy(), Utc::now()),
            ExitDecision::Exit(ExitReason::TakeProfit)
        );
    }

    #[test]
    fn il_gate_before_time() {
        let mut pos = position();
        pos.opened_at = Utc::now() - Duration::hours(200);
        pos.last_il_pct = -6.0;
        assert_eq!(
            evaluate(&pos, Some(1), &policy(), Utc::now()),
            ExitDecision::Exit(ExitReason::Il)
        );
    }

    #[test]
    fn time_stop_is_the_fallback() {
        let mut pos = position();
        pos.opened_at = Utc::now() - Duration::hours(200);
        assert_eq!(
            evaluate(&pos, Some(1), &policy(), Utc::now()),
            ExitDecision::Exit(ExitReason::Time)
        );
    }

    #[test]
    fn decision_is_stable_under_added_triggers() {
        // Once stop loss fires, also crossing the IL and time bounds must not
        // change the chosen reason.
        let mut pos = position();
        pos.last_pnl_pct = -20.0;
        let first = evaluate(&pos, Some(1), &policy(), Utc::now());
        pos.last_il_pct = -50.0;
        pos.opened_at = Utc::now() - Duration::hours(500);
        let second = evaluate(&pos, Some(1), &policy(), Utc::now());
        assert_eq!(first, second);
    }
}
