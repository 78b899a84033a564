//! Terminal status rendering.
//!
//! The display worker captures a snapshot under the state lock and renders it
//! afterwards, so slow terminals never hold the engine up. Rendering is plain
//! stdout; structured events go through tracing separately.

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::domain::position::Position;
use crate::domain::state::AppState;

/// What the display worker copies out from under the lock.
pub struct Snapshot {
    pub positions: Vec<Position>,
    pub deployed_sol: f64,
    pub cooldown_count: usize,
    pub blacklist_count: usize,
    pub tracked_pools: usize,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn capture(state: &AppState, _config: &Config) -> Self {
        let now = Utc::now();
        Self {
            positions: state.open_positions().cloned().collect(),
            deployed_sol: state.deployed_sol(),
            cooldown_count: state.penalties.cooldowns().count(),
            blacklist_count: state.penalties.blacklist().count(),
            tracked_pools: state.snapshots.pool_count(),
            captured_at: now,
        }
    }
}

fn usd(sol: f64, sol_price: f64) -> String {
    if sol_price > 0.0 {
        format!("{sol:.4} SOL (${:.2})", sol * sol_price)
    } else {
        format!("{sol:.4} SOL")
    }
}

/// Render a status block to stdout.
pub fn render(snapshot: &Snapshot, balance_sol: f64, sol_price: f64, config: &Config) {
    let line = "─".repeat(60);
    println!("\n{line}");
    println!(
        "status {} | mode: {}",
        snapshot.captured_at.format("%Y-%m-%d %H:%M:%S"),
        if config.trading.dry_run {
            "DRY RUN"
        } else if config.trading.enabled {
            "LIVE"
        } else {
            "DISABLED"
        }
    );
    if sol_price > 0.0 {
        println!("SOL price: ${sol_price:.2}");
    }
    println!("{line}");
    println!(
        "positions: {}/{}  |  deployed: {}  |  available: {}",
        snapshot.positions.len(),
        config.sizing.max_concurrent_positions,
        usd(snapshot.deployed_sol, sol_price),
        usd(balance_sol, sol_price),
    );
    println!(
        "cooldowns: {}  |  blacklisted: {}  |  pools tracked: {}",
        snapshot.cooldown_count, snapshot.blacklist_count, snapshot.tracked_pools
    );

    let total_pnl: f64 = snapshot.positions.iter().map(|p| p.unrealized_pnl_sol()).sum();
    if !snapshot.positions.is_empty() {
        println!("unrealized P&L: {:+.4} SOL", total_pnl);
        println!();
        for position in &snapshot.positions {
            render_position(position, sol_price, config, snapshot.captured_at);
        }
    }
    println!("{line}\n");
}

fn render_position(position: &Position, sol_price: f64, config: &Config, now: DateTime<Utc>) {
    let pnl = position.last_pnl_pct;
    let icon = if pnl > 0.0 {
        "+"
    } else if pnl < -0.5 {
        "-"
    } else {
        "."
    };

    let held = position.hold_hours(now);
    let left = (config.exits.max_hold_hours - held).max(0.0);
    let time_str = if held < 1.0 {
        format!("{:.0}m", held * 60.0)
    } else {
        format!("{held:.1}h")
    };

    // Flag whichever exit trigger is closest.
    let mut near = Vec::new();
    if pnl <= config.exits.stop_loss_pct + 1.0 {
        near.push("SL");
    }
    if pnl >= config.exits.take_profit_pct - 1.5 {
        near.push("TP");
    }
    if position.last_il_pct <= config.exits.max_il_pct + 1.0 {
        near.push("IL");
    }
    if left < 2.0 {
        near.push("time");
    }
    let near_str = if near.is_empty() {
        String::new()
    } else {
        format!("  ! near: {}", near.join(", "))
    };

    // IL is tiny for typical moves; show extra precision below 1%.
    let il_str = if position.last_il_pct.abs() < 1.0 {
        format!("{:.4}%", position.last_il_pct)
    } else {
        format!("{:.2}%", position.last_il_pct)
    };

    println!(
        "  [{icon}] {}  held {time_str} ({left:.0}h left)",
        position.pool_name
    );
    println!(
        "      entry {} -> value {}  |  P&L {:+.4} SOL ({pnl:+.2}%)  |  IL {il_str}{near_str}",
        usd(position.entry_amount_sol, sol_price),
        usd(position.last_value_sol, sol_price),
        position.unrealized_pnl_sol(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_captures_counts() {
        let mut state = AppState::new();
        state
            .open(Position::new(
                "amm", "TOK/WSOL", "lp", 9, 1.0, 0.5, 1_000, Utc::now(),
            ))
            .unwrap();
        state.snapshots.record("amm", 1.0, 2.0, 3.0);
        let snapshot = Snapshot::capture(&state, &Config::default());
        assert_eq!(snapshot.positions.len(), 1);
        assert!((snapshot.deployed_sol - 0.5).abs() < 1e-9);
        assert_eq!(snapshot.tracked_pools, 1);
    }

    #[test]
    fn usd_formats_with_and_without_price() {
        assert_eq!(usd(1.5, 100.0), "1.5000 SOL ($150.00)");
        assert_eq!(usd(1.5, 0.0), "1.5000 SOL");
    }
}
