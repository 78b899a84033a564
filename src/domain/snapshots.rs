//! Rolling per-pool observation window.
//!
//! The listing API only exposes 24h aggregates, so the tracker records one
//! observation per scan cycle and derives short-term signals from the window:
//! price stability (feeds the scorer's IL factor) and TVL drift. History is
//! persisted with the rest of the app state so restarts keep the window.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observations kept per pool. At the default 3-minute scan interval this is
/// roughly a 30-minute window.
pub const MAX_SNAPSHOTS: usize = 10;

/// Window needed before the tracker reports anything.
const MIN_SNAPSHOTS: usize = 3;

/// Single point-in-time observation for one pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub volume_24h_usd: f64,
    pub tvl_usd: f64,
    pub price_ratio: f64,
}

/// Rolling snapshot history for all scanned pools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotTracker {
    history: HashMap<String, VecDeque<Snapshot>>,
}

impl SnapshotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation, evicting the oldest beyond [`MAX_SNAPSHOTS`].
    pub fn record(&mut self, pool_id: &str, volume_24h_usd: f64, tvl_usd: f64, price_ratio: f64) {
        let window = self.history.entry(pool_id.to_string()).or_default();
        window.push_back(Snapshot {
            taken_at: Utc::now(),
            volume_24h_usd,
            tvl_usd,
            price_ratio,
        });
        while window.len() > MAX_SNAPSHOTS {
            window.pop_front();
        }
    }

    /// Price-stability score in [0, 100], or `None` without enough history.
    ///
    /// LPs earn fees from flow in both directions; what hurts is the price
    /// leaving its range. Max deviation from the window mean ≤ 2% scores 100,
    /// decaying linearly to 0 at 10%.
    pub fn price_stability(&self, pool_id: &str) -> Option<f64> {
        let window = self.history.get(pool_id)?;
        if window.len() < MIN_SNAPSHOTS {
            return None;
        }
        let prices: Vec<f64> = window
            .iter()
            .map(|s| s.price_ratio)
            .filter(|p| *p > 0.0)
            .collect();
        if prices.len() < 2 {
            return None;
        }
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        if mean <= 0.0 {
            return None;
        }
        let max_deviation = prices
            .iter()
            .map(|p| (p - mean).abs() / mean)
            .fold(0.0, f64::max);
        let score = if max_deviation <= 0.02 {
            100.0
        } else if max_deviation >= 0.10 {
            0.0
        } else {
            100.0 * (1.0 - (max_deviation - 0.02) / 0.08)
        };
        Some(score)
    }

    /// TVL drift over the window as a fraction (−0.2 = 20% drained).
    pub fn tvl_drift(&self, pool_id: &str) -> Option<f64> {
        let window = self.history.get(pool_id)?;
        if window.len() < 2 {
            return None;
        }
        let first = window.front()?.tvl_usd;
        let last = window.back()?.tvl_usd;
        if first <= 0.0 {
            return None;
        }
        Some((last - first) / first)
    }

    pub fn pool_count(&self) -> usize {
        self.history.len()
    }

    /// Drop a pool's history, e.g. after exiting its position.
    pub fn clear_pool(&mut self, pool_id: &str) {
        self.history.remove(pool_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_three_snapshots() {
        let mut tracker = SnapshotTracker::new();
        tracker.record("p", 100.0, 1000.0, 1.0);
        tracker.record("p", 100.0, 1000.0, 1.0);
        assert!(tracker.price_stability("p").is_none());
        tracker.record("p", 100.0, 1000.0, 1.0);
        assert_eq!(tracker.price_stability("p"), Some(100.0));
    }

    #[test]
    fn tight_range_scores_full() {
        let mut tracker = SnapshotTracker::new();
        for price in [1.0, 1.01, 0.995] {
            tracker.record("p", 100.0, 1000.0, price);
        }
        assert_eq!(tracker.price_stability("p"), Some(100.0));
    }

    #[test]
    fn wild_swings_score_zero() {
        let mut tracker = SnapshotTracker::new();
        for price in [1.0, 1.5, 0.7] {
            tracker.record("p", 100.0, 1000.0, price);
        }
        assert_eq!(tracker.price_stability("p"), Some(0.0));
    }

    #[test]
    fn window_is_bounded() {
        let mut tracker = SnapshotTracker::new();
        for i in 0..25 {
            tracker.record("p", i as f64, 1000.0, 1.0);
        }
        assert_eq!(tracker.history["p"].len(), MAX_SNAPSHOTS);
        // oldest entries were evicted
        assert!(tracker.history["p"].front().unwrap().volume_24h_usd >= 15.0);
    }

    #[test]
    fn tvl_drift_signed() {
        let mut tracker = SnapshotTracker::new();
        tracker.record("p", 0.0, 1000.0, 1.0);
        tracker.record("p", 0.0, 800.0, 1.0);
        let drift = tracker.tvl_drift("p").unwrap();
        assert!((drift + 0.2).abs() < 1e-9);
    }

    #[test]
    fn clear_pool_removes_history() {
        let mut tracker = SnapshotTracker::new();
        tracker.record("p", 0.0, 1000.0, 1.0);
        assert_eq!(tracker.pool_count(), 1);
        tracker.clear_pool("p");
        assert_eq!(tracker.pool_count(), 0);
    }
}
