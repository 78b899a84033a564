//! Progressive re-entry penalties.
//!
//! Every exit parks its pool on a cooldown. Stop losses additionally count
//! strikes: each consecutive strike escalates the cooldown through the tier
//! table, and reaching the strike threshold promotes the pool to the
//! permanent blacklist. A take profit clears the strike counter. Ghosts are
//! banned outright. All of it is persisted with the app state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::position::ExitReason;

/// Escalation settings, from the `[cooldowns]` config section.
#[derive(Debug, Clone)]
pub struct CooldownPolicy {
    /// Cooldown seconds per consecutive stop-loss strike; the last tier
    /// repeats for strikes beyond the table. Tier 0 is the base cooldown.
    pub tiers_sec: Vec<u64>,
    /// Consecutive stop losses that trigger a permanent ban.
    pub permanent_strikes: u32,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            tiers_sec: vec![86_400, 172_800],
            permanent_strikes: 3,
        }
    }
}

impl CooldownPolicy {
    fn tier_for(&self, strikes: u32) -> u64 {
        if self.tiers_sec.is_empty() {
            return 0;
        }
        let idx = (strikes.saturating_sub(1) as usize).min(self.tiers_sec.len() - 1);
        self.tiers_sec[idx]
    }

    fn base_tier(&self) -> u64 {
        self.tiers_sec.first().copied().unwrap_or(0)
    }
}

/// A pool sitting out after an exit. Retained past expiry so the strike
/// counter survives until the pool earns a reset or a ban.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub pool_id: String,
    pub since_ts: DateTime<Utc>,
    pub until_ts: DateTime<Utc>,
    pub consecutive_sl_strikes: u32,
}

/// A permanently banned pool. Never reverts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub pool_id: String,
    pub reason: String,
    pub since_ts: DateTime<Utc>,
}

/// The cooldown and blacklist tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PenaltyBook {
    cooldowns: HashMap<String, CooldownEntry>,
    blacklist: HashMap<String, BlacklistEntry>,
}

impl PenaltyBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the pool may be entered at `now`.
    pub fn is_eligible(&self, pool_id: &str, now: DateTime<Utc>) -> bool {
        if self.blacklist.contains_key(pool_id) {
            return false;
        }
        match self.cooldowns.get(pool_id) {
            Some(entry) => now >= entry.until_ts,
            None => true,
        }
    }

    pub fn is_blacklisted(&self, pool_id: &str) -> bool {
        self.blacklist.contains_key(pool_id)
    }

    pub fn strikes(&self, pool_id: &str) -> u32 {
        self.cooldowns
            .get(pool_id)
            .map(|e| e.consecutive_sl_strikes)
            .unwrap_or(0)
    }

    pub fn cooldowns(&self) -> impl Iterator<Item = &CooldownEntry> {
        self.cooldowns.values()
    }

    pub fn blacklist(&self) -> impl Iterator<Item = &BlacklistEntry> {
        self.blacklist.values()
    }

    /// Apply the penalty for a finished trade.
    pub fn record_exit(
        &mut self,
        pool_id: &str,
        reason: ExitReason,
        policy: &CooldownPolicy,
        now: DateTime<Utc>,
    ) {
        if self.blacklist.contains_key(pool_id) {
            return;
        }
        match reason {
            ExitReason::Ghost => {
                self.ban(pool_id, "LP balance went to zero on-chain", now);
            }
            ExitReason::StopLoss => {
                let strikes = self.strikes(pool_id) + 1;
                if strikes >= policy.permanent_strikes {
                    self.ban(
                        pool_id,
                        &format!("{strikes} consecutive stop losses"),
                        now,
                    );
                } else {
                    self.park(pool_id, policy.tier_for(strikes), strikes, now);
                }
            }
            ExitReason::TakeProfit => {
                // Winning exit: strikes reset, base cooldown still applies so
                // the same pool is not immediately re-entered.
                self.park(pool_id, policy.base_tier(), 0, now);
            }
            ExitReason::Il | ExitReason::Time | ExitReason::Manual => {
                let strikes = self.strikes(pool_id);
                self.park(pool_id, policy.base_tier(), strikes, now);
            }
        }
    }

    fn park(&mut self, pool_id: &str, cooldown_sec: u64, strikes: u32, now: DateTime<Utc>) {
        self.cooldowns.insert(
            pool_id.to_string(),
            CooldownEntry {
                pool_id: pool_id.to_string(),
                since_ts: now,
                until_ts: now + Duration::seconds(cooldown_sec as i64),
                consecutive_sl_strikes: strikes,
            },
        );
    }

    fn ban(&mut self, pool_id: &str, reason: &str, now: DateTime<Utc>) {
        self.cooldowns.remove(pool_id);
        self.blacklist.insert(
            pool_id.to_string(),
            BlacklistEntry {
                pool_id: pool_id.to_string(),
                reason: reason.to_string(),
                since_ts: now,
            },
        );
    }

    /// Drop expired zero-strike cooldowns. Entries carrying strikes stay so
    /// the escalation history survives.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.cooldowns
            .retain(|_, e| e.consecutive_sl_strikes > 0 || now < e.until_ts);
    }

    pub fn from_parts(cooldowns: Vec<CooldownEntry>, blacklist: Vec<BlacklistEntry>) -> Self {
        Self {
            cooldowns: cooldowns
                .into_iter()
                .map(|e| (e.pool_id.clone(), e))
                .collect(),
            blacklist: blacklist
                .into_iter()
                .map(|e| (e.pool_id.clone(), e))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CooldownPolicy {
        CooldownPolicy {
            tiers_sec: vec![86_400, 172_800],
            permanent_strikes: 3,
        }
    }

    #[test]
    fn stop_losses_escalate_then_ban() {
        let mut book = PenaltyBook::new();
        let now = Utc::now();

        book.record_exit("amm", ExitReason::StopLoss, &policy(), now);
        assert_eq!(book.strikes("amm"), 1);
        let entry = book.cooldowns.get("amm").unwrap();
        assert_eq!((entry.until_ts - entry.since_ts).num_seconds(), 86_400);
        assert!(!book.is_eligible("amm", now));
        assert!(book.is_eligible("amm", now + Duration::seconds(86_401)));

        book.record_exit("amm", ExitReason::StopLoss, &policy(), now);
        assert_eq!(book.strikes("amm"), 2);
        let entry = book.cooldowns.get("amm").unwrap();
        assert_eq!((entry.until_ts - entry.since_ts).num_seconds(), 172_800);

        book.record_exit("amm", ExitReason::StopLoss, &policy(), now);
        assert!(book.is_blacklisted("amm"));
        assert!(!book.is_eligible("amm", now + Duration::days(365)));
    }

    #[test]
    fn take_profit_resets_strikes() {
        let mut book = PenaltyBook::new();
        let now = Utc::now();
        book.record_exit("amm", ExitReason::StopLoss, &policy(), now);
        book.record_exit("amm", ExitReason::StopLoss, &policy(), now);
        assert_eq!(book.strikes("amm"), 2);

        book.record_exit("amm", ExitReason::TakeProfit, &policy(), now);
        assert_eq!(book.strikes("amm"), 0);
        // base-tier cooldown still applies
        let entry = book.cooldowns.get("amm").unwrap();
        assert_eq!((entry.until_ts - entry.since_ts).num_seconds(), 86_400);
        // next stop loss starts back at tier 0
        book.record_exit("amm", ExitReason::StopLoss, &policy(), now);
        assert_eq!(book.strikes("amm"), 1);
    }

    #[test]
    fn il_and_time_leave_strikes_alone() {
        let mut book = PenaltyBook::new();
        let now = Utc::now();
        book.record_exit("amm", ExitReason::StopLoss, &policy(), now);
        book.record_exit("amm", ExitReason::Il, &policy(), now);
        assert_eq!(book.strikes("amm"), 1);
        book.record_exit("amm", ExitReason::Time, &policy(), now);
        assert_eq!(book.strikes("amm"), 1);
        assert!(!book.is_blacklisted("amm"));
    }

    #[test]
    fn ghost_bans_immediately() {
        let mut book = PenaltyBook::new();
        let now = Utc::now();
        book.record_exit("amm", ExitReason::Ghost, &policy(), now);
        assert!(book.is_blacklisted("amm"));
        assert!(book.cooldowns.is_empty());
    }

    #[test]
    fn bans_never_revert() {
        let mut book = PenaltyBook::new();
        let now = Utc::now();
        book.record_exit("amm", ExitReason::Ghost, &policy(), now);
        // later winning exits change nothing
        book.record_exit("amm", ExitReason::TakeProfit, &policy(), now);
        assert!(book.is_blacklisted("amm"));
        assert!(!book.is_eligible("amm", now + Duration::days(3650)));
    }

    #[test]
    fn strikes_beyond_tier_table_use_last_tier() {
        let one_tier = CooldownPolicy {
            tiers_sec: vec![3_600],
            permanent_strikes: 10,
        };
        let mut book = PenaltyBook::new();
        let now = Utc::now();
        for _ in 0..4 {
            book.record_exit("amm", ExitReason::StopLoss, &one_tier, now);
        }
        let entry = book.cooldowns.get("amm").unwrap();
        assert_eq!((entry.until_ts - entry.since_ts).num_seconds(), 3_600);
        assert_eq!(book.strikes("amm"), 4);
    }

    #[test]
    fn prune_keeps_strike_history() {
        let mut book = PenaltyBook::new();
        let now = Utc::now();
        book.record_exit("struck", ExitReason::StopLoss, &policy(), now);
        book.record_exit("clean", ExitReason::TakeProfit, &policy(), now);
        let later = now + Duration::days(30);
        book.prune(later);
        assert_eq!(book.strikes("struck"), 1);
        assert!(book.cooldowns.get("clean").is_none());
    }

    #[test]
    fn cooldown_until_after_since() {
        let mut book = PenaltyBook::new();
        let now = Utc::now();
        book.record_exit("amm", ExitReason::Manual, &policy(), now);
        for entry in book.cooldowns() {
            assert!(entry.until_ts >= entry.since_ts);
        }
    }

    #[test]
    fn round_trips_through_parts() {
        let mut book = PenaltyBook::new();
        let now = Utc::now();
        book.record_exit("a", ExitReason::StopLoss, &policy(), now);
        book.record_exit("b", ExitReason::Ghost, &policy(), now);
        let cooldowns: Vec<_> = book.cooldowns().cloned().collect();
        let blacklist: Vec<_> = book.blacklist().cloned().collect();
        let rebuilt = PenaltyBook::from_parts(cooldowns, blacklist);
        assert_eq!(rebuilt.strikes("a"), 1);
        assert!(rebuilt.is_blacklisted("b"));
    }
}
