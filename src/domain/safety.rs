//! Multi-layer pool admission screen.
//!
//! Three independent rug filters, evaluated in order with short-circuit on
//! the first hard rejection: LP burn percentage, on-chain LP-lock analysis,
//! and the external token-safety report. Every failure reason is preserved
//! for logging; a single failed layer rejects the pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::domain::known_addresses::{
    is_burn_address, is_locker_program, AMM_LP_AUTHORITY, SYSTEM_PROGRAM,
};
use crate::domain::pool::Pool;
use crate::ports::chain::ChainQueryPort;
use crate::ports::market_data::TokenSafetyPort;

/// How long an on-chain LP-lock analysis stays fresh.
const LOCK_CACHE_TTL: Duration = Duration::from_secs(300);

/// Verdict of the three-layer screen for one pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyReport {
    pub burn_ok: bool,
    pub lp_lock_ok: bool,
    pub token_ok: bool,
    /// Hard-rejection reasons, in evaluation order.
    pub reasons: Vec<String>,
    /// Non-fatal observations (data gaps, borderline figures).
    pub warnings: Vec<String>,
}

impl SafetyReport {
    pub fn is_safe(&self) -> bool {
        self.burn_ok && self.lp_lock_ok && self.token_ok
    }
}

/// Screen thresholds, from the `[token_safety]` and `[lp_lock]` config
/// sections.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    pub min_burn_pct: f64,
    pub check_lp_lock: bool,
    pub min_safe_lp_pct: f64,
    pub max_single_lp_holder_pct: f64,
    pub check_token_safety: bool,
    pub max_token_score: u32,
    pub max_top10_holder_pct: f64,
    pub max_single_holder_pct: f64,
    pub min_token_holders: u64,
}

/// Classification of one LP token holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderClass {
    Burned,
    ProtocolLocked,
    ContractLocked,
    Unlocked,
}

/// Aggregate LP distribution derived from the top holders.
#[derive(Debug, Clone, Default)]
pub struct LpLockBreakdown {
    pub total_supply: u64,
    pub burned_pct: f64,
    pub protocol_pct: f64,
    pub contract_pct: f64,
    pub unlocked_pct: f64,
    pub max_single_unlocked_pct: f64,
}

impl LpLockBreakdown {
    /// Burned + protocol-held + contract-locked, as a percentage of supply.
    pub fn safe_pct(&self) -> f64 {
        self.burned_pct + self.protocol_pct + self.contract_pct
    }
}

/// Normalized token-safety report from the external scoring service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenSafetyData {
    /// Normalized risk score, 0-100, lower is safer.
    pub normalized_score: u32,
    pub rugged: bool,
    pub dangers: Vec<String>,
    pub warnings: Vec<String>,
    pub has_freeze_authority: bool,
    pub has_mint_authority: bool,
    pub has_mutable_metadata: bool,
    pub low_lp_providers: bool,
    pub top10_holder_pct: f64,
    pub max_single_holder_pct: f64,
    pub total_holders: u64,
}

/// Classify one holder by its token authority and that authority's owner.
pub fn classify_holder(
    address: &str,
    authority: Option<&str>,
    authority_owner: Option<&str>,
) -> HolderClass {
    if is_burn_address(address) {
        return HolderClass::Burned;
    }
    match authority {
        Some(auth) if is_burn_address(auth) => HolderClass::Burned,
        // Token account gone / authority resolved to the system program:
        // closed after burn.
        Some(SYSTEM_PROGRAM) | None => HolderClass::Burned,
        Some(AMM_LP_AUTHORITY) => HolderClass::ProtocolLocked,
        Some(auth) if is_locker_program(auth) => HolderClass::ContractLocked,
        Some(_) if authority_owner.is_some_and(is_locker_program) => HolderClass::ContractLocked,
        Some(_) => HolderClass::Unlocked,
    }
}

/// Aggregate the top holders into a distribution breakdown.
///
/// The top ~20 accounts rarely cover 100% of supply; the uncovered remainder
/// is by definition spread across small holders, so it counts as unlocked
/// without contributing a single-whale figure.
pub fn classify_lp_holders(
    total_supply: u64,
    holders: &[(String, u64)],
    authorities: &HashMap<String, String>,
    authority_owners: &HashMap<String, String>,
) -> LpLockBreakdown {
    if total_supply == 0 {
        return LpLockBreakdown {
            unlocked_pct: 100.0,
            max_single_unlocked_pct: 100.0,
            ..Default::default()
        };
    }

    let mut burned: u128 = 0;
    let mut protocol: u128 = 0;
    let mut contract: u128 = 0;
    let mut unlocked: u128 = 0;
    let mut max_single_unlocked: u64 = 0;

    for (address, amount) in holders {
        if *amount == 0 {
            continue;
        }
        let authority = authorities.get(address).map(String::as_str);
        let owner = authority.and_then(|a| authority_owners.get(a)).map(String::as_str);
        match classify_holder(address, authority, owner) {
            HolderClass::Burned => burned += *amount as u128,
            HolderClass::ProtocolLocked => protocol += *amount as u128,
            HolderClass::ContractLocked => contract += *amount as u128,
            HolderClass::Unlocked => {
                unlocked += *amount as u128;
                max_single_unlocked = max_single_unlocked.max(*amount);
            }
        }
    }

    let covered = burned + protocol + contract + unlocked;
    let uncovered = (total_supply as u128).saturating_sub(covered);
    unlocked += uncovered;

    let pct = |amount: u128| (amount as f64 / total_supply as f64) * 100.0;
    LpLockBreakdown {
        total_supply,
        burned_pct: pct(burned),
        protocol_pct: pct(protocol),
        contract_pct: pct(contract),
        unlocked_pct: pct(unlocked),
        max_single_unlocked_pct: pct(max_single_unlocked as u128),
    }
}

/// Hard-rejection reasons from an LP distribution, empty when safe.
pub fn evaluate_lp_lock(breakdown: &LpLockBreakdown, policy: &SafetyPolicy) -> Vec<String> {
    let mut reasons = Vec::new();
    if breakdown.safe_pct() < policy.min_safe_lp_pct {
        reasons.push(format!(
            "only {:.1}% of LP is burned or locked (min: {}%)",
            breakdown.safe_pct(),
            policy.min_safe_lp_pct
        ));
    }
    if breakdown.max_single_unlocked_pct > policy.max_single_lp_holder_pct {
        reasons.push(format!(
            "single wallet holds {:.1}% of LP (max: {}%)",
            breakdown.max_single_unlocked_pct, policy.max_single_lp_holder_pct
        ));
    }
    reasons
}

/// Hard-rejection reasons from a token-safety report, empty when safe.
pub fn evaluate_token_report(data: &TokenSafetyData, policy: &SafetyPolicy) -> Vec<String> {
    let mut reasons = Vec::new();
    if data.rugged {
        reasons.push("token flagged as rugged by the safety service".to_string());
    }
    if data.normalized_score > policy.max_token_score {
        reasons.push(format!(
            "token risk score {} (max allowed: {})",
            data.normalized_score, policy.max_token_score
        ));
    }
    for danger in &data.dangers {
        reasons.push(format!("danger-level risk: {danger}"));
    }
    if data.has_freeze_authority {
        reasons.push("token has freeze authority".to_string());
    }
    if data.has_mint_authority {
        reasons.push("token has mint authority".to_string());
    }
    if data.has_mutable_metadata {
        reasons.push("token metadata is mutable".to_string());
    }
    if data.low_lp_providers {
        reasons.push("very few LP providers".to_string());
    }
    if data.top10_holder_pct > policy.max_top10_holder_pct {
        reasons.push(format!(
            "top 10 holders own {:.1}% (max: {}%)",
            data.top10_holder_pct, policy.max_top10_holder_pct
        ));
    }
    if data.max_single_holder_pct > policy.max_single_holder_pct {
        reasons.push(format!(
            "single holder owns {:.1}% (max: {}%)",
            data.max_single_holder_pct, policy.max_single_holder_pct
        ));
    }
    if data.total_holders < policy.min_token_holders {
        reasons.push(format!(
            "only {} holders (min: {})",
            data.total_holders, policy.min_token_holders
        ));
    }
    reasons
}

/// The stateful screen: policy + collaborator ports + a short-lived cache of
/// LP-lock analyses, reused across scan cycles.
pub struct SafetyScreen {
    policy: SafetyPolicy,
    chain: Arc<dyn ChainQueryPort>,
    token_safety: Arc<dyn TokenSafetyPort>,
    lock_cache: Mutex<HashMap<String, (LpLockBreakdown, Instant)>>,
}

impl SafetyScreen {
    pub fn new(
        policy: SafetyPolicy,
        chain: Arc<dyn ChainQueryPort>,
        token_safety: Arc<dyn TokenSafetyPort>,
    ) -> Self {
        Self {
            policy,
            chain,
            token_safety,
            lock_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Run all three layers against one pool. The first failing layer
    /// short-circuits the rest.
    pub async fn screen(&self, pool: &Pool) -> SafetyReport {
        let mut report = SafetyReport {
            burn_ok: true,
            lp_lock_ok: true,
            token_ok: true,
            reasons: Vec::new(),
            warnings: Vec::new(),
        };

        // Layer 1: LP burn from the listing data.
        if pool.burn_pct < self.policy.min_burn_pct {
            report.burn_ok = false;
            report.reasons.push(format!(
                "LP burn {:.1}% below minimum {}%",
                pool.burn_pct, self.policy.min_burn_pct
            ));
            return report;
        }

        // Layer 2: on-chain LP-lock distribution.
        if self.policy.check_lp_lock {
            match self.lp_lock_breakdown(&pool.lp_mint).await {
                Some(breakdown) => {
                    let reasons = evaluate_lp_lock(&breakdown, &self.policy);
                    if !reasons.is_empty() {
                        report.lp_lock_ok = false;
                        report.reasons.extend(reasons);
                        return report;
                    }
                }
                None => {
                    // Missing data is not proof of danger, but it is not
                    // proof of safety either: reject.
                    report.lp_lock_ok = false;
                    report
                        .reasons
                        .push("LP lock data unavailable on-chain".to_string());
                    return report;
                }
            }
        }

        // Layer 3: external token-safety score on the risked mint.
        if self.policy.check_token_safety {
            let Some(mint) = pool.risked_mint() else {
                report.token_ok = false;
                report.reasons.push("pool has no WSOL side".to_string());
                return report;
            };
            match self.token_safety.token_report(mint).await {
                Ok(Some(data)) => {
                    report
                        .warnings
                        .extend(data.warnings.iter().map(|w| format!("safety warning: {w}")));
                    let reasons = evaluate_token_report(&data, &self.policy);
                    if !reasons.is_empty() {
                        report.token_ok = false;
                        report.reasons.extend(reasons);
                    }
                }
                Ok(None) => {
                    report
                        .warnings
                        .push("token safety report unavailable".to_string());
                }
                Err(err) => {
                    report
                        .warnings
                        .push(format!("token safety lookup failed: {err}"));
                }
            }
        }

        report
    }

    /// Fetch top holders + supply and classify them, with a 5-minute cache
    /// keyed by LP mint. The two bulk lookups run sequentially.
    async fn lp_lock_breakdown(&self, lp_mint: &str) -> Option<LpLockBreakdown> {
        {
            let cache = self.lock_cache.lock().await;
            if let Some((breakdown, at)) = cache.get(lp_mint) {
                if at.elapsed() < LOCK_CACHE_TTL {
                    return Some(breakdown.clone());
                }
            }
        }

        let total_supply = self.chain.token_supply(lp_mint).await.ok()?;
        if total_supply == 0 {
            return None;
        }
        let holders = self.chain.largest_token_accounts(lp_mint).await.ok()?;
        if holders.is_empty() {
            return None;
        }

        let addresses: Vec<String> = holders.iter().map(|(addr, _)| addr.clone()).collect();
        let authorities = self.chain.account_authorities(&addresses).await.ok()?;

        // Second-level lookup: which program owns each authority? Skip the
        // ones classification resolves without it.
        let candidates: Vec<String> = authorities
            .values()
            .filter(|a| {
                a.as_str() != SYSTEM_PROGRAM
                    && a.as_str() != AMM_LP_AUTHORITY
                    && !is_burn_address(a)
            })
            .cloned()
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        let authority_owners = if candidates.is_empty() {
            HashMap::new()
        } else {
            self.chain.account_owners(&candidates).await.unwrap_or_default()
        };

        let breakdown =
            classify_lp_holders(total_supply, &holders, &authorities, &authority_owners);
        self.lock_cache
            .lock()
            .await
            .insert(lp_mint.to_string(), (breakdown.clone(), Instant::now()));
        Some(breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SafetyPolicy {
        SafetyPolicy {
            min_burn_pct: 50.0,
            check_lp_lock: true,
            min_safe_lp_pct: 50.0,
            max_single_lp_holder_pct: 25.0,
            check_token_safety: true,
            max_token_score: 60,
            max_top10_holder_pct: 50.0,
            max_single_holder_pct: 20.0,
            min_token_holders: 100,
        }
    }

    #[test]
    fn classify_burned_and_locked() {
        assert_eq!(
            classify_holder("1nc1nerator11111111111111111111111111111111", None, None),
            HolderClass::Burned
        );
        assert_eq!(
            classify_holder("acct", Some(SYSTEM_PROGRAM), None),
            HolderClass::Burned
        );
        assert_eq!(
            classify_holder("acct", Some(AMM_LP_AUTHORITY), None),
            HolderClass::ProtocolLocked
        );
        assert_eq!(
            classify_holder(
                "acct",
                Some("strmRqUCoQUgGUan5YhzUZa6KqdzwX5L6FpUxfmKg5m"),
                None
            ),
            HolderClass::ContractLocked
        );
        // authority is a PDA of a locker program
        assert_eq!(
            classify_holder(
                "acct",
                Some("somePda"),
                Some("LocpQgucEQHbqNABEYvBMrzJKjWcjEPPwd6i215cQ9a")
            ),
            HolderClass::ContractLocked
        );
        assert_eq!(
            classify_holder("acct", Some("regularWallet"), Some(SYSTEM_PROGRAM)),
            HolderClass::Unlocked
        );
    }

    #[test]
    fn breakdown_counts_uncovered_as_unlocked() {
        let holders = vec![
            ("burn".to_string(), 400u64),
            ("whale".to_string(), 100u64),
        ];
        let mut authorities = HashMap::new();
        authorities.insert("burn".to_string(), SYSTEM_PROGRAM.to_string());
        authorities.insert("whale".to_string(), "wallet1".to_string());
        let breakdown = classify_lp_holders(1000, &holders, &authorities, &HashMap::new());
        assert!((breakdown.burned_pct - 40.0).abs() < 1e-9);
        // 100 whale + 500 uncovered
        assert!((breakdown.unlocked_pct - 60.0).abs() < 1e-9);
        assert!((breakdown.max_single_unlocked_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn lp_lock_rejects_low_safe_share() {
        let breakdown = LpLockBreakdown {
            total_supply: 1000,
            burned_pct: 30.0,
            protocol_pct: 10.0,
            contract_pct: 5.0,
            unlocked_pct: 55.0,
            max_single_unlocked_pct: 12.0,
        };
        let reasons = evaluate_lp_lock(&breakdown, &policy());
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("45.0%"));
    }

    #[test]
    fn lp_lock_rejects_single_whale() {
        let breakdown = LpLockBreakdown {
            total_supply: 1000,
            burned_pct: 70.0,
            protocol_pct: 0.0,
            contract_pct: 0.0,
            unlocked_pct: 30.0,
            max_single_unlocked_pct: 28.0,
        };
        let reasons = evaluate_lp_lock(&breakdown, &policy());
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("single wallet"));
    }

    mod screen {
        use super::*;
        use crate::domain::pool::{Pool, WSOL_MINT};
        use crate::ports::mocks::{MockChainQuery, MockTokenSafety};

        fn pool() -> Pool {
            Pool {
                pool_id: "amm".to_string(),
                name: "TOK/WSOL".to_string(),
                lp_mint: "lp-amm".to_string(),
                lp_decimals: 9,
                base_mint: "TokMint".to_string(),
                quote_mint: WSOL_MINT.to_string(),
                base_decimals: 9,
                quote_decimals: 9,
                tvl_usd: 80_000.0,
                volume_24h_usd: 120_000.0,
                apr_24h_pct: 180.0,
                burn_pct: 97.0,
                fee_tier_bps: 25,
                open_time: 0,
                price_ratio: 0.004,
            }
        }

        fn screen_with(
            chain: std::sync::Arc<MockChainQuery>,
            safety: std::sync::Arc<MockTokenSafety>,
        ) -> SafetyScreen {
            SafetyScreen::new(super::policy(), chain, safety)
        }

        fn script_burned_supply(chain: &MockChainQuery) {
            chain.set_supply("lp-amm", 1_000_000);
            chain.set_holders("lp-amm", vec![("burn-acct".to_string(), 950_000)]);
            chain.set_authority("burn-acct", SYSTEM_PROGRAM);
        }

        #[tokio::test]
        async fn low_burn_short_circuits_before_any_lookup() {
            let chain = MockChainQuery::new();
            let safety = MockTokenSafety::new();
            let screen = screen_with(chain.clone(), safety);

            let mut p = pool();
            p.burn_pct = 10.0;
            let report = screen.screen(&p).await;
            assert!(!report.burn_ok);
            assert!(!report.is_safe());
            // The LP-lock layer was never consulted: no supply scripted, yet
            // its "data unavailable" reason is absent.
            assert_eq!(report.reasons.len(), 1);
            assert!(report.reasons[0].contains("LP burn"));
        }

        #[tokio::test]
        async fn whale_lp_holder_rejects() {
            let chain = MockChainQuery::new();
            chain.set_supply("lp-amm", 1_000_000);
            chain.set_holders(
                "lp-amm",
                vec![
                    ("burn-acct".to_string(), 600_000),
                    ("whale-acct".to_string(), 300_000),
                ],
            );
            chain.set_authority("burn-acct", SYSTEM_PROGRAM);
            chain.set_authority("whale-acct", "SomeWallet");
            let screen = screen_with(chain, MockTokenSafety::new());

            let report = screen.screen(&pool()).await;
            assert!(report.burn_ok);
            assert!(!report.lp_lock_ok);
            assert!(report.reasons.iter().any(|r| r.contains("single wallet")));
        }

        #[tokio::test]
        async fn missing_lock_data_rejects() {
            let screen = screen_with(MockChainQuery::new(), MockTokenSafety::new());
            let report = screen.screen(&pool()).await;
            assert!(!report.lp_lock_ok);
            assert!(report.reasons.iter().any(|r| r.contains("unavailable")));
        }

        #[tokio::test]
        async fn risky_token_rejects_after_lock_passes() {
            let chain = MockChainQuery::new();
            script_burned_supply(&chain);
            let safety = MockTokenSafety::new();
            safety.set_report(
                "TokMint",
                TokenSafetyData {
                    normalized_score: 95,
                    total_holders: 5_000,
                    ..Default::default()
                },
            );
            let screen = screen_with(chain, safety);

            let report = screen.screen(&pool()).await;
            assert!(report.lp_lock_ok);
            assert!(!report.token_ok);
            assert!(report.reasons.iter().any(|r| r.contains("risk score")));
        }

        #[tokio::test]
        async fn clean_pool_passes_all_layers() {
            let chain = MockChainQuery::new();
            script_burned_supply(&chain);
            let safety = MockTokenSafety::new();
            safety.set_report(
                "TokMint",
                TokenSafetyData {
                    normalized_score: 4,
                    top10_holder_pct: 18.0,
                    max_single_holder_pct: 4.0,
                    total_holders: 9_000,
                    ..Default::default()
                },
            );
            let screen = screen_with(chain, safety);

            let report = screen.screen(&pool()).await;
            assert!(report.is_safe(), "unexpected reasons: {:?}", report.reasons);
        }

        #[tokio::test]
        async fn absent_token_report_is_a_warning_not_a_rejection() {
            let chain = MockChainQuery::new();
            script_burned_supply(&chain);
            let screen = screen_with(chain, MockTokenSafety::new());

            let report = screen.screen(&pool()).await;
            assert!(report.is_safe());
            assert!(report.warnings.iter().any(|w| w.contains("unavailable")));
        }
    }

    #[test]
    fn token_report_collects_every_reason() {
        let data = TokenSafetyData {
            normalized_score: 85,
            rugged: true,
            dangers: vec!["Freeze Authority still enabled".to_string()],
            has_freeze_authority: true,
            has_mint_authority: true,
            top10_holder_pct: 72.0,
            max_single_holder_pct: 35.0,
            total_holders: 12,
            ..Default::default()
        };
        let reasons = evaluate_token_report(&data, &policy());
        assert!(reasons.len() >= 7);
    }

    #[test]
    fn clean_token_report_passes() {
        let data = TokenSafetyData {
            normalized_score: 5,
            top10_holder_pct: 22.0,
            max_single_holder_pct: 6.0,
            total_holders: 4200,
            ..Default::default()
        };
        assert!(evaluate_token_report(&data, &policy()).is_empty());
    }
}
