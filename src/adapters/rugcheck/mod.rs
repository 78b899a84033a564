//! Token-safety scoring service client.
//!
//! The service's raw `score` grows without bound (higher = riskier), so only
//! the normalized 0-100 score is used. Freeze/mint authority must be parsed
//! out of the risks array: the top-level fields can be null even when the
//! risk items report the authority exists.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::domain::safety::TokenSafetyData;
use crate::ports::market_data::{MarketDataError, TokenSafetyPort};

const REPORT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct ApiReport {
    #[serde(default, rename = "score_normalised")]
    score_normalised: u32,
    #[serde(default)]
    rugged: bool,
    #[serde(default)]
    risks: Vec<ApiRisk>,
    #[serde(default, rename = "topHolders")]
    top_holders: Vec<ApiHolder>,
    #[serde(default, rename = "totalHolders")]
    total_holders: u64,
}

#[derive(Debug, Deserialize)]
struct ApiRisk {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    level: String,
}

#[derive(Debug, Deserialize)]
struct ApiHolder {
    #[serde(default)]
    pct: f64,
}

fn normalize(report: ApiReport) -> TokenSafetyData {
    let mut data = TokenSafetyData {
        normalized_score: report.score_normalised,
        rugged: report.rugged,
        total_holders: report.total_holders,
        ..Default::default()
    };

    for risk in &report.risks {
        let name_lower = risk.name.to_lowercase();
        if name_lower.contains("freeze") {
            data.has_freeze_authority = true;
        }
        if name_lower.contains("mint") && name_lower.contains("authority") {
            data.has_mint_authority = true;
        }
        if name_lower.contains("mutable") && name_lower.contains("metadata") {
            data.has_mutable_metadata = true;
        }
        if name_lower.contains("lp provid") {
            data.low_lp_providers = true;
        }
        let display = if risk.description.is_empty() {
            risk.name.clone()
        } else {
            format!("{}: {}", risk.name, risk.description)
        };
        match risk.level.as_str() {
            "danger" => data.dangers.push(display),
            "warn" => data.warnings.push(display),
            _ => {}
        }
    }

    let pcts: Vec<f64> = report.top_holders.iter().map(|h| h.pct).collect();
    data.top10_holder_pct = pcts.iter().take(10).sum();
    data.max_single_holder_pct = pcts.iter().copied().fold(0.0, f64::max);
    data
}

pub struct RugcheckClient {
    http: Client,
    base_url: String,
    cache: Mutex<HashMap<String, (Option<TokenSafetyData>, Instant)>>,
}

impl RugcheckClient {
    pub fn new(base_url: String) -> Result<Self, MarketDataError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MarketDataError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            cache: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl TokenSafetyPort for RugcheckClient {
    async fn token_report(
        &self,
        mint: &str,
    ) -> Result<Option<TokenSafetyData>, MarketDataError> {
        {
            let cache = self.cache.lock().await;
            if let Some((report, at)) = cache.get(mint) {
                if at.elapsed() < REPORT_CACHE_TTL {
                    return Ok(report.clone());
                }
            }
        }

        let url = format!("{}/tokens/{mint}/report", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MarketDataError::Request(e.to_string()))?;

        let report = match response.status() {
            StatusCode::OK => {
                let api: ApiReport = response
                    .json()
                    .await
                    .map_err(|e| MarketDataError::Malformed(e.to_string()))?;
                Some(normalize(api))
            }
            // The service has never seen this mint.
            StatusCode::NOT_FOUND => None,
            status => {
                return Err(MarketDataError::Request(format!(
                    "safety service returned {status}"
                )));
            }
        };

        self.cache
            .lock()
            .await
            .insert(mint.to_string(), (report.clone(), Instant::now()));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_parses_authorities_from_risks() {
        let api: ApiReport = serde_json::from_str(
            r#"{
                "score_normalised": 35,
                "rugged": false,
                "risks": [
                    {"name": "Freeze Authority still enabled", "description": "", "level": "danger"},
                    {"name": "Mint Authority still enabled", "description": "can mint", "level": "danger"},
                    {"name": "Mutable metadata", "description": "", "level": "warn"},
                    {"name": "Low amount of LP Providers", "description": "", "level": "warn"}
                ],
                "topHolders": [
                    {"pct": 12.0}, {"pct": 8.0}, {"pct": 5.0}
                ],
                "totalHolders": 2100
            }"#,
        )
        .unwrap();
        let data = normalize(api);
        assert!(data.has_freeze_authority);
        assert!(data.has_mint_authority);
        assert!(data.has_mutable_metadata);
        assert!(data.low_lp_providers);
        assert_eq!(data.dangers.len(), 2);
        assert_eq!(data.warnings.len(), 2);
        assert!((data.top10_holder_pct - 25.0).abs() < 1e-9);
        assert!((data.max_single_holder_pct - 12.0).abs() < 1e-9);
        assert_eq!(data.total_holders, 2100);
    }

    #[test]
    fn normalize_handles_empty_report() {
        let api: ApiReport = serde_json::from_str("{}").unwrap();
        let data = normalize(api);
        assert_eq!(data.normalized_score, 0);
        assert!(!data.rugged);
        assert_eq!(data.top10_holder_pct, 0.0);
    }
}
