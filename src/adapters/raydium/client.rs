//! Pool directory over the listing service's REST API.
//!
//! Fetches WSOL-quoted constant-product pools with two sort strategies
//! (by liquidity and by 24h volume), merged and deduplicated, so both
//! deep-liquidity and high-activity pools surface. The complete result is
//! cached; on a fetch failure the stale cache is served rather than blocking
//! the scan worker.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;

use crate::domain::known_addresses::AMM_V4_PROGRAM;
use crate::domain::pool::{Pool, WSOL_MINT};
use crate::ports::market_data::{MarketDataError, PoolDirectoryPort};

use super::types::{ApiEnvelope, ApiPage, ApiPool};

const PAGE_SIZE: u32 = 100;
/// Per sort field, so the hard cap is ~1000 pools per strategy.
const MAX_PAGES: u32 = 10;
const SORT_FIELDS: [&str; 2] = ["liquidity", "volume24h"];

pub struct PoolDirectory {
    http: Client,
    base_url: String,
    cache_ttl: Duration,
    cache: Mutex<Option<(Vec<Pool>, Instant)>>,
}

impl PoolDirectory {
    pub fn new(base_url: String, cache_ttl_sec: u64) -> Result<Self, MarketDataError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MarketDataError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            cache_ttl: Duration::from_secs(cache_ttl_sec),
            cache: Mutex::new(None),
        })
    }

    async fn fetch_page(
        &self,
        sort_field: &str,
        page: u32,
        mint2: Option<&str>,
    ) -> Result<ApiPage, MarketDataError> {
        let mut url = format!(
            "{}/pools/info/mint?mint1={WSOL_MINT}&poolType=standard&poolSortField={sort_field}&sortType=desc&pageSize={PAGE_SIZE}&page={page}",
            self.base_url
        );
        if let Some(mint) = mint2 {
            url.push_str(&format!("&mint2={mint}"));
        }
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MarketDataError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(MarketDataError::Request(format!(
                "listing service returned {}",
                response.status()
            )));
        }
        let envelope: ApiEnvelope<ApiPage> = response
            .json()
            .await
            .map_err(|e| MarketDataError::Malformed(e.to_string()))?;
        envelope
            .data
            .ok_or_else(|| MarketDataError::Malformed("empty data envelope".to_string()))
    }

    /// Fetch all pages for both sort strategies and merge by pool id.
    async fn fetch_all(&self) -> Result<Vec<Pool>, MarketDataError> {
        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();

        for sort_field in SORT_FIELDS {
            let mut page = 1;
            loop {
                let batch = match self.fetch_page(sort_field, page, None).await {
                    Ok(batch) => batch,
                    Err(e) => {
                        // One sort strategy failing does not invalidate the
                        // other; a wholly empty merge is handled by the caller.
                        tracing::warn!("pool fetch sorted by {sort_field} failed: {e}");
                        break;
                    }
                };
                let has_next = batch.has_next_page;
                for api_pool in batch.data {
                    if let Some(pool) = accept_pool(api_pool) {
                        if seen.insert(pool.pool_id.clone()) {
                            merged.push(pool);
                        }
                    }
                }
                if !has_next || page >= MAX_PAGES {
                    break;
                }
                page += 1;
            }
        }

        if merged.is_empty() {
            Err(MarketDataError::NoData)
        } else {
            Ok(merged)
        }
    }
}

/// Keep only supported WSOL pairs.
fn accept_pool(api_pool: ApiPool) -> Option<Pool> {
    if !api_pool.program_id.is_empty() && api_pool.program_id != AMM_V4_PROGRAM {
        return None;
    }
    let pool = api_pool.into_pool();
    if !pool.is_wsol_pair() || pool.lp_mint.is_empty() {
        return None;
    }
    Some(pool)
}

#[async_trait]
impl PoolDirectoryPort for PoolDirectory {
    async fn list_wsol_pools(&self) -> Result<Vec<Pool>, MarketDataError> {
        {
            let cache = self.cache.lock().await;
            if let Some((pools, fetched_at)) = cache.as_ref() {
                if fetched_at.elapsed() < self.cache_ttl {
                    return Ok(pools.clone());
                }
            }
        }

        match self.fetch_all().await {
            Ok(pools) => {
                tracing::info!("fetched {} WSOL pools from listing service", pools.len());
                *self.cache.lock().await = Some((pools.clone(), Instant::now()));
                Ok(pools)
            }
            Err(e) => {
                let cache = self.cache.lock().await;
                if let Some((pools, _)) = cache.as_ref() {
                    tracing::warn!("pool fetch failed ({e}); serving stale cache");
                    Ok(pools.clone())
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn pool_by_id(&self, pool_id: &str) -> Result<Option<Pool>, MarketDataError> {
        {
            let cache = self.cache.lock().await;
            if let Some((pools, _)) = cache.as_ref() {
                if let Some(pool) = pools.iter().find(|p| p.pool_id == pool_id) {
                    return Ok(Some(pool.clone()));
                }
            }
        }

        let url = format!("{}/pools/info/ids?ids={pool_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MarketDataError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(MarketDataError::Request(format!(
                "listing service returned {}",
                response.status()
            )));
        }
        let envelope: ApiEnvelope<Vec<ApiPool>> = response
            .json()
            .await
            .map_err(|e| MarketDataError::Malformed(e.to_string()))?;
        Ok(envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(accept_pool))
    }

    async fn wsol_pool_for_mint(&self, mint: &str) -> Result<Option<Pool>, MarketDataError> {
        let page = self.fetch_page("liquidity", 1, Some(mint)).await?;
        Ok(page.data.into_iter().find_map(accept_pool))
    }

    async fn pools_for_lp_mints(
        &self,
        lp_mints: &[String],
    ) -> Result<Vec<Pool>, MarketDataError> {
        let mut pools = Vec::new();
        for chunk in lp_mints.chunks(20) {
            let url = format!("{}/pools/info/lps?lps={}", self.base_url, chunk.join(","));
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| MarketDataError::Request(e.to_string()))?;
            if !response.status().is_success() {
                continue;
            }
            let envelope: ApiEnvelope<Vec<ApiPool>> = response
                .json()
                .await
                .map_err(|e| MarketDataError::Malformed(e.to_string()))?;
            pools.extend(
                envelope
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(accept_pool),
            );
        }
        Ok(pools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_pool(id: &str, program: &str, quote_mint: &str) -> ApiPool {
        serde_json::from_str(&format!(
            r#"{{
                "id": "{id}",
                "programId": "{program}",
                "mintA": {{"address": "TokMint", "symbol": "TOK", "decimals": 6}},
                "mintB": {{"address": "{quote_mint}", "symbol": "WSOL", "decimals": 9}},
                "lpMint": {{"address": "lp-{id}", "symbol": "", "decimals": 9}},
                "tvl": 10000.0
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn accept_filters_foreign_programs() {
        assert!(accept_pool(api_pool("a", AMM_V4_PROGRAM, WSOL_MINT)).is_some());
        assert!(accept_pool(api_pool("a", "", WSOL_MINT)).is_some());
        assert!(accept_pool(api_pool("a", "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C", WSOL_MINT)).is_none());
    }

    #[test]
    fn accept_filters_non_wsol_pairs() {
        assert!(accept_pool(api_pool("a", AMM_V4_PROGRAM, "SomeOtherMint")).is_none());
    }
}
