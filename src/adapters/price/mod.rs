//! SOL/USD price feed: aggregator primary, public API fallback, 60s cache.
//!
//! Display-only. When every source is down the last known price keeps being
//! served so the terminal does not flicker to zero.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::pool::WSOL_MINT;
use crate::ports::market_data::PriceFeedPort;

const PRICE_CACHE_TTL: Duration = Duration::from_secs(60);
const PRIMARY_URL: &str = "https://api.jup.ag/price/v3";
const FALLBACK_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

struct Cached {
    price: f64,
    fetched_at: Instant,
}

pub struct SolPriceFeed {
    http: Client,
    api_key: Option<String>,
    cache: Mutex<Option<Cached>>,
}

impl SolPriceFeed {
    /// `api_key` raises the primary source's rate limits; without one the
    /// fallback usually ends up doing the work.
    pub fn new(api_key: Option<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            cache: Mutex::new(None),
        }
    }

    async fn fetch_primary(&self) -> Option<f64> {
        let mut request = self.http.get(PRIMARY_URL).query(&[("ids", WSOL_MINT)]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let body: Value = request.send().await.ok()?.json().await.ok()?;
        let price = body.get(WSOL_MINT)?.get("usdPrice")?.as_f64()?;
        (price > 0.0).then_some(price)
    }

    async fn fetch_fallback(&self) -> Option<f64> {
        let body: Value = self
            .http
            .get(FALLBACK_URL)
            .query(&[("ids", "solana"), ("vs_currencies", "usd")])
            .send()
            .await
            .ok()?
            .json()
            .await
            .ok()?;
        let price = body.get("solana")?.get("usd")?.as_f64()?;
        (price > 0.0).then_some(price)
    }
}

#[async_trait]
impl PriceFeedPort for SolPriceFeed {
    async fn sol_price_usd(&self) -> f64 {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < PRICE_CACHE_TTL {
                return cached.price;
            }
        }

        let fresh = if self.api_key.is_some() {
            match self.fetch_primary().await {
                Some(price) => Some(price),
                None => self.fetch_fallback().await,
            }
        } else {
            // No key: the public fallback first, the primary as a last try.
            match self.fetch_fallback().await {
                Some(price) => Some(price),
                None => self.fetch_primary().await,
            }
        };

        match fresh {
            Some(price) => {
                *cache = Some(Cached {
                    price,
                    fetched_at: Instant::now(),
                });
                price
            }
            None => cache.as_ref().map(|c| c.price).unwrap_or(0.0),
        }
    }
}
