//! Foreign-exchange rates and the XCoin conversions derived from them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::Cache;

pub const RATES_KEY: &str = "exchange_rates";
pub const RATES_MAX_AGE_SECS: i64 = 86_400;
/// Value of one XCoin in USD.
pub const XCOIN_TO_USD: f64 = 0.74;

pub const DEFAULT_RATES: XcoinRates = XcoinRates {
    rmb: 5.42,
    fcfa: 467.52,
    usd: XCOIN_TO_USD,
};

/// Rates keyed by currency code against a USD base, as cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxSnapshot {
    pub rates: HashMap<String, f64>,
    pub time_last_updated: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XcoinRates {
    pub rmb: f64,
    pub fcfa: f64,
    pub usd: f64,
}

impl XcoinRates {
    /// Value of `amount` XCoin in `currency` (`FCFA`, `RMB` or `USD`).
    pub fn convert(&self, amount: f64, currency: &str) -> Option<f64> {
        let rate = match currency.to_ascii_uppercase().as_str() {
            "FCFA" | "XAF" | "XOF" => self.fcfa,
            "RMB" | "CNY" => self.rmb,
            "USD" => self.usd,
            _ => return None,
        };
        Some(round2(amount * rate))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatesTable {
    pub xcoin: XcoinRates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatesReport {
    pub rates: RatesTable,
    #[serde(rename = "lastUpdated")]
    pub last_updated: i64,
}

#[derive(Debug, Error)]
#[error("exchange rates unavailable: {reason}")]
pub struct RatesUnavailable {
    pub reason: String,
    /// Fixed defaults to show instead.
    pub fallback: RatesReport,
}

#[async_trait]
pub trait RateSource: Send + Sync {
    async fn latest(&self) -> anyhow::Result<FxSnapshot>;
}

/// `exchangerate-api.com` style endpoint: `GET {base}/v4/latest/USD`.
pub struct ExchangeRateApi {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct LatestResponse {
    #[serde(default)]
    rates: HashMap<String, f64>,
    #[serde(default)]
    time_last_updated: Option<i64>,
}

impl ExchangeRateApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RateSource for ExchangeRateApi {
    async fn latest(&self) -> anyhow::Result<FxSnapshot> {
        let url = format!("{}/v4/latest/USD", self.base_url);
        log::debug!("Fetching exchange rates from {}", url);
        let response: LatestResponse = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach exchange rate API")?
            .error_for_status()
            .context("Exchange rate API returned an error")?
            .json()
            .await
            .context("Failed to parse exchange rate response")?;

        Ok(FxSnapshot {
            rates: response.rates,
            time_last_updated: response
                .time_last_updated
                .unwrap_or_else(|| chrono::Utc::now().timestamp()),
        })
    }
}

pub struct RateCache {
    cache: Arc<dyn Cache>,
    source: Arc<dyn RateSource>,
}

impl RateCache {
    pub fn new(cache: Arc<dyn Cache>, source: Arc<dyn RateSource>) -> Self {
        Self { cache, source }
    }

    /// XCoin rates from a snapshot younger than a day, refreshing it when stale.
    pub async fn rates(&self) -> Result<RatesReport, RatesUnavailable> {
        let now = chrono::Utc::now().timestamp();

        let snapshot = match self.cached().await {
            Some(snapshot) if now - snapshot.time_last_updated < RATES_MAX_AGE_SECS => {
                log::debug!("Serving cached exchange rates");
                snapshot
            }
            _ => self.refresh().await.map_err(|e| {
                log::error!("Exchange rate error: {:#}", e);
                RatesUnavailable {
                    reason: e.to_string(),
                    fallback: RatesReport {
                        rates: RatesTable {
                            xcoin: DEFAULT_RATES,
                        },
                        last_updated: now,
                    },
                }
            })?,
        };

        Ok(RatesReport {
            rates: RatesTable {
                xcoin: derive_xcoin_rates(&snapshot.rates),
            },
            last_updated: snapshot.time_last_updated,
        })
    }

    async fn cached(&self) -> Option<FxSnapshot> {
        let raw = match self.cache.get(RATES_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                log::warn!("Rate cache read failed: {:#}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::warn!("Discarding unreadable cached rates: {}", e);
                None
            }
        }
    }

    async fn refresh(&self) -> anyhow::Result<FxSnapshot> {
        let snapshot = self.source.latest().await?;
        let json = serde_json::to_string(&snapshot).context("Failed to serialize rates")?;
        if let Err(e) = self
            .cache
            .set_ex(
                RATES_KEY,
                &json,
                Duration::from_secs(RATES_MAX_AGE_SECS as u64),
            )
            .await
        {
            log::error!("Failed to cache exchange rates: {:#}", e);
        }
        log::info!("Exchange rates refreshed");
        Ok(snapshot)
    }
}

/// XCoin rates from USD-based rates. Without a USD entry the defaults apply.
pub fn derive_xcoin_rates(rates: &HashMap<String, f64>) -> XcoinRates {
    if !rates.contains_key("USD") {
        return DEFAULT_RATES;
    }
    let pick = |codes: [&str; 2]| codes.iter().find_map(|c| rates.get(*c).copied());

    XcoinRates {
        rmb: pick(["CNY", "RMB"])
            .map(|r| round2(XCOIN_TO_USD * r))
            .unwrap_or(DEFAULT_RATES.rmb),
        fcfa: pick(["XOF", "FCFA"])
            .map(|r| round2(XCOIN_TO_USD * r))
            .unwrap_or(DEFAULT_RATES.fcfa),
        usd: XCOIN_TO_USD,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
