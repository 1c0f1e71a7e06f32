use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::core::config::CoinGeckoProviderConfig;
use crate::core::series::{AssetSeries, DailyObservation, SeriesFetcher};
use crate::providers::util::with_retry;

const API_KEY_HEADER: &str = "x-cg-pro-api-key";

pub struct CoinGeckoProvider {
    base_url: String,
    api_key: Option<String>,
    vs_currency: String,
    client: reqwest::Client,
    retries: usize,
    retry_delay_ms: u64,
}

impl CoinGeckoProvider {
    pub fn new(config: &CoinGeckoProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("mcap/1.0")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(CoinGeckoProvider {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            vs_currency: config.vs_currency.clone(),
            client,
            retries: 3,
            retry_delay_ms: 1000,
        })
    }

    pub fn with_retry_delay(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }
}

#[derive(Deserialize, Debug)]
struct MarketChartResponse {
    #[serde(default)]
    prices: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    market_caps: Vec<(f64, Option<f64>)>,
}

/// Collapses `[timestamp_ms, value]` samples to one value per UTC day; the
/// latest sample of a day wins.
fn by_day(samples: &[(f64, Option<f64>)]) -> BTreeMap<NaiveDate, f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut days = BTreeMap::new();
    for (ts, value) in &sorted {
        let Some(value) = value else { continue };
        let Some(dt) = DateTime::<Utc>::from_timestamp_millis(*ts as i64) else {
            continue;
        };
        days.insert(dt.date_naive(), *value);
    }
    days
}

fn into_series(symbol: &str, id: &str, data: MarketChartResponse) -> Result<AssetSeries> {
    let market_caps = by_day(&data.market_caps);
    if market_caps.is_empty() {
        bail!("No market cap data found for id: {}", id);
    }
    let prices = by_day(&data.prices);

    let observations: Vec<DailyObservation> = market_caps
        .into_iter()
        .filter_map(|(date, market_cap)| {
            prices
                .get(&date)
                .map(|price| DailyObservation::new(date, *price, market_cap))
        })
        .collect();
    if observations.is_empty() {
        bail!("No overlapping price and market cap data for id: {}", id);
    }
    Ok(AssetSeries::new(symbol, observations)?)
}

#[async_trait]
impl SeriesFetcher for CoinGeckoProvider {
    #[instrument(name = "CoinGeckoFetch", skip(self), fields(id = %id, symbol = %symbol))]
    async fn fetch_series(&self, id: &str, symbol: &str, days: u32) -> Result<AssetSeries> {
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={}&interval=daily",
            self.base_url, id, self.vs_currency, days
        );
        debug!("Requesting market chart from {}", url);

        let response = with_retry(
            || async {
                let mut request = self.client.get(&url);
                if let Some(key) = &self.api_key {
                    request = request.header(API_KEY_HEADER, key);
                }
                request.send().await?.error_for_status()
            },
            self.retries,
            self.retry_delay_ms,
        )
        .await
        .map_err(|e| {
            match e.downcast_ref::<reqwest::Error>().and_then(|e| e.status()) {
                Some(StatusCode::NOT_FOUND) => anyhow!("Unknown asset id: {} (404)", id),
                Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                    anyhow!("Unauthorized request for {}; check COINGECKO_API_KEY", id)
                }
                _ => e.context(format!("Request error for id: {} URL: {}", id, url)),
            }
        })?;

        let data = response
            .json::<MarketChartResponse>()
            .await
            .with_context(|| format!("Malformed market chart for id: {}", id))?;
        debug!(
            prices = data.prices.len(),
            market_caps = data.market_caps.len(),
            "Received CoinGecko response"
        );

        into_series(symbol, id, data)
    }
}
