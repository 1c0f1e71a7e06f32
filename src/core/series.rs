//! Daily market series types and the fetcher abstraction

use crate::core::error::PipelineError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub date: NaiveDate,
    pub price: f64,
    pub market_cap: f64,
}

impl DailyObservation {
    pub fn new(date: NaiveDate, price: f64, market_cap: f64) -> Self {
        DailyObservation {
            date,
            price,
            market_cap,
        }
    }

    /// True when the price can be used to infer supply.
    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }

    /// Market cap divided by price, `None` when the price is not usable.
    pub fn implied_supply(&self) -> Option<f64> {
        if !self.has_valid_price() {
            return None;
        }
        let supply = self.market_cap / self.price;
        supply.is_finite().then_some(supply)
    }
}

/// Date-ordered observations for a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSeries {
    symbol: String,
    observations: Vec<DailyObservation>,
}

impl AssetSeries {
    /// Builds a series, rejecting duplicate or out-of-order dates.
    pub fn new(
        symbol: impl Into<String>,
        observations: Vec<DailyObservation>,
    ) -> Result<Self, PipelineError> {
        let symbol = symbol.into();
        if let Some(pair) = observations.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(PipelineError::invalid_series(
                &symbol,
                format!(
                    "dates must be strictly increasing ({} followed by {})",
                    pair[0].date, pair[1].date
                ),
            ));
        }
        Ok(AssetSeries {
            symbol,
            observations,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn observations(&self) -> &[DailyObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first(&self) -> Option<&DailyObservation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&DailyObservation> {
        self.observations.last()
    }

    /// Implied supply per date, skipping points without a usable price.
    pub fn implied_supply(&self) -> Vec<(NaiveDate, f64)> {
        self.observations
            .iter()
            .filter_map(|o| o.implied_supply().map(|q| (o.date, q)))
            .collect()
    }

    /// Same dates and prices with new market caps, used by the reconstructor.
    pub(crate) fn with_market_caps(&self, market_caps: Vec<f64>) -> Self {
        debug_assert_eq!(market_caps.len(), self.observations.len());
        let observations = self
            .observations
            .iter()
            .zip(market_caps)
            .map(|(o, market_cap)| DailyObservation { market_cap, ..*o })
            .collect();
        AssetSeries {
            symbol: self.symbol.clone(),
            observations,
        }
    }
}

#[async_trait]
pub trait SeriesFetcher: Send + Sync {
    /// Fetches `days` of daily history for the upstream asset `id`, labelled `symbol`.
    async fn fetch_series(&self, id: &str, symbol: &str, days: u32) -> Result<AssetSeries>;
}
