//! Per-run pipeline context: fetch, cache and repair every configured asset.
use crate::core::cache::Cache;
use crate::core::config::{AssetConfig, PipelineConfig};
use crate::core::error::PipelineError;
use crate::core::reconstruct::{CorrectedSeries, reconstruct};
use crate::core::series::{AssetSeries, SeriesFetcher};
use anyhow::{Result, anyhow};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Outcome of loading one asset; failures stay local to the asset.
#[derive(Debug)]
pub struct AssetOutcome {
    pub asset: AssetConfig,
    pub result: Result<CorrectedSeries>,
}

/// Everything one run needs, constructed explicitly and passed to consumers.
pub struct PipelineContext {
    fetcher: Arc<dyn SeriesFetcher>,
    cache: Arc<dyn Cache<String, AssetSeries>>,
    settings: PipelineConfig,
    cache_ttl: Duration,
    vs_currency: String,
}

impl PipelineContext {
    pub fn new(
        fetcher: Arc<dyn SeriesFetcher>,
        cache: Arc<dyn Cache<String, AssetSeries>>,
        settings: PipelineConfig,
        cache_ttl: Duration,
        vs_currency: impl Into<String>,
    ) -> Self {
        PipelineContext {
            fetcher,
            cache,
            settings,
            cache_ttl,
            vs_currency: vs_currency.into(),
        }
    }

    pub fn settings(&self) -> &PipelineConfig {
        &self.settings
    }

    /// Repairs a fetched series with the configured thresholds.
    pub fn process(&self, series: &AssetSeries) -> Result<CorrectedSeries, PipelineError> {
        reconstruct(series, &self.settings.reconstruct_params())
    }

    /// Cached series are only valid for the same window and quote currency.
    fn cache_key(&self, id: &str) -> String {
        format!(
            "{id}_{}d_{}",
            self.settings.history_days,
            self.vs_currency.to_lowercase()
        )
    }

    /// Cached series for `id`, or a fresh fetch bounded by the request timeout.
    #[instrument(name = "FetchAsset", skip(self), fields(id = %id))]
    async fn fetch(&self, id: &str, symbol: &str) -> Result<AssetSeries> {
        let key = self.cache_key(id);
        if let Some(cached) = self.cache.get(&key).await {
            if cached.symbol() == symbol {
                return Ok(cached);
            }
        }

        let timeout = self.settings.request_timeout();
        let series = tokio::time::timeout(
            timeout,
            self.fetcher
                .fetch_series(id, symbol, self.settings.history_days),
        )
        .await
        .map_err(|_| anyhow!("Request timed out after {}s for {}", timeout.as_secs(), id))??;

        self.cache.put(key, series.clone(), Some(self.cache_ttl)).await;
        Ok(series)
    }

    /// Fetches with the fallback id when the primary id fails.
    async fn fetch_asset(&self, asset: &AssetConfig) -> Result<AssetSeries> {
        match self.fetch(&asset.id, &asset.symbol).await {
            Ok(series) => Ok(series),
            Err(e) => match &asset.fallback_id {
                Some(fallback) => {
                    info!(
                        "{} failed ({e}); falling back to {} labelled as {}",
                        asset.id, fallback, asset.symbol
                    );
                    self.fetch(fallback, &asset.symbol).await
                }
                None => Err(e),
            },
        }
    }

    pub async fn load_asset(&self, asset: &AssetConfig) -> Result<CorrectedSeries> {
        let series = self.fetch_asset(asset).await?;
        Ok(self.process(&series)?)
    }

    /// Loads every asset with at most `max_concurrent` requests in flight.
    ///
    /// Results come back in input order. `on_done` is called once per asset.
    pub async fn load_all(
        &self,
        assets: &[AssetConfig],
        on_done: &(dyn Fn() + Sync),
    ) -> Vec<AssetOutcome> {
        let max_concurrent = self.settings.max_concurrent.max(1);
        debug!(count = assets.len(), max_concurrent, "Loading assets");

        let mut outcomes: Vec<(usize, AssetOutcome)> = stream::iter(assets.iter().enumerate())
            .map(|(index, asset)| async move {
                let result = self.load_asset(asset).await;
                if let Err(e) = &result {
                    warn!("Failed to load {} ({}): {e}", asset.symbol, asset.id);
                }
                on_done();
                (
                    index,
                    AssetOutcome {
                        asset: asset.clone(),
                        result,
                    },
                )
            })
            .buffer_unordered(max_concurrent)
            .collect()
            .await;

        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
