pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::pipeline::PipelineContext;
use crate::core::transform::{NormalizeMode, Smoothing};
use crate::providers::CoinGeckoProvider;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_GROUP: &str = "all";
pub const DEFAULT_CHART_ROWS: usize = 10;

pub enum AppCommand {
    Summary {
        group: Option<String>,
    },
    Chart {
        symbols: Vec<String>,
        smoothing: Smoothing,
        view: NormalizeMode,
        rows: usize,
    },
    Corr {
        symbol_a: Option<String>,
        symbol_b: Option<String>,
        smoothing: Smoothing,
        levels: bool,
    },
}

/// Wires the CoinGecko fetcher and the series cache into a pipeline context.
pub fn build_context(config: &AppConfig) -> Result<PipelineContext> {
    let fetcher = CoinGeckoProvider::new(&config.providers.coingecko)?;
    let cache = store::open_series_cache(config);
    Ok(PipelineContext::new(
        Arc::new(fetcher),
        cache,
        config.pipeline.clone(),
        config.cache.ttl(),
        config.providers.coingecko.vs_currency.clone(),
    ))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("mcap starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!(assets = config.assets.len(), "Loaded config");

    let ctx = build_context(&config)?;

    match command {
        AppCommand::Summary { group } => {
            let group = group.as_deref().unwrap_or(DEFAULT_GROUP);
            let assets = config.assets_in_group(group);
            cli::summary::run(&ctx, &assets, group).await
        }
        AppCommand::Chart {
            symbols,
            smoothing,
            view,
            rows,
        } => cli::chart::run(&ctx, &config, &symbols, smoothing, view, rows).await,
        AppCommand::Corr {
            symbol_a,
            symbol_b,
            smoothing,
            levels,
        } => {
            let a = symbol_a.as_deref().unwrap_or(cli::corr::DEFAULT_SYMBOL_A);
            let b = symbol_b.as_deref().unwrap_or(cli::corr::DEFAULT_SYMBOL_B);
            cli::corr::run(&ctx, &config, a, b, smoothing, levels).await
        }
    }
}
