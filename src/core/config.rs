use crate::core::correlation::DEFAULT_MIN_OVERLAP_DAYS;
use crate::core::reconstruct::{
    DEFAULT_DROP_THRESHOLD, DEFAULT_PRICE_TOLERANCE, DEFAULT_RECOVERY_TOLERANCE, ReconstructParams,
};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";
pub const PRO_COINGECKO_URL: &str = "https://pro-api.coingecko.com/api/v3";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AssetConfig {
    /// Upstream API identifier, e.g. `bitcoin`.
    pub id: String,
    pub symbol: String,
    pub category: Option<String>,
    pub group: Option<String>,
    /// Identifier to try when `id` fails (e.g. a renamed token).
    pub fallback_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,
}

impl Default for CoinGeckoProviderConfig {
    fn default() -> Self {
        CoinGeckoProviderConfig {
            base_url: DEFAULT_COINGECKO_URL.to_string(),
            api_key: None,
            vs_currency: default_vs_currency(),
        }
    }
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub coingecko: CoinGeckoProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub drop_threshold: f64,
    pub price_tolerance: f64,
    pub recovery_tolerance: f64,
    pub min_overlap_days: usize,
    pub max_concurrent: usize,
    pub request_timeout_secs: u64,
    pub history_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            drop_threshold: DEFAULT_DROP_THRESHOLD,
            price_tolerance: DEFAULT_PRICE_TOLERANCE,
            recovery_tolerance: DEFAULT_RECOVERY_TOLERANCE,
            min_overlap_days: DEFAULT_MIN_OVERLAP_DAYS,
            max_concurrent: 5,
            request_timeout_secs: 30,
            history_days: 365,
        }
    }
}

impl PipelineConfig {
    pub fn reconstruct_params(&self) -> ReconstructParams {
        ReconstructParams {
            drop_threshold: self.drop_threshold,
            price_tolerance: self.price_tolerance,
            recovery_tolerance: self.recovery_tolerance,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_hours: u64,
    /// Keep fetched series on disk between runs.
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_hours: 24,
            persist: true,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 3600)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Asset whose share of the total is shown as `<SYMBOL>.D`.
    #[serde(default = "default_dominance_symbol")]
    pub dominance_symbol: Option<String>,
    pub data_path: Option<String>,
}

fn default_dominance_symbol() -> Option<String> {
    Some("USDT".to_string())
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "mcap", "mcap")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "mcap", "mcap")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config
            .pipeline
            .reconstruct_params()
            .validate()
            .context("Invalid pipeline thresholds")?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Applies `COINGECKO_API_KEY`, `MIN_CORR_DAYS` and `MAX_CONCURRENT_REQUESTS`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("COINGECKO_API_KEY").filter(|k| !k.is_empty()) {
            let coingecko = &mut self.providers.coingecko;
            if coingecko.base_url == DEFAULT_COINGECKO_URL {
                coingecko.base_url = PRO_COINGECKO_URL.to_string();
            }
            coingecko.api_key = Some(key);
        }
        if let Some(value) = lookup("MIN_CORR_DAYS") {
            match value.parse() {
                Ok(days) => self.pipeline.min_overlap_days = days,
                Err(e) => warn!("Ignoring MIN_CORR_DAYS={value}: {e}"),
            }
        }
        if let Some(value) = lookup("MAX_CONCURRENT_REQUESTS") {
            match value.parse::<usize>() {
                Ok(n) if n > 0 => self.pipeline.max_concurrent = n,
                _ => warn!("Ignoring MAX_CONCURRENT_REQUESTS={value}"),
            }
        }
    }

    pub fn find_asset(&self, symbol: &str) -> Option<&AssetConfig> {
        self.assets
            .iter()
            .find(|a| a.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Assets selected by `all`, a group name, or `+`-joined group names.
    pub fn assets_in_group(&self, selection: &str) -> Vec<AssetConfig> {
        if selection.eq_ignore_ascii_case("all") {
            return self.assets.clone();
        }
        let groups: Vec<&str> = selection.split('+').map(str::trim).collect();
        self.assets
            .iter()
            .filter(|a| {
                a.group
                    .as_deref()
                    .is_some_and(|g| groups.iter().any(|sel| sel.eq_ignore_ascii_case(g)))
            })
            .cloned()
            .collect()
    }
}
