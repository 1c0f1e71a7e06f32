pub mod disk;
pub mod memory;

use crate::core::cache::Cache;
use crate::core::config::AppConfig;
use crate::core::series::AssetSeries;
use disk::DiskCache;
use memory::MemoryCache;
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens the fetched-series cache: on disk when persistence is enabled and
/// the data directory is usable, in memory otherwise.
pub fn open_series_cache(config: &AppConfig) -> Arc<dyn Cache<String, AssetSeries>> {
    if config.cache.persist {
        let opened = config
            .default_data_path()
            .and_then(|path| DiskCache::<String, AssetSeries>::open(&path.join("cache"), "series"));
        match opened {
            Ok(cache) => {
                debug!("Using persistent series cache");
                return Arc::new(cache);
            }
            Err(e) => warn!("Falling back to in-memory cache: {e:#}"),
        }
    }
    Arc::new(MemoryCache::<String, AssetSeries>::new())
}
