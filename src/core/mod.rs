//! Core business logic: series model, repair, transforms and correlation

pub mod cache;
pub mod config;
pub mod correlation;
pub mod error;
pub mod log;
pub mod pipeline;
pub mod reconstruct;
pub mod series;
pub mod transform;

// Re-export main types for cleaner imports
pub use error::PipelineError;
pub use pipeline::{AssetOutcome, PipelineContext};
pub use reconstruct::{BreakPoint, CorrectedSeries, ReconstructParams, reconstruct};
pub use series::{AssetSeries, DailyObservation, SeriesFetcher};
pub use transform::{NormalizeMode, Smoothing, ValueSeries};
