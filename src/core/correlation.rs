//! Pairwise return correlation and beta between two assets
use crate::core::error::PipelineError;
use crate::core::transform::ValueSeries;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_MIN_OVERLAP_DAYS: usize = 10;

/// Correlation and beta over one set of return pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairStats {
    pub days: usize,
    /// Pearson coefficient, `None` when either side has no variance.
    pub correlation: Option<f64>,
    /// Slope of B's returns regressed on A's, `None` when A has no variance.
    pub beta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub symbol_a: String,
    pub symbol_b: String,
    pub overall: PairStats,
    /// Days where A's return was positive; omitted below the overlap minimum.
    pub positive: Option<PairStats>,
    pub negative: Option<PairStats>,
    pub positive_days: usize,
    pub negative_days: usize,
    /// Days where A did not move.
    pub zero_days: usize,
}

impl CorrelationResult {
    /// B's expected move when A moves by `move_pct` percent.
    pub fn implied_move(&self, move_pct: f64) -> Option<f64> {
        self.overall.beta.map(|beta| beta * move_pct)
    }
}

/// Values of both series on the dates they share, in date order.
fn align(a: &ValueSeries, b: &ValueSeries) -> Vec<(NaiveDate, f64, f64)> {
    let by_date: HashMap<NaiveDate, f64> = b.points.iter().map(|p| (p.date, p.value)).collect();
    let mut aligned: Vec<(NaiveDate, f64, f64)> = a
        .points
        .iter()
        .filter_map(|p| by_date.get(&p.date).map(|vb| (p.date, p.value, *vb)))
        .collect();
    aligned.sort_by_key(|(date, _, _)| *date);
    aligned
}

/// Daily return pairs on the aligned dates, keeping only finite pairs.
fn return_pairs(aligned: &[(NaiveDate, f64, f64)]) -> Vec<(f64, f64)> {
    aligned
        .windows(2)
        .map(|w| (w[1].1 / w[0].1 - 1.0, w[1].2 / w[0].2 - 1.0))
        .filter(|(ra, rb)| ra.is_finite() && rb.is_finite())
        .collect()
}

fn pair_stats(pairs: &[(f64, f64)]) -> PairStats {
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (a, b) in pairs {
        let (da, db) = (a - mean_a, b - mean_b);
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let correlation = (var_a > 0.0 && var_b > 0.0)
        .then(|| (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0));
    let beta = (var_a > 0.0).then(|| cov / var_a);

    PairStats {
        days: pairs.len(),
        correlation,
        beta,
    }
}

/// Correlates daily returns of `a` and `b`, with `a` as the independent side.
///
/// Dates must match exactly; nothing is interpolated. Each side of the
/// positive/negative split is reported only when it has at least
/// `min_overlap_days` pairs.
pub fn correlate(
    a: &ValueSeries,
    b: &ValueSeries,
    min_overlap_days: usize,
) -> Result<CorrelationResult, PipelineError> {
    let pairs = return_pairs(&align(a, b));
    if pairs.len() < min_overlap_days.max(2) {
        return Err(PipelineError::InsufficientData {
            required: min_overlap_days.max(2),
            available: pairs.len(),
        });
    }

    let positive: Vec<(f64, f64)> = pairs.iter().copied().filter(|(ra, _)| *ra > 0.0).collect();
    let negative: Vec<(f64, f64)> = pairs.iter().copied().filter(|(ra, _)| *ra < 0.0).collect();
    let subset = |subset: &[(f64, f64)]| {
        (subset.len() >= min_overlap_days.max(2)).then(|| pair_stats(subset))
    };

    Ok(CorrelationResult {
        symbol_a: a.symbol.clone(),
        symbol_b: b.symbol.clone(),
        overall: pair_stats(&pairs),
        positive: subset(&positive),
        negative: subset(&negative),
        positive_days: positive.len(),
        negative_days: negative.len(),
        zero_days: pairs.len() - positive.len() - negative.len(),
    })
}

/// Pearson coefficient of the two series indexed to 100 on their first shared date.
pub fn level_correlation(
    a: &ValueSeries,
    b: &ValueSeries,
    min_overlap_days: usize,
) -> Result<Option<f64>, PipelineError> {
    let aligned: Vec<(NaiveDate, f64, f64)> = align(a, b)
        .into_iter()
        .filter(|(_, va, vb)| va.is_finite() && vb.is_finite() && *va > 0.0 && *vb > 0.0)
        .collect();
    if aligned.len() < min_overlap_days.max(2) {
        return Err(PipelineError::InsufficientData {
            required: min_overlap_days.max(2),
            available: aligned.len(),
        });
    }

    let (_, base_a, base_b) = aligned[0];
    let levels: Vec<(f64, f64)> = aligned
        .iter()
        .map(|(_, va, vb)| (va / base_a * 100.0, vb / base_b * 100.0))
        .collect();
    Ok(pair_stats(&levels).correlation)
}
