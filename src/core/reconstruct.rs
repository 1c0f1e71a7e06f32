//! Detection and repair of corrupted circulating-supply values.
//!
//! The upstream API occasionally reports a circulating supply that collapses
//! overnight while the price does not move. Implied supply (market cap / price)
//! exposes those days, and the market cap is recomputed from the last trusted
//! supply until the reported figures come back in line.
use crate::core::error::PipelineError;
use crate::core::series::AssetSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_DROP_THRESHOLD: f64 = 0.30;
pub const DEFAULT_PRICE_TOLERANCE: f64 = 0.30;
pub const DEFAULT_RECOVERY_TOLERANCE: f64 = 0.05;

/// Heuristic thresholds used to tell corruption apart from real moves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconstructParams {
    /// Fractional supply drop that flags a break.
    pub drop_threshold: f64,
    /// A price fall of at least this fraction explains the drop, so no break.
    pub price_tolerance: f64,
    /// Supply back within this fraction of the baseline ends a correction.
    pub recovery_tolerance: f64,
}

impl Default for ReconstructParams {
    fn default() -> Self {
        ReconstructParams {
            drop_threshold: DEFAULT_DROP_THRESHOLD,
            price_tolerance: DEFAULT_PRICE_TOLERANCE,
            recovery_tolerance: DEFAULT_RECOVERY_TOLERANCE,
        }
    }
}

impl ReconstructParams {
    pub fn with_drop_threshold(drop_threshold: f64) -> Self {
        ReconstructParams {
            drop_threshold,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.drop_threshold > 0.0 && self.drop_threshold < 1.0) {
            return Err(PipelineError::InvalidParameter(format!(
                "drop_threshold must be in (0, 1), got {}",
                self.drop_threshold
            )));
        }
        if !(self.price_tolerance > 0.0) {
            return Err(PipelineError::InvalidParameter(format!(
                "price_tolerance must be positive, got {}",
                self.price_tolerance
            )));
        }
        // Recovery must sit inside the drop band or a recovered day would re-trigger.
        if !(self.recovery_tolerance >= 0.0 && self.recovery_tolerance < self.drop_threshold) {
            return Err(PipelineError::InvalidParameter(format!(
                "recovery_tolerance must be in [0, drop_threshold), got {}",
                self.recovery_tolerance
            )));
        }
        Ok(())
    }

    fn is_break(&self, supply_change: f64, price_move: f64) -> bool {
        supply_change <= -self.drop_threshold && price_move > -self.price_tolerance
    }
}

/// A date where implied supply collapsed without a matching price move.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakPoint {
    pub date: NaiveDate,
    /// Reported (corrupted) implied supply on the break date.
    pub implied_supply: f64,
    /// Supply used to rebuild market caps from this date.
    pub baseline: f64,
    /// Relative supply change that triggered the break.
    pub drop: f64,
    pub price_move: f64,
    /// First date where the reported supply was trusted again.
    pub recovered_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedSeries {
    original: AssetSeries,
    corrected: AssetSeries,
    break_points: Vec<BreakPoint>,
}

impl CorrectedSeries {
    pub fn symbol(&self) -> &str {
        self.corrected.symbol()
    }

    /// The series as fetched, kept for comparison.
    pub fn original(&self) -> &AssetSeries {
        &self.original
    }

    pub fn corrected(&self) -> &AssetSeries {
        &self.corrected
    }

    pub fn break_points(&self) -> &[BreakPoint] {
        &self.break_points
    }

    pub fn is_modified(&self) -> bool {
        !self.break_points.is_empty()
    }

    /// Number of observations whose market cap was recomputed.
    pub fn corrected_days(&self) -> usize {
        self.original
            .observations()
            .iter()
            .zip(self.corrected.observations())
            .filter(|(o, c)| o.market_cap.to_bits() != c.market_cap.to_bits())
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
enum Walk {
    /// No trusted supply yet.
    Start,
    Tracking { baseline: f64 },
    Correcting { baseline: f64, last_reported: f64 },
}

/// Rebuilds market caps across supply breaks. Pure: same input, same output.
pub fn reconstruct(
    series: &AssetSeries,
    params: &ReconstructParams,
) -> Result<CorrectedSeries, PipelineError> {
    params.validate()?;

    let priced = series
        .observations()
        .iter()
        .filter(|o| o.has_valid_price())
        .count();
    if priced < 2 {
        return Err(PipelineError::invalid_series(
            series.symbol(),
            format!("need at least 2 observations with a positive price, got {priced}"),
        ));
    }

    let mut market_caps = Vec::with_capacity(series.len());
    let mut break_points: Vec<BreakPoint> = Vec::new();
    let mut walk = Walk::Start;
    let mut previous_price: Option<f64> = None;

    for obs in series.observations() {
        let Some(supply) = obs.implied_supply() else {
            market_caps.push(obs.market_cap);
            continue;
        };
        let price_move = previous_price.map_or(0.0, |p| obs.price / p - 1.0);
        previous_price = Some(obs.price);

        walk = match walk {
            Walk::Start => {
                market_caps.push(obs.market_cap);
                if supply > 0.0 {
                    Walk::Tracking { baseline: supply }
                } else {
                    Walk::Start
                }
            }
            Walk::Tracking { baseline } => {
                let change = (supply - baseline) / baseline;
                if params.is_break(change, price_move) {
                    warn!(
                        symbol = series.symbol(),
                        date = %obs.date,
                        "Detected corrupted supply (drop={:+.1}%, price change={:+.1}%), using baseline {:.0}",
                        change * 100.0,
                        price_move * 100.0,
                        baseline
                    );
                    break_points.push(BreakPoint {
                        date: obs.date,
                        implied_supply: supply,
                        baseline,
                        drop: change,
                        price_move,
                        recovered_on: None,
                    });
                    market_caps.push(baseline * obs.price);
                    Walk::Correcting {
                        baseline,
                        last_reported: supply,
                    }
                } else {
                    market_caps.push(obs.market_cap);
                    if supply > 0.0 {
                        Walk::Tracking { baseline: supply }
                    } else {
                        Walk::Tracking { baseline }
                    }
                }
            }
            Walk::Correcting {
                baseline,
                last_reported,
            } => {
                let change = (supply - baseline) / baseline;
                if change >= -params.recovery_tolerance {
                    debug!(
                        symbol = series.symbol(),
                        date = %obs.date,
                        "Reported supply back in line with baseline {:.0}",
                        baseline
                    );
                    for bp in break_points
                        .iter_mut()
                        .rev()
                        .take_while(|bp| bp.recovered_on.is_none())
                    {
                        bp.recovered_on = Some(obs.date);
                    }
                    market_caps.push(obs.market_cap);
                    Walk::Tracking { baseline: supply }
                } else {
                    // A further collapse inside a corrected range compounds on the
                    // corrected supply, which is the frozen baseline.
                    let reported_change = if last_reported > 0.0 {
                        (supply - last_reported) / last_reported
                    } else {
                        0.0
                    };
                    if params.is_break(reported_change, price_move) {
                        warn!(
                            symbol = series.symbol(),
                            date = %obs.date,
                            "Detected further supply drop of {:+.1}% while correcting, keeping baseline {:.0}",
                            reported_change * 100.0,
                            baseline
                        );
                        break_points.push(BreakPoint {
                            date: obs.date,
                            implied_supply: supply,
                            baseline,
                            drop: reported_change,
                            price_move,
                            recovered_on: None,
                        });
                    }
                    market_caps.push(baseline * obs.price);
                    Walk::Correcting {
                        baseline,
                        last_reported: supply,
                    }
                }
            }
        };
    }

    debug!(
        symbol = series.symbol(),
        breaks = break_points.len(),
        "Supply reconstruction complete"
    );

    Ok(CorrectedSeries {
        original: series.clone(),
        corrected: series.with_market_caps(market_caps),
        break_points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::test_support::{day, series_from};

    fn market_caps(series: &AssetSeries) -> Vec<f64> {
        series.observations().iter().map(|o| o.market_cap).collect()
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_baseline_is_frozen_after_break() {
        let series = series_from(
            "DYDX",
            &[(1.0, 1000.0), (1.0, 1000.0), (1.0, 600.0), (1.0, 600.0), (1.0, 600.0)],
        );
        let result = reconstruct(&series, &ReconstructParams::with_drop_threshold(0.30)).unwrap();

        assert_close(&market_caps(result.corrected()), &[1000.0; 5]);
        assert_eq!(result.break_points().len(), 1);
        let bp = &result.break_points()[0];
        assert_eq!(bp.date, day(2));
        assert_eq!(bp.baseline, 1000.0);
        assert!((bp.drop + 0.4).abs() < 1e-9);
        assert_eq!(bp.recovered_on, None);
        assert_eq!(result.corrected_days(), 3);
        // The fetched series is retained untouched.
        assert_eq!(result.original(), &series);
    }

    #[test]
    fn test_correction_follows_price() {
        let series = series_from(
            "DYDX",
            &[(2.0, 2000.0), (2.0, 2000.0), (2.5, 1500.0), (3.0, 1800.0)],
        );
        let result = reconstruct(&series, &ReconstructParams::default()).unwrap();
        assert_close(
            &market_caps(result.corrected()),
            &[2000.0, 2000.0, 2500.0, 3000.0],
        );
        let prices: Vec<f64> = result.corrected().observations().iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![2.0, 2.0, 2.5, 3.0]);
    }

    #[test]
    fn test_transient_corruption_recovers() {
        let series = series_from(
            "ARB",
            &[
                (1.0, 1000.0),
                (1.0, 1000.0),
                (1.1, 660.0),
                (1.2, 1190.0),
                (1.3, 1287.0),
            ],
        );
        let result = reconstruct(&series, &ReconstructParams::default()).unwrap();

        assert_close(
            &market_caps(result.corrected()),
            &[1000.0, 1000.0, 1100.0, 1190.0, 1287.0],
        );
        assert_eq!(result.break_points()[0].recovered_on, Some(day(3)));
    }

    #[test]
    fn test_supply_increases_are_left_alone() {
        let series = series_from(
            "AVAX",
            &[(1.0, 1000.0), (1.0, 1500.0), (1.0, 3000.0), (2.0, 6100.0), (2.0, 5000.0)],
        );
        let result = reconstruct(&series, &ReconstructParams::default()).unwrap();
        assert_eq!(result.corrected(), &series);
        assert!(!result.is_modified());
    }

    #[test]
    fn test_price_driven_drop_is_not_a_break() {
        // Market cap falls 70% while price falls 50%: implied supply drops 40%,
        // but the price crash accounts for it.
        let series = series_from("DOGE", &[(1.0, 1000.0), (1.0, 1000.0), (0.5, 300.0), (0.5, 300.0)]);
        let result = reconstruct(&series, &ReconstructParams::default()).unwrap();
        assert_eq!(result.corrected(), &series);
    }

    #[test]
    fn test_drop_below_threshold_is_kept() {
        let series = series_from("UNI", &[(1.0, 1000.0), (1.0, 750.0), (1.0, 750.0)]);
        let result = reconstruct(&series, &ReconstructParams::default()).unwrap();
        assert!(!result.is_modified());
    }

    #[test]
    fn test_compounding_breaks_keep_corrected_supply() {
        let series = series_from(
            "SKY",
            &[
                (1.0, 1000.0),
                (1.0, 1000.0),
                (1.0, 600.0),
                (1.0, 600.0),
                (1.0, 360.0),
                (2.0, 720.0),
            ],
        );
        let result = reconstruct(&series, &ReconstructParams::default()).unwrap();
        assert_close(
            &market_caps(result.corrected()),
            &[1000.0, 1000.0, 1000.0, 1000.0, 1000.0, 2000.0],
        );
        let dates: Vec<NaiveDate> = result.break_points().iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![day(2), day(4)]);
        assert!(result.break_points().iter().all(|b| b.baseline == 1000.0));
    }

    #[test]
    fn test_new_break_after_recovery_uses_new_baseline() {
        let series = series_from(
            "LDO",
            &[
                (1.0, 1000.0),
                (1.0, 500.0),
                (1.0, 1000.0),
                (1.0, 2000.0),
                (1.0, 1000.0),
            ],
        );
        let result = reconstruct(&series, &ReconstructParams::default()).unwrap();
        assert_close(
            &market_caps(result.corrected()),
            &[1000.0, 1000.0, 1000.0, 2000.0, 2000.0],
        );
        assert_eq!(result.break_points().len(), 2);
        assert_eq!(result.break_points()[1].baseline, 2000.0);
    }

    #[test]
    fn test_reconstruct_is_idempotent() {
        let series = series_from(
            "TIA",
            &[
                (1.0, 1000.0),
                (1.2, 1200.0),
                (1.1, 500.0),
                (1.0, 450.0),
                (0.0, 10.0),
                (1.3, 1290.0),
                (1.4, 1400.0),
                (1.4, 700.0),
                (1.5, 300.0),
            ],
        );
        let params = ReconstructParams::default();
        let once = reconstruct(&series, &params).unwrap();
        assert!(once.is_modified());
        let twice = reconstruct(once.corrected(), &params).unwrap();
        assert_eq!(twice.corrected(), once.corrected());
        assert!(!twice.is_modified());
        // Deterministic for the same input.
        assert_eq!(reconstruct(&series, &params).unwrap(), once);
    }

    #[test]
    fn test_unpriced_points_pass_through() {
        let series = series_from(
            "W",
            &[(1.0, 1000.0), (0.0, 0.0), (-1.0, 5.0), (1.0, 500.0), (f64::NAN, 7.0)],
        );
        let result = reconstruct(&series, &ReconstructParams::default()).unwrap();
        let caps = market_caps(result.corrected());
        assert_eq!(caps[1], 0.0);
        assert_eq!(caps[2], 5.0);
        assert_eq!(caps[3], 1000.0);
        assert_eq!(caps[4], 7.0);
    }

    #[test]
    fn test_first_valid_point_is_accepted() {
        // Leading zero supply cannot serve as a baseline; tracking starts after it.
        let series = series_from("FART", &[(1.0, 0.0), (1.0, 100.0), (1.0, 50.0)]);
        let result = reconstruct(&series, &ReconstructParams::default()).unwrap();
        assert_close(&market_caps(result.corrected()), &[0.0, 100.0, 100.0]);
        assert_eq!(result.break_points()[0].date, day(2));
    }

    #[test]
    fn test_too_few_priced_points() {
        let series = series_from("BLUR", &[(0.0, 10.0), (1.0, 10.0), (0.0, 10.0)]);
        let err = reconstruct(&series, &ReconstructParams::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSeries { ref symbol, .. } if symbol == "BLUR"));

        let empty = series_from("BLUR", &[]);
        assert!(reconstruct(&empty, &ReconstructParams::default()).is_err());
    }

    #[test]
    fn test_rejects_invalid_params() {
        let series = series_from("BTC", &[(1.0, 1.0), (1.0, 1.0)]);
        for params in [
            ReconstructParams::with_drop_threshold(0.0),
            ReconstructParams::with_drop_threshold(1.0),
            ReconstructParams {
                recovery_tolerance: 0.5,
                ..Default::default()
            },
            ReconstructParams {
                price_tolerance: 0.0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                reconstruct(&series, &params),
                Err(PipelineError::InvalidParameter(_))
            ));
        }
    }
}
