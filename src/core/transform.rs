//! Smoothing and normalization of corrected market-cap series
use crate::core::series::AssetSeries;
use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// A single numeric value per date for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSeries {
    pub symbol: String,
    pub points: Vec<ValuePoint>,
}

impl ValueSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<ValuePoint>) -> Self {
        ValueSeries {
            symbol: symbol.into(),
            points,
        }
    }

    /// Market caps of a series; non-finite and non-positive values are dropped.
    pub fn from_market_caps(series: &AssetSeries) -> Self {
        let points = series
            .observations()
            .iter()
            .filter(|o| o.market_cap.is_finite() && o.market_cap > 0.0)
            .map(|o| ValuePoint {
                date: o.date,
                value: o.market_cap,
            })
            .collect();
        ValueSeries::new(series.symbol(), points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&ValuePoint> {
        self.points.last()
    }

    fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Smoothing {
    None,
    #[default]
    Sma7,
    Ema14,
    Sma30,
}

impl Display for Smoothing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Smoothing::None => "none",
                Smoothing::Sma7 => "7d-sma",
                Smoothing::Ema14 => "14d-ema",
                Smoothing::Sma30 => "30d-sma",
            }
        )
    }
}

impl FromStr for Smoothing {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(Smoothing::None),
            "7d-sma" | "sma7" => Ok(Smoothing::Sma7),
            "14d-ema" | "ema14" => Ok(Smoothing::Ema14),
            "30d-sma" | "sma30" => Ok(Smoothing::Sma30),
            _ => Err(anyhow!("Invalid smoothing: {}", s)),
        }
    }
}

/// Applies the moving average to one asset's values.
///
/// Simple moving averages have no value for the first `window - 1` dates, so
/// the output is shorter than the input (and empty when the window is longer
/// than the series). The exponential average is seeded with the first value.
pub fn smooth(series: &ValueSeries, smoothing: Smoothing) -> ValueSeries {
    let points = match smoothing {
        Smoothing::None => series.points.clone(),
        Smoothing::Sma7 => simple_moving_average(series, 7),
        Smoothing::Sma30 => simple_moving_average(series, 30),
        Smoothing::Ema14 => exponential_moving_average(series, 14),
    };
    ValueSeries::new(series.symbol.clone(), points)
}

fn simple_moving_average(series: &ValueSeries, window: usize) -> Vec<ValuePoint> {
    if window == 0 || series.len() < window {
        return Vec::new();
    }
    let values: Vec<f64> = series.values().collect();
    let mut sum: f64 = values[..window].iter().sum();
    let mut out = Vec::with_capacity(values.len() - window + 1);
    out.push(ValuePoint {
        date: series.points[window - 1].date,
        value: sum / window as f64,
    });
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out.push(ValuePoint {
            date: series.points[i].date,
            value: sum / window as f64,
        });
    }
    out
}

fn exponential_moving_average(series: &ValueSeries, span: usize) -> Vec<ValuePoint> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut ema: Option<f64> = None;
    series
        .points
        .iter()
        .map(|p| {
            let next = ema.map_or(p.value, |prev| alpha * p.value + (1.0 - alpha) * prev);
            ema = Some(next);
            ValuePoint {
                date: p.date,
                value: next,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NormalizeMode {
    /// Raw values on a log axis.
    RawLog,
    /// Indexed so the first value is 100.
    #[default]
    IndexLinear,
    IndexLog,
}

impl NormalizeMode {
    pub fn is_indexed(&self) -> bool {
        matches!(self, NormalizeMode::IndexLinear | NormalizeMode::IndexLog)
    }

    pub fn is_log(&self) -> bool {
        matches!(self, NormalizeMode::RawLog | NormalizeMode::IndexLog)
    }
}

impl Display for NormalizeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                NormalizeMode::RawLog => "raw-log",
                NormalizeMode::IndexLinear => "index-linear",
                NormalizeMode::IndexLog => "index-log",
            }
        )
    }
}

impl FromStr for NormalizeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw-log" | "raw" => Ok(NormalizeMode::RawLog),
            "index-linear" | "index" => Ok(NormalizeMode::IndexLinear),
            "index-log" => Ok(NormalizeMode::IndexLog),
            _ => Err(anyhow!("Invalid view mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedPoint {
    pub date: NaiveDate,
    /// Raw or indexed value before any log scaling; correlation uses this.
    pub value: f64,
    /// What a chart plots: `log10(value)` in the log modes.
    pub display: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedSeries {
    pub symbol: String,
    pub mode: NormalizeMode,
    pub points: Vec<NormalizedPoint>,
}

impl NormalizedSeries {
    /// The pre-log values as a plain series.
    pub fn values(&self) -> ValueSeries {
        ValueSeries::new(
            self.symbol.clone(),
            self.points
                .iter()
                .map(|p| ValuePoint {
                    date: p.date,
                    value: p.value,
                })
                .collect(),
        )
    }
}

/// Rescales a series so its first finite positive value maps to 100.
pub fn normalize(series: &ValueSeries, mode: NormalizeMode) -> NormalizedSeries {
    normalize_from(series, mode, None)
}

/// Like [`normalize`], but indexes to the first valid value on or after
/// `base_date`. Earlier points are dropped.
pub fn normalize_at(
    series: &ValueSeries,
    mode: NormalizeMode,
    base_date: NaiveDate,
) -> NormalizedSeries {
    normalize_from(series, mode, Some(base_date))
}

fn normalize_from(
    series: &ValueSeries,
    mode: NormalizeMode,
    base_date: Option<NaiveDate>,
) -> NormalizedSeries {
    let in_range = series
        .points
        .iter()
        .filter(|p| base_date.is_none_or(|base| p.date >= base))
        .filter(|p| p.value.is_finite() && p.value > 0.0);

    let mut points = Vec::new();
    let mut base: Option<f64> = None;
    for p in in_range {
        let value = if mode.is_indexed() {
            let first = *base.get_or_insert(p.value);
            p.value / first * 100.0
        } else {
            p.value
        };
        let display = if mode.is_log() { value.log10() } else { value };
        points.push(NormalizedPoint {
            date: p.date,
            value,
            display,
        });
    }

    NormalizedSeries {
        symbol: series.symbol.clone(),
        mode,
        points,
    }
}

/// Share of `target` in the total of `universe`, indexed to 100.
///
/// Only dates every member reports are used, so the total is never
/// understated by a missing asset. `target` must be part of `universe`.
pub fn dominance_index(target: &str, universe: &[ValueSeries]) -> Option<ValueSeries> {
    let target_series = universe.iter().find(|s| s.symbol == target)?;

    let mut totals: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for series in universe {
        for p in series.points.iter().filter(|p| p.value.is_finite()) {
            let entry = totals.entry(p.date).or_insert((0.0, 0));
            entry.0 += p.value;
            entry.1 += 1;
        }
    }

    let shares: Vec<ValuePoint> = target_series
        .points
        .iter()
        .filter_map(|p| {
            let (total, members) = totals.get(&p.date)?;
            (*members == universe.len() && *total > 0.0).then(|| ValuePoint {
                date: p.date,
                value: p.value / total * 100.0,
            })
        })
        .collect();

    let share_series = ValueSeries::new(format!("{target}.D"), shares);
    Some(normalize(&share_series, NormalizeMode::IndexLinear).values())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::test_support::{day, series_from};

    fn values_series(symbol: &str, values: &[f64]) -> ValueSeries {
        ValueSeries::new(
            symbol,
            values
                .iter()
                .enumerate()
                .map(|(i, v)| ValuePoint {
                    date: day(i as i64),
                    value: *v,
                })
                .collect(),
        )
    }

    fn values_of(series: &ValueSeries) -> Vec<f64> {
        series.points.iter().map(|p| p.value).collect()
    }

    #[test]
    fn test_from_market_caps_drops_bad_points() {
        let asset = series_from("ETH", &[(1.0, 100.0), (1.0, 0.0), (1.0, f64::NAN), (1.0, -5.0), (1.0, 120.0)]);
        let values = ValueSeries::from_market_caps(&asset);
        assert_eq!(values_of(&values), vec![100.0, 120.0]);
        assert_eq!(values.points[1].date, day(4));
    }

    #[test]
    fn test_sma_omits_warmup_points() {
        let series = values_series("BTC", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let smoothed = smooth(&series, Smoothing::Sma7);
        assert_eq!(values_of(&smoothed), vec![4.0, 5.0, 6.0]);
        assert_eq!(smoothed.points[0].date, day(6));
    }

    #[test]
    fn test_sma_window_longer_than_series() {
        let series = values_series("BTC", &[1.0; 10]);
        assert!(smooth(&series, Smoothing::Sma30).is_empty());
    }

    #[test]
    fn test_ema_seeded_with_first_value() {
        let series = values_series("BTC", &[10.0, 25.0]);
        let smoothed = smooth(&series, Smoothing::Ema14);
        let alpha = 2.0 / 15.0;
        assert_eq!(smoothed.len(), 2);
        assert_eq!(smoothed.points[0].value, 10.0);
        assert!((smoothed.points[1].value - (alpha * 25.0 + (1.0 - alpha) * 10.0)).abs() < 1e-12);
    }

    #[test]
    fn test_no_smoothing_is_identity() {
        let series = values_series("BTC", &[3.0, 1.0, 2.0]);
        assert_eq!(smooth(&series, Smoothing::None), series);
    }

    #[test]
    fn test_index_linear_starts_at_100() {
        let series = values_series("SOL", &[0.0, 50.0, 75.0, 25.0]);
        let normalized = normalize(&series, NormalizeMode::IndexLinear);
        let values: Vec<f64> = normalized.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![100.0, 150.0, 50.0]);
        assert_eq!(normalized.points[0].date, day(1));
        assert!(normalized.points.iter().all(|p| p.display == p.value));
    }

    #[test]
    fn test_log_modes_keep_pre_log_value() {
        let series = values_series("SOL", &[10.0, 100.0]);
        let raw = normalize(&series, NormalizeMode::RawLog);
        assert_eq!(raw.points[1].value, 100.0);
        assert!((raw.points[1].display - 2.0).abs() < 1e-12);

        let indexed = normalize(&series, NormalizeMode::IndexLog);
        assert_eq!(indexed.points[1].value, 1000.0);
        assert!((indexed.points[1].display - 3.0).abs() < 1e-12);
        assert_eq!(indexed.values().points[0].value, 100.0);
    }

    #[test]
    fn test_normalize_at_base_date() {
        let series = values_series("DYDX", &[5.0, 1.0, 40.0, 80.0]);
        let normalized = normalize_at(&series, NormalizeMode::IndexLinear, day(2));
        let values: Vec<f64> = normalized.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![100.0, 200.0]);
    }

    #[test]
    fn test_dominance_index() {
        let usdt = values_series("USDT", &[10.0, 10.0, 20.0]);
        let btc = values_series("BTC", &[90.0, 40.0, 80.0]);
        let dominance = dominance_index("USDT", &[usdt, btc]).unwrap();
        assert_eq!(dominance.symbol, "USDT.D");
        let values = values_of(&dominance);
        assert_eq!(values.len(), 3);
        assert!((values[0] - 100.0).abs() < 1e-9);
        assert!((values[1] - 200.0).abs() < 1e-9);
        assert!((values[2] - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_dominance_skips_partial_dates() {
        let usdt = values_series("USDT", &[10.0, 10.0]);
        let btc = ValueSeries::new(
            "BTC",
            vec![ValuePoint {
                date: day(1),
                value: 10.0,
            }],
        );
        let dominance = dominance_index("USDT", &[usdt, btc.clone()]).unwrap();
        assert_eq!(dominance.len(), 1);
        assert!(dominance_index("USDT", &[btc]).is_none());
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("7D-SMA".parse::<Smoothing>().unwrap(), Smoothing::Sma7);
        assert_eq!("14d-ema".parse::<Smoothing>().unwrap(), Smoothing::Ema14);
        assert!("5d-sma".parse::<Smoothing>().is_err());
        assert_eq!("index-log".parse::<NormalizeMode>().unwrap(), NormalizeMode::IndexLog);
        assert_eq!(Smoothing::Sma30.to_string(), "30d-sma");
    }
}
