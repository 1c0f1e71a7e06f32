use super::{chart, ui};
use crate::core::config::{AppConfig, AssetConfig};
use crate::core::correlation::{CorrelationResult, PairStats, correlate, level_correlation};
use crate::core::error::PipelineError;
use crate::core::pipeline::PipelineContext;
use crate::core::reconstruct::CorrectedSeries;
use crate::core::transform::{Smoothing, ValueSeries, smooth};
use anyhow::{Result, anyhow};
use comfy_table::Cell;
use tracing::warn;

pub const DEFAULT_SYMBOL_A: &str = "BTC";
pub const DEFAULT_SYMBOL_B: &str = "ETH";

const IMPLIED_MOVE_PCT: f64 = 10.0;

fn stats_row(label: &str, stats: Option<&PairStats>, days: usize) -> Vec<Cell> {
    vec![
        Cell::new(label),
        Cell::new(stats.map_or(days, |s| s.days)),
        ui::format_optional_cell(stats.and_then(|s| s.correlation), |c| format!("{c:.3}")),
        ui::format_optional_cell(stats.and_then(|s| s.beta), |b| format!("{b:.2}")),
    ]
}

/// Renders a correlation result; `levels` adds the indexed-level coefficient.
pub fn format_correlation(result: &CorrelationResult, levels: Option<Option<f64>>) -> String {
    let (a, b) = (&result.symbol_a, &result.symbol_b);

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Days"),
        ui::header_cell("Count"),
        ui::header_cell("Correlation"),
        ui::header_cell("Beta"),
    ]);
    table.add_row(stats_row("All", Some(&result.overall), result.overall.days));
    table.add_row(stats_row(
        &format!("{a} up"),
        result.positive.as_ref(),
        result.positive_days,
    ));
    table.add_row(stats_row(
        &format!("{a} down"),
        result.negative.as_ref(),
        result.negative_days,
    ));

    let mut output = format!(
        "{}\n\n{}",
        ui::style_text(
            &format!("Correlation (daily returns): {a} vs {b}"),
            ui::StyleType::Title
        ),
        table
    );

    if let Some(level) = levels {
        let level = level.map_or("N/A".to_string(), |c| format!("{c:.3}"));
        output.push_str(&format!("\n\nCorrelation (indexed levels): {level}"));
    }
    if let Some(implied) = result.implied_move(IMPLIED_MOVE_PCT) {
        output.push_str(&format!(
            "\n\nIf {a} {IMPLIED_MOVE_PCT:+.0}%, {b} ≈ {implied:+.1}%"
        ));
    }
    if result.zero_days > 0 {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(
                &format!("{} days where {a} was flat are excluded from the split", result.zero_days),
                ui::StyleType::Subtle
            )
        ));
    }
    output
}

/// One side of a correlation: a plain asset or its `<SYMBOL>.D` dominance.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Leg<'a> {
    Asset(&'a AssetConfig),
    Dominance(&'a AssetConfig),
}

fn resolve<'a>(config: &'a AppConfig, symbol: &str) -> Result<Leg<'a>> {
    let dominance = symbol
        .strip_suffix(".D")
        .or_else(|| symbol.strip_suffix(".d"));
    let base = dominance.unwrap_or(symbol);
    let asset = config
        .find_asset(base)
        .ok_or_else(|| anyhow!("Unknown symbol: {}", symbol))?;
    Ok(match dominance {
        Some(_) => Leg::Dominance(asset),
        None => Leg::Asset(asset),
    })
}

async fn leg_series(
    ctx: &PipelineContext,
    leg: Leg<'_>,
    universe: &[CorrectedSeries],
    smoothing: Smoothing,
) -> Result<ValueSeries> {
    match leg {
        Leg::Asset(asset) => {
            let series = ctx.load_asset(asset).await?;
            Ok(smooth(
                &ValueSeries::from_market_caps(series.corrected()),
                smoothing,
            ))
        }
        Leg::Dominance(asset) => chart::dominance_series(universe, &asset.symbol, smoothing)
            .ok_or_else(|| anyhow!("No dominance data for {}.D", asset.symbol)),
    }
}

pub async fn run(
    ctx: &PipelineContext,
    config: &AppConfig,
    symbol_a: &str,
    symbol_b: &str,
    smoothing: Smoothing,
    levels: bool,
) -> Result<()> {
    let leg_a = resolve(config, symbol_a)?;
    let leg_b = resolve(config, symbol_b)?;

    // Dominance is measured against every configured asset that loads.
    let mut universe = Vec::new();
    if matches!(leg_a, Leg::Dominance(_)) || matches!(leg_b, Leg::Dominance(_)) {
        for outcome in ctx.load_all(&config.assets, &|| ()).await {
            match outcome.result {
                Ok(series) => universe.push(series),
                Err(e) => warn!("Skipping {}: {e:#}", outcome.asset.symbol),
            }
        }
    }

    let (series_a, series_b) = futures::try_join!(
        leg_series(ctx, leg_a, &universe, smoothing),
        leg_series(ctx, leg_b, &universe, smoothing)
    )?;

    let min_days = ctx.settings().min_overlap_days;
    let result = match correlate(&series_a, &series_b, min_days) {
        Ok(result) => result,
        // Too little history is a normal answer, not a failure.
        Err(PipelineError::InsufficientData {
            required,
            available,
        }) => {
            println!(
                "Not enough overlapping data for {} and {} (need at least {} days, got {}).",
                series_a.symbol, series_b.symbol, required, available
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let level = if levels {
        Some(level_correlation(&series_a, &series_b, min_days)?)
    } else {
        None
    };
    println!("{}", format_correlation(&result, level));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(days: usize, correlation: f64, beta: f64) -> PairStats {
        PairStats {
            days,
            correlation: Some(correlation),
            beta: Some(beta),
        }
    }

    fn result() -> CorrelationResult {
        CorrelationResult {
            symbol_a: "BTC".to_string(),
            symbol_b: "ETH".to_string(),
            overall: stats(30, 0.8123, 1.25),
            positive: Some(stats(17, 0.6, 1.1)),
            negative: None,
            positive_days: 17,
            negative_days: 8,
            zero_days: 5,
        }
    }

    #[test]
    fn test_format_correlation() {
        let output = format_correlation(&result(), None);
        assert!(output.contains("BTC vs ETH"));
        assert!(output.contains("0.812"));
        assert!(output.contains("1.25"));
        assert!(output.contains("BTC down"));
        assert!(output.contains("N/A"));
        assert!(output.contains("If BTC +10%, ETH ≈ +12.5%"));
        assert!(output.contains("5 days where BTC was flat"));
        assert!(!output.contains("indexed levels"));
    }

    #[test]
    fn test_resolve_dominance_symbols() {
        let config: AppConfig = serde_yaml::from_str(
            r#"
assets:
  - { id: bitcoin, symbol: BTC }
  - { id: tether, symbol: USDT }
"#,
        )
        .unwrap();

        let Leg::Asset(btc) = resolve(&config, "btc").unwrap() else {
            panic!("BTC should resolve to a plain asset");
        };
        assert_eq!(btc.id, "bitcoin");
        let Leg::Dominance(usdt) = resolve(&config, "usdt.d").unwrap() else {
            panic!("USDT.D should resolve to a dominance leg");
        };
        assert_eq!(usdt.id, "tether");
        assert!(matches!(
            resolve(&config, "USDT.D").unwrap(),
            Leg::Dominance(_)
        ));

        let err = resolve(&config, "ETH.D").unwrap_err();
        assert!(err.to_string().contains("Unknown symbol: ETH.D"));
        assert!(resolve(&config, ".D").is_err());
    }

    #[test]
    fn test_format_with_levels() {
        let output = format_correlation(&result(), Some(Some(0.95)));
        assert!(output.contains("Correlation (indexed levels): 0.950"));

        let flat = format_correlation(&result(), Some(None));
        assert!(flat.contains("Correlation (indexed levels): N/A"));
    }
}
