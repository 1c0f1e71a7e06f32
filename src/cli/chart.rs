use super::ui;
use crate::core::config::AppConfig;
use crate::core::pipeline::PipelineContext;
use crate::core::reconstruct::CorrectedSeries;
use crate::core::transform::{
    NormalizeMode, NormalizedSeries, Smoothing, ValueSeries, dominance_index, normalize, smooth,
};
use anyhow::{Result, bail};
use chrono::NaiveDate;
use comfy_table::Cell;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// Smoothed corrected market caps, in input order.
pub fn smoothed_caps(results: &[CorrectedSeries], smoothing: Smoothing) -> Vec<ValueSeries> {
    results
        .iter()
        .map(|c| smooth(&ValueSeries::from_market_caps(c.corrected()), smoothing))
        .collect()
}

/// Share of `target` in the total of every series in `results`, indexed to 100.
pub fn dominance_series(
    results: &[CorrectedSeries],
    target: &str,
    smoothing: Smoothing,
) -> Option<ValueSeries> {
    if results.len() < 2 {
        return None;
    }
    dominance_index(target, &smoothed_caps(results, smoothing))
}

fn is_selected(symbol: &str, selected: &[String]) -> bool {
    selected.iter().any(|s| s.eq_ignore_ascii_case(symbol))
}

/// Smooths and normalizes the `selected` series. In indexed views the
/// dominance of `dominance_symbol` within all of `results` is appended as
/// `<SYMBOL>.D`, so the selection never changes the total.
pub fn build_chart(
    results: &[CorrectedSeries],
    selected: &[String],
    smoothing: Smoothing,
    mode: NormalizeMode,
    dominance_symbol: Option<&str>,
) -> Vec<NormalizedSeries> {
    let smoothed = smoothed_caps(results, smoothing);

    let mut chart: Vec<NormalizedSeries> = smoothed
        .iter()
        .filter(|s| is_selected(&s.symbol, selected))
        .map(|s| normalize(s, mode))
        .collect();

    if mode.is_indexed() && smoothed.len() > 1 {
        if let Some(dominance) = dominance_symbol.and_then(|sym| dominance_index(sym, &smoothed)) {
            chart.push(normalize(&dominance, mode));
        }
    }
    chart
}

/// Renders the last `rows` dates as a table with one column per series.
pub fn render_table(series: &[NormalizedSeries], rows: usize) -> String {
    let dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.date))
        .collect();
    let lookup: Vec<HashMap<NaiveDate, f64>> = series
        .iter()
        .map(|s| s.points.iter().map(|p| (p.date, p.display)).collect())
        .collect();

    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("Date")];
    header.extend(series.iter().map(|s| ui::header_cell(&s.symbol)));
    table.set_header(header);

    let skip = dates.len().saturating_sub(rows);
    for date in dates.into_iter().skip(skip) {
        let mut row = vec![Cell::new(date)];
        for (s, values) in series.iter().zip(&lookup) {
            let log = s.mode.is_log();
            row.push(ui::format_optional_cell(values.get(&date).copied(), |v| {
                if log {
                    format!("{v:.3}")
                } else {
                    format!("{v:.2}")
                }
            }));
        }
        table.add_row(row);
    }
    table.to_string()
}

pub async fn run(
    ctx: &PipelineContext,
    config: &AppConfig,
    symbols: &[String],
    smoothing: Smoothing,
    mode: NormalizeMode,
    rows: usize,
) -> Result<()> {
    if symbols.is_empty() {
        bail!("No symbols given");
    }
    let mut assets = Vec::new();
    for symbol in symbols {
        match config.find_asset(symbol) {
            Some(asset) => assets.push(asset.clone()),
            None => bail!("Unknown symbol: {}", symbol),
        }
    }

    // Dominance is a share of every configured asset, not just the selection.
    let dominance = config
        .dominance_symbol
        .as_deref()
        .filter(|_| mode.is_indexed())
        .and_then(|sym| config.find_asset(sym));
    if dominance.is_some() {
        for asset in &config.assets {
            if !assets.iter().any(|a| a.id == asset.id) {
                assets.push(asset.clone());
            }
        }
    }

    let pb = ui::new_progress_bar(assets.len() as u64, true);
    pb.set_message("Fetching market data...");
    let outcomes = ctx.load_all(&assets, &|| pb.inc(1)).await;
    pb.finish_and_clear();

    let mut results = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(series) => results.push(series),
            Err(e) => warn!("Skipping {}: {e:#}", outcome.asset.symbol),
        }
    }
    if !results.iter().any(|r| is_selected(r.symbol(), symbols)) {
        bail!("No data available for {}", symbols.join(", "));
    }

    let chart = build_chart(
        &results,
        symbols,
        smoothing,
        mode,
        dominance.map(|a| a.symbol.as_str()),
    );

    let scale = if mode.is_log() { ", log10" } else { "" };
    println!(
        "{}",
        ui::style_text(
            &format!("Market cap ({mode}, {smoothing}{scale})"),
            ui::StyleType::Title
        )
    );
    println!("{}", render_table(&chart, rows));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::correlation::correlate;
    use crate::core::reconstruct::{ReconstructParams, reconstruct};
    use crate::core::series::test_support::series_from;

    fn corrected(symbol: &str, caps: &[f64]) -> CorrectedSeries {
        let points: Vec<(f64, f64)> = caps.iter().map(|mc| (1.0, *mc)).collect();
        reconstruct(&series_from(symbol, &points), &ReconstructParams::default()).unwrap()
    }

    fn selection(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_indexed_chart_adds_dominance() {
        let results = vec![
            corrected("BTC", &[100.0, 110.0, 120.0]),
            corrected("USDT", &[100.0, 100.0, 100.0]),
        ];
        let chart = build_chart(
            &results,
            &selection(&["BTC", "USDT"]),
            Smoothing::None,
            NormalizeMode::IndexLinear,
            Some("USDT"),
        );

        let symbols: Vec<&str> = chart.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC", "USDT", "USDT.D"]);
        assert!((chart[0].points[2].value - 120.0).abs() < 1e-9);
        // USDT's share falls from 50% to 100/220.
        let dom = &chart[2].points;
        assert_eq!(dom[0].value, 100.0);
        assert!((dom[2].value - (100.0 / 220.0) / 0.5 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_dominance_ignores_selection() {
        let results = vec![
            corrected("BTC", &[100.0, 100.0]),
            corrected("ETH", &[100.0, 300.0]),
            corrected("USDT", &[100.0, 100.0]),
        ];
        let narrow = build_chart(
            &results,
            &selection(&["btc"]),
            Smoothing::None,
            NormalizeMode::IndexLinear,
            Some("USDT"),
        );
        let wide = build_chart(
            &results,
            &selection(&["BTC", "ETH", "USDT"]),
            Smoothing::None,
            NormalizeMode::IndexLinear,
            Some("USDT"),
        );

        let symbols: Vec<&str> = narrow.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC", "USDT.D"]);
        assert_eq!(wide.len(), 4);
        // USDT's share drops from 1/3 to 1/5 of the total.
        let narrow_dom = narrow.last().unwrap();
        let wide_dom = wide.last().unwrap();
        assert!((narrow_dom.points[1].value - 60.0).abs() < 1e-9);
        assert_eq!(narrow_dom.values(), wide_dom.values());
    }

    #[test]
    fn test_dominance_series_correlates_with_assets() {
        let results = vec![
            corrected("BTC", &[100.0, 120.0, 90.0, 130.0, 110.0]),
            corrected("USDT", &[50.0, 50.0, 50.0, 50.0, 50.0]),
        ];
        let dominance = dominance_series(&results, "USDT", Smoothing::None).unwrap();
        assert_eq!(dominance.symbol, "USDT.D");
        assert_eq!(dominance.points.len(), 5);

        let btc = ValueSeries::from_market_caps(results[0].corrected());
        let result = correlate(&btc, &dominance, 2).unwrap();
        assert_eq!(result.symbol_b, "USDT.D");
        // A flat stablecoin's share moves against BTC.
        assert!(result.overall.correlation.unwrap() < 0.0);

        assert!(dominance_series(&results[..1], "BTC", Smoothing::None).is_none());
        assert!(dominance_series(&results, "ETH", Smoothing::None).is_none());
    }

    #[test]
    fn test_raw_view_has_no_dominance() {
        let results = vec![
            corrected("BTC", &[100.0, 1000.0]),
            corrected("USDT", &[100.0, 100.0]),
        ];
        let chart = build_chart(
            &results,
            &selection(&["BTC", "USDT"]),
            Smoothing::None,
            NormalizeMode::RawLog,
            Some("USDT"),
        );
        assert_eq!(chart.len(), 2);
        assert!((chart[0].points[1].display - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_chart_plots_corrected_values() {
        let results = vec![corrected("DYDX", &[1000.0, 1000.0, 600.0, 600.0])];
        let chart = build_chart(
            &results,
            &selection(&["DYDX"]),
            Smoothing::None,
            NormalizeMode::IndexLinear,
            None,
        );
        assert!(chart[0].points.iter().all(|p| p.value == 100.0));
    }

    #[test]
    fn test_render_table_tail() {
        let results = vec![corrected("BTC", &[100.0, 110.0, 120.0, 130.0])];
        let chart = build_chart(
            &results,
            &selection(&["BTC"]),
            Smoothing::None,
            NormalizeMode::IndexLinear,
            None,
        );
        let table = render_table(&chart, 2);
        assert!(table.contains("2025-01-04"));
        assert!(table.contains("130.00"));
        assert!(!table.contains("2025-01-02"));
    }
}
