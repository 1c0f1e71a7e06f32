use super::ui;
use crate::core::config::AssetConfig;
use crate::core::pipeline::{AssetOutcome, PipelineContext};
use crate::core::reconstruct::CorrectedSeries;
use anyhow::{Result, bail};
use comfy_table::Cell;

/// One row of the summary table.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSummary {
    pub symbol: String,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub reported_market_cap: Option<f64>,
    pub corrected_market_cap: Option<f64>,
    pub breaks: usize,
    /// Change of the corrected market cap over the fetched window, in percent.
    pub change: Option<f64>,
}

impl AssetSummary {
    pub fn new(asset: &AssetConfig, series: &CorrectedSeries) -> Self {
        let last_reported = series.original().last();
        let last_corrected = series.corrected().last();

        let positive_caps = || {
            series
                .corrected()
                .observations()
                .iter()
                .map(|o| o.market_cap)
                .filter(|mc| mc.is_finite() && *mc > 0.0)
        };
        let change = positive_caps()
            .next()
            .zip(positive_caps().last())
            .map(|(first, last)| (last / first - 1.0) * 100.0);

        AssetSummary {
            symbol: asset.symbol.clone(),
            category: asset.category.clone(),
            price: last_corrected.map(|o| o.price),
            reported_market_cap: last_reported.map(|o| o.market_cap),
            corrected_market_cap: last_corrected.map(|o| o.market_cap),
            breaks: series.break_points().len(),
            change,
        }
    }
}

/// Splits outcomes into table rows and `(symbol, error)` failures.
pub fn collect(outcomes: &[AssetOutcome]) -> (Vec<AssetSummary>, Vec<(String, String)>) {
    let mut rows = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match &outcome.result {
            Ok(series) => rows.push(AssetSummary::new(&outcome.asset, series)),
            Err(e) => failures.push((outcome.asset.symbol.clone(), format!("{e:#}"))),
        }
    }
    (rows, failures)
}

pub fn display_summary(
    title: &str,
    rows: &[AssetSummary],
    failures: &[(String, String)],
) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Category"),
        ui::header_cell("Price"),
        ui::header_cell("Reported MC"),
        ui::header_cell("Corrected MC"),
        ui::header_cell("Breaks"),
        ui::header_cell("Change"),
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(&row.symbol),
            Cell::new(row.category.as_deref().unwrap_or("")),
            ui::format_optional_cell(row.price, ui::format_price),
            ui::format_optional_cell(row.reported_market_cap, ui::format_market_cap),
            ui::format_optional_cell(row.corrected_market_cap, ui::format_market_cap),
            ui::count_cell(row.breaks),
            row.change.map_or_else(|| ui::na_cell(false), ui::change_cell),
        ]);
    }

    let mut output = format!("{}\n\n", ui::style_text(title, ui::StyleType::Title));
    output.push_str(&table.to_string());

    if !failures.is_empty() {
        output.push_str(&format!(
            "\n\n{}",
            ui::style_text("Failed assets:", ui::StyleType::TotalLabel)
        ));
        for (symbol, error) in failures {
            output.push_str(&format!(
                "\n  {}: {}",
                symbol,
                ui::style_text(error, ui::StyleType::Error)
            ));
        }
    }

    output
}

pub async fn run(ctx: &PipelineContext, assets: &[AssetConfig], group: &str) -> Result<()> {
    if assets.is_empty() {
        bail!("No assets match group: {}", group);
    }

    let pb = ui::new_progress_bar(assets.len() as u64, true);
    pb.set_message("Fetching market data...");
    let outcomes = ctx.load_all(assets, &|| pb.inc(1)).await;
    pb.finish_and_clear();

    let (rows, failures) = collect(&outcomes);
    let title = format!(
        "Market caps ({group}, {} days)",
        ctx.settings().history_days
    );
    println!("{}", display_summary(&title, &rows, &failures));
    Ok(())
}
