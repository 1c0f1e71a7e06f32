use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use mcap::core::log::init_logging;
use mcap::core::transform::{NormalizeMode, Smoothing};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for mcap::AppCommand {
    fn from(cmd: Commands) -> mcap::AppCommand {
        match cmd {
            Commands::Summary { group } => mcap::AppCommand::Summary { group },
            Commands::Chart {
                symbols,
                smoothing,
                view,
                rows,
            } => mcap::AppCommand::Chart {
                symbols,
                smoothing,
                view,
                rows,
            },
            Commands::Corr {
                symbol_a,
                symbol_b,
                smoothing,
                levels,
            } => mcap::AppCommand::Corr {
                symbol_a,
                symbol_b,
                smoothing,
                levels,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display reported and corrected market caps
    Summary {
        /// `all`, a group name, or groups joined with `+` (e.g. infra+memes)
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Display smoothed, normalized market caps per date
    Chart {
        /// Comma separated symbols, e.g. BTC,ETH
        #[arg(short, long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,
        /// none, 7d-sma, 14d-ema or 30d-sma
        #[arg(long, default_value_t = Smoothing::default())]
        smoothing: Smoothing,
        /// raw-log, index-linear or index-log
        #[arg(long, default_value_t = NormalizeMode::default())]
        view: NormalizeMode,
        /// Number of most recent dates to show
        #[arg(short, long, default_value_t = mcap::DEFAULT_CHART_ROWS)]
        rows: usize,
    },
    /// Display return correlation and beta of B against A
    ///
    /// Either symbol may be written as `<SYMBOL>.D` to use its dominance.
    Corr {
        symbol_a: Option<String>,
        symbol_b: Option<String>,
        #[arg(long, default_value_t = Smoothing::default())]
        smoothing: Smoothing,
        /// Also correlate indexed levels
        #[arg(long)]
        levels: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => mcap::cli::setup::setup(),
        Some(cmd) => mcap::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
