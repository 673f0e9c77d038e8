//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::opinion_file_adapter;
use crate::domain::aggregator::{aggregate_stream, group_by_timestamp};
use crate::domain::backtest::{self as backtest_engine, BacktestResult};
use crate::domain::config_validation::{load_settings, DataConfig, Settings};
use crate::domain::decision::TimedDecision;
use crate::domain::error::CryptofundError;
use crate::domain::ohlcv::format_timestamp;
use crate::domain::opinion::TimedOpinion;
use crate::domain::persona::{self, MarketSnapshot, Persona, PERSONAS};
use crate::domain::price_series::{AssetSeries, PriceBook};
use crate::domain::risk::apply_volatility_haircut;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "cryptofund",
    about = "Aggregate analyst opinions into trade decisions and backtest them"
)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest from an opinion or decision stream
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// JSON opinion stream, aggregated before simulation
        #[arg(long, conflicts_with = "decisions", required_unless_present = "decisions")]
        opinions: Option<PathBuf>,
        /// JSON decision stream, replayed as is
        #[arg(long)]
        decisions: Option<PathBuf>,
        /// Report directory (overrides [report] output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Aggregate an opinion stream into decisions
    Aggregate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        opinions: PathBuf,
        /// Write the decision stream as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List assets with price data
    ListAssets {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List analyst personas, or preview their prompts for an asset
    Personas {
        #[arg(short, long, requires = "asset")]
        config: Option<PathBuf>,
        #[arg(long, requires = "config")]
        asset: Option<String>,
        /// Only this persona, by key
        #[arg(long, value_parser = parse_persona)]
        persona: Option<&'static Persona>,
    },
}

fn parse_persona(key: &str) -> Result<&'static Persona, String> {
    persona::find(key).ok_or_else(|| {
        let keys: Vec<&str> = PERSONAS.iter().map(|p| p.key).collect();
        format!("unknown persona '{key}' (expected one of {})", keys.join(", "))
    })
}

/// Where the decision stream comes from.
#[derive(Debug, Clone)]
pub enum SignalInput {
    Opinions(PathBuf),
    Decisions(PathBuf),
}

/// Install the stderr log subscriber. `RUST_LOG` applies unless `verbose`.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            opinions,
            decisions,
            output,
            dry_run,
        } => {
            let input = match (opinions, decisions) {
                (Some(path), _) => SignalInput::Opinions(path),
                (None, Some(path)) => SignalInput::Decisions(path),
                (None, None) => {
                    eprintln!("error: one of --opinions or --decisions is required");
                    return ExitCode::from(2);
                }
            };
            if dry_run {
                run_dry_run(&config, &input)
            } else {
                run_backtest(&config, &input, output.as_deref())
            }
        }
        Command::Aggregate {
            config,
            opinions,
            output,
        } => run_aggregate(&config, &opinions, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::ListAssets { config } => run_list_assets(&config),
        Command::Personas {
            config,
            asset,
            persona,
        } => run_personas(config.as_deref(), asset.as_deref(), persona),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, CryptofundError> {
    FileConfigAdapter::from_file(path).map_err(|e| CryptofundError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn load_settings_from(path: &Path) -> Result<Settings, CryptofundError> {
    info!(path = %path.display(), "loading config");
    let adapter = load_config(path)?;
    load_settings(&adapter)
}

/// Load every configured asset into a price book.
///
/// With no configured asset list, every asset the port knows about is
/// loaded. An asset without bars in range is fatal.
pub fn load_price_book(
    data_port: &dyn DataPort,
    data: &DataConfig,
) -> Result<PriceBook, CryptofundError> {
    let assets = if data.assets.is_empty() {
        data_port.list_assets()?
    } else {
        data.assets.clone()
    };
    if assets.is_empty() {
        return Err(CryptofundError::EmptyPriceBook);
    }

    let mut series = Vec::with_capacity(assets.len());
    for asset in assets {
        let bars = data_port.fetch_ohlcv(&asset, data.start, data.end)?;
        info!(asset = %asset, bars = bars.len(), "loaded price series");
        series.push(AssetSeries::new(asset, bars)?);
    }

    let book = PriceBook::new(series)?;
    match &data.reference_asset {
        Some(reference) => book.with_reference(reference),
        None => Ok(book),
    }
}

/// Aggregate an opinion stream, applying the risk overlay per evaluation point.
pub fn decisions_from_opinions(
    opinions: Vec<TimedOpinion>,
    book: Option<&PriceBook>,
    settings: &Settings,
) -> Result<Vec<TimedDecision>, CryptofundError> {
    let mut batches = group_by_timestamp(opinions);
    info!(evaluation_points = batches.len(), "grouped opinions");

    if settings.risk.enabled {
        match book {
            Some(book) => {
                for (&at, batch) in batches.iter_mut() {
                    *batch = apply_volatility_haircut(batch, book, at, &settings.risk);
                }
            }
            None => warn!("risk overlay enabled but no price data loaded, skipping"),
        }
    }

    aggregate_stream(&batches, &settings.aggregator)
}

fn read_signal_input(
    input: &SignalInput,
    book: &PriceBook,
    settings: &Settings,
) -> Result<Vec<TimedDecision>, CryptofundError> {
    let mut decisions = match input {
        SignalInput::Opinions(path) => {
            let opinions = opinion_file_adapter::read_opinions(path)?;
            info!(count = opinions.len(), path = %path.display(), "read opinions");
            decisions_from_opinions(opinions, Some(book), settings)?
        }
        SignalInput::Decisions(path) => {
            let decisions = opinion_file_adapter::read_decisions(path)?;
            info!(count = decisions.len(), path = %path.display(), "read decisions");
            decisions
        }
    };
    // Files are not required to be time-ordered; keep file order within a timestamp.
    decisions.sort_by_key(|d| d.timestamp);
    Ok(decisions)
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    report_port: &dyn ReportPort,
    settings: &Settings,
    input: &SignalInput,
    output: Option<&Path>,
) -> Result<BacktestResult, CryptofundError> {
    let book = load_price_book(data_port, &settings.data)?;
    let decisions = read_signal_input(input, &book, settings)?;

    let result = backtest_engine::run_backtest(&decisions, &book, &settings.backtest)?;
    print_summary(&result);

    if let Some(dir) = output.or(settings.report_dir.as_deref()) {
        report_port.write(&result, dir)?;
        println!("\nReport written to: {}", dir.display());
    }
    Ok(result)
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!("=== Backtest Results ===");
    println!("Final Value:      {:.2}", m.final_value);
    println!("Total Return:     {:.2}%", m.total_return);
    println!("Annualized:       {:.2}%", m.annualized_return);
    println!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    println!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    println!("Max Drawdown:     {:.2}%", m.max_drawdown);
    println!("Max DD Duration:  {} rows", m.max_drawdown_duration);
    println!(
        "Total Trades:     {} ({} buy, {} sell)",
        m.total_trades, m.buy_trades, m.sell_trades
    );
    println!("Total Fees:       {:.2}", m.total_fees);
    println!("Skipped:          {}", result.skipped.len());

    if !result.final_state.holdings.is_empty() {
        println!("\n=== Open Positions ===");
        for (asset, quantity) in &result.final_state.holdings {
            println!("  {:<8} {:.8}", asset, quantity);
        }
    }
}

fn run_backtest(
    config_path: &Path,
    input: &SignalInput,
    output: Option<&Path>,
) -> Result<(), CryptofundError> {
    let settings = load_settings_from(config_path)?;
    let data_port = CsvAdapter::new(settings.data.price_dir.clone());
    run_backtest_pipeline(&data_port, &CsvReportAdapter, &settings, input, output)?;
    Ok(())
}

pub fn run_dry_run(config_path: &Path, input: &SignalInput) -> Result<(), CryptofundError> {
    let settings = load_settings_from(config_path)?;
    println!("Config validated successfully");

    let data_port = CsvAdapter::new(settings.data.price_dir.clone());
    let book = load_price_book(&data_port, &settings.data)?;
    println!("\nPrice data (reference {}):", book.reference_asset());
    for asset in book.assets() {
        if let Some(series) = book.get(asset) {
            println!("  {:<8} {} bars", asset, series.bar_count());
        }
    }

    let decisions = read_signal_input(input, &book, &settings)?;
    let actionable = decisions
        .iter()
        .filter(|d| d.decision.size > 0.0)
        .count();
    println!(
        "\nDecision stream: {} decisions, {} actionable",
        decisions.len(),
        actionable
    );
    println!("\nDry run complete: configuration is valid");
    Ok(())
}

fn run_aggregate(
    config_path: &Path,
    opinions_path: &Path,
    output: Option<&Path>,
) -> Result<(), CryptofundError> {
    let settings = load_settings_from(config_path)?;
    let opinions = opinion_file_adapter::read_opinions(opinions_path)?;

    let book = if settings.risk.enabled {
        let data_port = CsvAdapter::new(settings.data.price_dir.clone());
        Some(load_price_book(&data_port, &settings.data)?)
    } else {
        None
    };
    let decisions = decisions_from_opinions(opinions, book.as_ref(), &settings)?;

    for timed in &decisions {
        let d = &timed.decision;
        println!(
            "{}  {:<8} {:<4}  size {:.2}  confidence {:.2}",
            format_timestamp(timed.timestamp),
            d.asset,
            d.action,
            d.size,
            d.confidence
        );
    }

    if let Some(path) = output {
        opinion_file_adapter::write_decisions(path, &decisions)?;
        println!("\nDecisions written to: {}", path.display());
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), CryptofundError> {
    let settings = load_settings_from(config_path)?;
    println!("[data]        price_dir = {}", settings.data.price_dir.display());
    if !settings.data.assets.is_empty() {
        println!("              assets = {}", settings.data.assets.join(", "));
    }
    println!(
        "[backtest]    initial_cash = {}, fee_rate = {}",
        settings.backtest.initial_cash, settings.backtest.fee_rate
    );
    println!(
        "[aggregator]  decision_threshold = {}, max_position_size = {}",
        settings.aggregator.decision_threshold, settings.aggregator.max_position_size
    );
    println!(
        "[risk]        enabled = {}, window = {}, threshold = {}%",
        settings.risk.enabled,
        settings.risk.volatility_window,
        settings.risk.volatility_threshold_pct
    );
    println!("\nConfiguration is valid.");
    Ok(())
}

fn run_list_assets(config_path: &Path) -> Result<(), CryptofundError> {
    let settings = load_settings_from(config_path)?;
    let data_port = CsvAdapter::new(settings.data.price_dir.clone());
    let assets = data_port.list_assets()?;
    if assets.is_empty() {
        println!("No price files found in {}", settings.data.price_dir.display());
        return Ok(());
    }

    for asset in &assets {
        match data_port.fetch_ohlcv(asset, None, None) {
            Ok(bars) => match (bars.first(), bars.last()) {
                (Some(first), Some(last)) => println!(
                    "{:<8} {:>6} bars  {} .. {}",
                    asset,
                    bars.len(),
                    format_timestamp(first.timestamp),
                    format_timestamp(last.timestamp)
                ),
                _ => println!("{:<8} no bars", asset),
            },
            Err(e) => warn!(asset = %asset, error = %e, "unreadable price file"),
        }
    }
    println!("\n{} assets found", assets.len());
    Ok(())
}

fn run_personas(
    config_path: Option<&Path>,
    asset: Option<&str>,
    only: Option<&'static Persona>,
) -> Result<(), CryptofundError> {
    let selected: Vec<&Persona> = match only {
        Some(p) => vec![p],
        None => PERSONAS.iter().collect(),
    };

    let (Some(config_path), Some(asset)) = (config_path, asset) else {
        for p in &selected {
            println!("{:<12} {:<18} {}", p.key, p.name, p.focus_asset.unwrap_or("all"));
        }
        return Ok(());
    };

    let settings = load_settings_from(config_path)?;
    let data_port = CsvAdapter::new(settings.data.price_dir.clone());
    let bars = data_port.fetch_ohlcv(asset, settings.data.start, settings.data.end)?;
    let series = AssetSeries::new(asset.to_string(), bars)?;
    let at = series
        .bars
        .last()
        .map(|b| b.timestamp)
        .ok_or_else(|| CryptofundError::NoData {
            asset: asset.to_string(),
        })?;
    let snapshot = MarketSnapshot::from_series(&series, at).ok_or_else(|| {
        CryptofundError::NoData {
            asset: asset.to_string(),
        }
    })?;

    let covering: Vec<&Persona> = selected.into_iter().filter(|p| p.covers(asset)).collect();
    if covering.is_empty() {
        println!("No selected persona covers {asset}");
    }
    for p in covering {
        println!("=== {} ({}) ===", p.name, p.key);
        println!("{}\n", p.build_prompt(&snapshot));
    }
    Ok(())
}
