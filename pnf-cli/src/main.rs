//! PnF Sentinel CLI: point-and-figure column-change monitor.
//!
//! Commands:
//! - `watch`: run a cycle now, then every period during market hours
//! - `once`: run a single cycle and print the per-instrument report
//! - `chart`: build one instrument's chart and print its columns
//! - `init-config`: write the default monitor file

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pnf_core::data::{CircuitBreaker, CsvProvider, KiteProvider, SyntheticProvider};
use pnf_core::domain::drop_void;
use pnf_core::{build_chart, BarSource, Instrument};
use pnf_runner::{
    CycleReport, FanoutNotifier, InstrumentOutcome, LogNotifier, MonitorConfig, Orchestrator,
    TelegramNotifier,
};

#[derive(Parser)]
#[command(
    name = "pnf-sentinel",
    about = "PnF Sentinel: point-and-figure column-change monitor"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// Broker historical-candle API.
    Kite,
    /// `<SYMBOL>.csv` files in --csv-dir.
    Csv,
    /// Deterministic random walk, no network.
    Synthetic,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Monitor config file. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where bars come from.
    #[arg(long, value_enum, default_value_t = SourceKind::Kite)]
    source: SourceKind,

    /// Directory of CSV histories (with --source csv).
    #[arg(long, default_value = "data")]
    csv_dir: PathBuf,

    /// Seed for --source synthetic.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one cycle immediately, then every period while the market is open.
    Watch {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Run a single cycle and print the report.
    Once {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Build one instrument's chart and print its column summary.
    Chart {
        /// Watchlist symbol (e.g., RELIANCE).
        #[arg(long)]
        symbol: String,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// Write the default monitor config file.
    InitConfig {
        /// Output path.
        #[arg(long, default_value = "pnf-sentinel.toml")]
        out: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { source } => run_watch(&source),
        Commands::Once { source } => run_once(&source),
        Commands::Chart { symbol, source } => run_chart(&symbol, &source),
        Commands::InitConfig { out, force } => run_init_config(&out, force),
    }
}

fn load_config(path: Option<&Path>) -> Result<MonitorConfig> {
    let mut config = match path {
        Some(path) => MonitorConfig::from_file(path)
            .with_context(|| format!("loading monitor config {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    config.apply_env_overrides();
    config.validate().context("invalid monitor config")?;
    Ok(config)
}

fn build_source(args: &SourceArgs, config: &MonitorConfig) -> Result<Arc<dyn BarSource>> {
    Ok(match args.source {
        SourceKind::Kite => {
            let breaker = Arc::new(CircuitBreaker::default_provider());
            let provider = KiteProvider::new(config.kite.settings(&config.runtime), breaker)
                .context("kite credentials (set KITE_API_KEY and KITE_ACCESS_TOKEN)")?;
            Arc::new(provider)
        }
        SourceKind::Csv => Arc::new(CsvProvider::new(&args.csv_dir)),
        SourceKind::Synthetic => Arc::new(SyntheticProvider::new(args.seed)),
    })
}

fn build_notifier(config: &MonitorConfig) -> Result<FanoutNotifier> {
    let telegram = TelegramNotifier::new(
        config.telegram.bot_token.clone(),
        config.telegram.chat_id.clone(),
        config.runtime.fetch_timeout(),
    )?;
    if !telegram.is_configured() {
        log::warn!("telegram bot token or chat id missing, alerts go to the log only");
    }
    Ok(FanoutNotifier::new().with(LogNotifier).with(telegram))
}

fn build_orchestrator(args: &SourceArgs) -> Result<(MonitorConfig, Orchestrator)> {
    let config = load_config(args.config.as_deref())?;
    let source = build_source(args, &config)?;
    let notifier = build_notifier(&config)?;
    let orchestrator = Orchestrator::new(&config, source, Arc::new(notifier))?;
    log::info!(
        "monitoring {} instruments on {} bars via {:?}",
        orchestrator.watchlist().len(),
        config.chart.interval.label(),
        args.source
    );
    Ok((config, orchestrator))
}

fn run_watch(args: &SourceArgs) -> Result<()> {
    let (config, orchestrator) = build_orchestrator(args)?;
    // Never set: the loop runs until the process is terminated.
    let cancel = AtomicBool::new(false);
    let cycles = orchestrator.watch(&config.schedule, &cancel)?;
    log::info!("stopped after {cycles} cycles");
    Ok(())
}

fn run_once(args: &SourceArgs) -> Result<()> {
    let (_, orchestrator) = build_orchestrator(args)?;
    let report = orchestrator.run_cycle();
    print_report(&report);
    if report.succeeded() == 0 && !report.instruments.is_empty() {
        bail!("no instrument produced a chart");
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!();
    println!("=== Cycle {} ===", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    for r in &report.instruments {
        let line = match &r.outcome {
            InstrumentOutcome::FirstObservation(sig) => {
                format!("first seen, {} columns, last {}", sig.column_count, sig.kind)
            }
            InstrumentOutcome::Unchanged(sig) => {
                format!("unchanged, {} columns, last {}", sig.column_count, sig.kind)
            }
            InstrumentOutcome::Changed { event, delivered } => format!(
                "NEW {} COLUMN, {} columns, box {:.2}{}",
                event.kind,
                event.column_count,
                event.box_size,
                if *delivered { "" } else { " (alert not delivered)" }
            ),
            InstrumentOutcome::SkippedInFlight => "skipped, still in flight".to_string(),
            InstrumentOutcome::Failed(e) => format!("failed: {e}"),
        };
        println!("  {:<12} {line}", r.symbol);
    }
    println!("---");
    println!("{report}");
}

fn run_chart(symbol: &str, args: &SourceArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let instrument = config
        .watchlist
        .get(symbol)
        .cloned()
        .unwrap_or_else(|| Instrument::new(symbol, 0, "NSE"));
    let source = build_source(args, &config)?;

    let bars = drop_void(
        source
            .fetch(&instrument, config.chart.interval)
            .with_context(|| format!("fetching bars for {symbol}"))?,
    );
    let chart_config = config.chart.chart_config();
    if bars.len() < chart_config.min_bars() {
        bail!(
            "{symbol}: {} bars, need at least {}",
            bars.len(),
            chart_config.min_bars()
        );
    }
    let chart = build_chart(&bars, &chart_config)?;

    println!();
    println!("=== {instrument} ({}) ===", config.chart.interval.label());
    println!("Bars:        {}", bars.len());
    println!("Box size:    {:.4} ({:?})", chart.box_size, chart.box_source);
    println!("Reversal:    {}", chart_config.reversal);
    println!("Last bar:    {}", chart.last_updated.format("%Y-%m-%d %H:%M UTC"));
    println!("Columns:     {}", chart.column_count());
    println!();
    println!("  {:>4}  {:<4} {:>6} {:>12} {:>12}", "#", "Type", "Boxes", "Low", "High");
    for (i, col) in chart.columns.iter().enumerate() {
        println!(
            "  {:>4}  {:<4} {:>6} {:>12.2} {:>12.2}",
            i + 1,
            col.kind().to_string(),
            col.len(),
            col.low(),
            col.high()
        );
    }
    Ok(())
}

fn run_init_config(out: &Path, force: bool) -> Result<()> {
    if out.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", out.display());
    }
    let text = MonitorConfig::default().to_toml()?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(out, text).with_context(|| format!("writing {}", out.display()))?;
    println!("Wrote default config to {}", out.display());
    Ok(())
}
