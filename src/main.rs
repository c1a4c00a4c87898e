//! ReachScope - reach, cost and incrementality reports for Meta ads
//!
//! A CLI tool that walks a date range period by period, pulls insights
//! from the Graph API and reports how much new audience each period added
//! and at what cost.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (configuration, upstream API, report writing, etc.)
//!   2 - Run cancelled (Ctrl-C or --timeout)

mod analysis;
mod cli;
mod config;
mod error;
mod insights;
mod models;
mod pacing;
mod report;

use analysis::engine::period_queries;
use analysis::{plan_windows, AnalysisEngine, EngineOptions};
use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use error::AnalysisError;
use insights::GraphApiClient;
use models::{AnalysisConfig, AnalysisReport};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is read before logging so `[general] verbose` can raise the level
    let (config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&args, &config);

    info!("ReachScope v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {}", config_source);

    match run_analysis(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .reachscope.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the API version, pacing and report format.");
    println!("   The access token stays in --access-token or META_ACCESS_TOKEN.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete analysis workflow. Returns exit code (0 or 2).
async fn run_analysis(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let since = args.since.context("--since is required")?;
    let until = args.until.context("--until is required")?;
    let analysis = AnalysisConfig::new(
        args.entity_id(),
        args.level,
        since,
        until,
        args.interval,
        !args.no_demographics,
    )?
    .with_name(args.name.clone());

    // Handle --dry-run: plan and exit
    if args.dry_run {
        return Ok(handle_dry_run(&analysis));
    }

    let access_token = args
        .access_token
        .clone()
        .context("Missing access token: pass --access-token or set META_ACCESS_TOKEN")?;

    println!("📡 Connecting to Graph API...");
    println!("   Endpoint: {}/{}", config.api.base_url, config.api.api_version);
    println!("   Timeout: {}s, retries: {}", config.api.timeout_seconds, config.api.retries);

    let client = GraphApiClient::new(config.graph_api_config(access_token))
        .context("Failed to create Graph API client")?;
    let engine = AnalysisEngine::new(
        client,
        config.pacing_policy(),
        EngineOptions {
            concurrent_fetches: config.pacing.concurrent_fetches,
            show_progress: !args.quiet,
        },
    );

    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, args.timeout);

    println!(
        "\n🔬 Analyzing {} {} from {} to {} ({})...",
        analysis.level,
        analysis.entity_id,
        analysis.date_start,
        analysis.date_end,
        analysis.interval
    );

    let rows = match engine.run(&analysis, &cancel).await {
        Ok(rows) => rows,
        Err(AnalysisError::Cancelled { completed_periods }) => {
            eprintln!(
                "\n⛔ Run cancelled after {} period(s). No report was written (exit code 2).",
                completed_periods
            );
            return Ok(2);
        }
        Err(e) => return Err(e.into()),
    };

    // Build and save the report
    println!("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let report = AnalysisReport::new(analysis, rows, duration);

    let output = match config.report.format {
        OutputFormat::Csv => report::generate_csv_report(&report),
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report, config.report.decimals),
    };

    let output_path = PathBuf::from(&config.general.output);
    report::write_report(&output, &output_path)?;

    // Print summary
    let summary = &report.summary;
    println!("\n📊 Analysis Summary:");
    println!("   Periods: {} | Rows: {}", summary.periods, report.metadata.row_count);
    println!("   Spend: {:.2}", summary.total_spend);
    println!("   Impressions: {}", summary.total_impressions);
    println!("   Cumulative reach: {}", summary.final_cumulative_reach);
    match summary.overall_cpmi {
        Some(cpmi) => println!("   Overall CPMi: {:.2}", cpmi),
        None => println!("   Overall CPMi: n/a"),
    }
    if summary.negative_incremental_periods > 0 {
        println!(
            "   ⚠️  Cumulative reach dropped in {} period(s)",
            summary.negative_incremental_periods
        );
    }
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        output_path.display()
    );

    Ok(0)
}

/// Cancel the run on Ctrl-C, and after `timeout_secs` if given.
fn spawn_cancel_triggers(cancel: &CancellationToken, timeout_secs: Option<u64>) {
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    if let Some(secs) = timeout_secs {
        let on_timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("Timeout of {}s reached, cancelling run", secs);
            on_timeout.cancel();
        });
    }
}

/// Handle --dry-run: print the planned periods and windows, exit.
fn handle_dry_run(analysis: &AnalysisConfig) -> i32 {
    println!("\n🔍 Dry run: planning periods (no API calls)...\n");

    let plans = plan_windows(analysis);

    if plans.is_empty() {
        println!("   No periods fall inside the requested range.");
    } else {
        let fetches: usize = plans.iter().map(|plan| plan.fetch_count()).sum();
        println!(
            "   {} period(s), {} window fetch(es) for {} ({}):\n",
            plans.len(),
            fetches,
            analysis.entity_id,
            analysis.interval
        );
        for plan in &plans {
            println!("     📅 {} ({} day(s))", plan.period, plan.period.days());
            for query in period_queries(analysis, plan) {
                println!(
                    "        {} [{}{}]",
                    query.window,
                    query.fields.as_param(),
                    if query.breakdown { "; age,gender" } else { "" }
                );
            }
        }
    }

    println!("\n✅ Dry run complete. No API calls were made.");
    0
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is installed, so the chosen source is returned for
/// the caller to log.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Explicit config path must load
    let (mut config, source) = if let Some(ref config_path) = args.config {
        (
            Config::load(config_path)?,
            format!("loaded from {}", config_path.display()),
        )
    } else {
        // Try default location
        match Config::load_default() {
            Ok(Some(config)) => (config, format!("loaded from {}", DEFAULT_CONFIG_FILE)),
            Ok(None) => (Config::default(), "no config file found, using defaults".to_string()),
            Err(e) => {
                eprintln!("⚠️  Ignoring {}: {:#}", DEFAULT_CONFIG_FILE, e);
                (Config::default(), "using defaults".to_string())
            }
        }
    };

    config.merge_with_args(args);
    Ok((config, source))
}
