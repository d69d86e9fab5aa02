use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use ohlcv_scraper::config::AppConfig;
use ohlcv_scraper::export;
use ohlcv_scraper::models::FetchPolicy;
use ohlcv_scraper::pipeline::{Pipeline, PipelineRun};
use ohlcv_scraper::scraper::browser::ChromeLauncher;

const MAX_DAYS: usize = 365;

#[derive(Parser)]
#[command(name = "ohlcv-scraper", about = "Daily OHLCV scraper for a single instrument", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Backend order for the current-day quote (default: from config)
    #[arg(short, long, value_enum)]
    policy: Option<FetchPolicy>,

    /// Historical rows to keep, 1-365 (default: from config)
    #[arg(short, long)]
    days: Option<usize>,

    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Write the rendered output here instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Also write complete/current/historical CSV files into this directory
    #[arg(long)]
    split_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once and print or export the series
    Scrape(RunArgs),

    /// Re-run the pipeline on a fixed interval until interrupted
    Watch {
        #[command(flatten)]
        run: RunArgs,

        /// Seconds between runs (default: from config)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Try each browser start-up strategy and report which one works
    CheckBrowser,

    /// Print the configured locator chains in priority order
    Selectors,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "ohlcv_scraper=info,warn",
        1 => "ohlcv_scraper=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Scrape(args) => {
            let pipeline = Pipeline::from_config(&config)?;
            let (policy, days) = resolve_run(&args, &config)?;
            let run = pipeline.run_detailed(policy, days).await?;
            emit(&run, &args)?;
        }

        Command::Watch { run: args, interval } => {
            let pipeline = Pipeline::from_config(&config)?;
            let (policy, days) = resolve_run(&args, &config)?;
            let secs = interval.unwrap_or(config.pipeline.refresh_interval_secs).max(1);
            info!("Refreshing every {}s (Ctrl-C to stop)", secs);

            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            let mut last: Option<PipelineRun> = None;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tokio::signal::ctrl_c() => break,
                }
                match pipeline.run_detailed(policy, days).await {
                    Ok(run) => {
                        emit(&run, &args)?;
                        last = Some(run);
                    }
                    Err(e) => error!("Refresh failed: {}", e),
                }
            }
            if let Some(run) = last {
                info!("Last snapshot: {} records", run.series.len());
            }
        }

        Command::CheckBrowser => {
            let launcher = ChromeLauncher::new(&config.browser, &config.scraper.user_agent);
            let found = tokio::task::spawn_blocking(move || launcher.probe())
                .await
                .context("Browser probe panicked")?;
            match found {
                Some(strategy) => println!("Browser available via {}", strategy),
                None => {
                    println!("No browser strategy succeeded; only the lightweight backend will work.");
                    std::process::exit(1);
                }
            }
        }

        Command::Selectors => {
            let sel = &config.selectors;
            for (title, set) in [("Static page", &sel.static_page), ("Rendered page", &sel.rendered_page)] {
                println!("{}:", title);
                for locator in set.iter() {
                    println!("  {}", locator.field);
                    for (i, candidate) in locator.candidates.iter().enumerate() {
                        println!("    {:>2}. {}", i + 1, candidate);
                    }
                }
            }
            println!("Historical table:");
            for (i, candidate) in sel.historical_table.iter().enumerate() {
                println!("    {:>2}. {}", i + 1, candidate);
            }
            println!(
                "  keyword scan: {} of {:?}",
                sel.keyword_quorum, sel.table_keywords
            );
        }
    }

    Ok(())
}

fn resolve_run(args: &RunArgs, config: &AppConfig) -> Result<(FetchPolicy, usize)> {
    let policy = args.policy.unwrap_or(config.pipeline.policy);
    let days = args.days.unwrap_or(config.pipeline.historical_days);
    if !(1..=MAX_DAYS).contains(&days) {
        anyhow::bail!("--days must be between 1 and {}, got {}", MAX_DAYS, days);
    }
    if !(10..=180).contains(&days) {
        warn!("{} historical days is outside the usual 10-180 range", days);
    }
    Ok((policy, days))
}

fn emit(run: &PipelineRun, args: &RunArgs) -> Result<()> {
    let rendered = match args.format {
        OutputFormat::Table => export::table_string(run),
        OutputFormat::Csv => export::csv_string(run.series.records())?,
        OutputFormat::Json => export::json_string(run)?,
    };

    match &args.out {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("Cannot write {:?}", path))?;
            info!("Wrote {} records to {:?}", run.series.len(), path);
        }
        None => print!("{}", rendered),
    }

    if let Some(dir) = &args.split_dir {
        let files = export::write_split(&run.series, dir, Local::now().naive_local())?;
        info!("Complete: {:?}", files.complete);
        if let Some(current) = &files.current {
            info!("Current: {:?}", current);
        }
        info!("Historical: {:?}", files.historical);
    }
    Ok(())
}
