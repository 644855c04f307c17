//! CLI entry point: runs the factor engine across a settlement-date range.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use surge_factors::prelude::*;

#[derive(Parser)]
#[command(name = "surge-factors", version, about = "Tick-to-factor surge pipeline")]
struct Cli {
    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured factors across a settlement-date range.
    Run {
        /// First settlement date, YYYY-MM-DD.
        #[arg(long)]
        start: String,
        /// Last settlement date, YYYY-MM-DD (inclusive).
        #[arg(long)]
        end: String,
        /// Root of the partitioned tick store.
        #[arg(long)]
        data_path: PathBuf,
        /// Root factor matrices are written under.
        #[arg(long)]
        output: PathBuf,
        /// Factor configuration file (TOML).
        #[arg(long)]
        config: PathBuf,
        /// Worker pool size for the settlement-day fan-out.
        #[arg(long, default_value_t = 4)]
        cores: usize,
    },
}

#[derive(Deserialize)]
struct EngineConfig {
    factors: Vec<FactorConfigFile>,
}

#[derive(Deserialize)]
struct FactorConfigFile {
    #[serde(flatten)]
    config: FactorConfig,
    source: String,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn parse_date(s: &str) -> Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| SurgeError::ConfigError(format!("invalid date {s}: {e}")))
}

fn run(args: Cli) -> Result<()> {
    let Commands::Run { start, end, data_path, output, config, cores } = args.command;

    let start = parse_date(&start)?;
    let end = parse_date(&end)?;
    if start > end {
        return Err(SurgeError::ConfigError(format!("start {start} is after end {end}")));
    }

    let raw = std::fs::read_to_string(&config)?;
    let engine_config: EngineConfig = toml::from_str(&raw)?;

    let mut specs = Vec::with_capacity(engine_config.factors.len());
    for f in engine_config.factors {
        f.config.validate()?;
        let source = match f.source.as_str() {
            "trades" => surge_factors::engine::factor_engine::BarSource::Trades,
            "snaps" => surge_factors::engine::factor_engine::BarSource::Snaps,
            other => {
                return Err(SurgeError::ConfigError(format!("unknown bar source: {other}")))
            }
        };
        specs.push(FactorSpec {
            config: f.config,
            source,
        });
    }

    let store: Arc<dyn TickStore> = Arc::new(ParquetTickStore::new(data_path));
    let calendar: Arc<dyn TradingCalendar> = Arc::new(FixedCalendar::new(start.year() - 1, end.year() + 1));
    let dates = calendar.biz_days_in_range(start, end);

    log::info!("running {} factors across {} settlement days", specs.len(), dates.len());
    let results = run_all(&specs, store, calendar, &dates, cores)?;

    let matrices = build_matrices(&results, |name| {
        if name.contains("_m10_") {
            24
        } else {
            1
        }
    })?;

    let factor_store = surge_factors::engine::emitter::ParquetFactorStore::new(output);
    for matrix in &matrices {
        let namespace = surge_factors::engine::emitter::classify_namespace(&matrix.factor_name);
        factor_store.save(namespace, matrix)?;
    }
    log::info!("wrote {} factor matrices", matrices.len());
    Ok(())
}

use chrono::Datelike;

fn main() -> ExitCode {
    let args = Cli::parse();
    init_logging(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ SurgeError::ConfigError(_)) => {
            log::error!("{e}");
            ExitCode::from(2)
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(1)
        }
    }
}
