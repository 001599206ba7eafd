//! tollscope - toll transaction analysis driver
//!
//! Reads a JSON record table and runs one analysis over it:
//! - `trips`: resolve vehicle closures and segment them into trips
//! - `mismatch`: flag probable missed AVI reads against a confidence dictionary
//! - `evaluate`: randomized training/test estimate of the AVI miss rate
//! - `init-config`: write a default configuration file

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollscope_common::config::{default_config_path, write_toml_config, ConfigFileResolver, LoggingConfig, TomlConfig};
use tollscope_common::RecordTable;
use tollscope_engine::services::{
    summarize_trips, AviEvaluator, ConfidenceDictionary, DictionaryMode, MismatchDetector, TripBuilder,
    TripSequence,
};
use tollscope_engine::EngineSettings;

/// Command-line arguments for tollscope
#[derive(Parser, Debug)]
#[command(name = "tollscope")]
#[command(about = "Trip reconstruction and AVI read-failure analysis for toll transactions")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assign every transaction to a trip
    Trips {
        /// JSON array of transaction records
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit one summary per trip instead of segmented records
        #[arg(long)]
        summary: bool,

        /// Continue trip numbering after this id
        #[arg(long, default_value_t = 0)]
        resume_after: u64,
    },

    /// Flag probable missed AVI reads
    Mismatch {
        /// JSON array of transaction records
        #[arg(short, long)]
        input: PathBuf,

        /// Existing plate → tag dictionary to start from
        #[arg(short, long)]
        dictionary: Option<PathBuf>,

        /// Treat the loaded dictionary as fixed (no new plates)
        #[arg(long = "static", requires = "dictionary")]
        static_dictionary: bool,

        /// Write the updated dictionary here
        #[arg(long, value_name = "FILE")]
        save_dictionary: Option<PathBuf>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit only flagged records
        #[arg(long)]
        flagged_only: bool,
    },

    /// Estimate AVI accuracy over random windows
    Evaluate {
        /// JSON array of transaction records
        #[arg(short, long)]
        input: PathBuf,

        /// RNG seed (overrides the configured seed)
        #[arg(long)]
        seed: Option<u64>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a configuration file with default values
    InitConfig {
        /// Destination (platform config directory when omitted)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigFileResolver::new(args.config.as_deref())
        .load()
        .context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!("Starting tollscope v{}", env!("CARGO_PKG_VERSION"));

    let settings = || EngineSettings::from_config(&config).context("Invalid configuration");

    match args.command {
        Command::Trips {
            input,
            output,
            summary,
            resume_after,
        } => {
            let settings = settings()?;
            let table = load_table(&input)?;
            let mut sequence = TripSequence::starting_after(resume_after);
            let built = TripBuilder::new(&table, &settings.trips).build(&mut sequence);

            if summary {
                write_json(output.as_deref(), &summarize_trips(&built.rows))
            } else {
                write_json(output.as_deref(), &built.rows)
            }
        }

        Command::Mismatch {
            input,
            dictionary,
            static_dictionary,
            save_dictionary,
            output,
            flagged_only,
        } => {
            let settings = settings()?;
            let table = load_table(&input)?;
            let mode = if static_dictionary {
                DictionaryMode::Static
            } else {
                DictionaryMode::Dynamic
            };
            let mut dict = match dictionary {
                Some(path) => ConfidenceDictionary::load_json(&path, mode)
                    .with_context(|| format!("Failed to load dictionary {}", path.display()))?,
                None => ConfidenceDictionary::dynamic(),
            };

            let report = MismatchDetector::from_settings(&settings.avi).detect(&table, &mut dict);

            if let Some(path) = save_dictionary {
                dict.save_json(&path)
                    .with_context(|| format!("Failed to save dictionary {}", path.display()))?;
            }

            let mut annotated = report.annotate(&table);
            if flagged_only {
                annotated.retain(|r| r.mismatch);
            }
            write_json(output.as_deref(), &annotated)
        }

        Command::Evaluate { input, seed, output } => {
            let mut avi = settings()?.avi;
            let table = load_table(&input)?;
            if seed.is_some() {
                avi.seed = seed;
            }
            let summaries = AviEvaluator::new(&table, avi)
                .context("Cannot evaluate this record table")?
                .run();
            write_json(output.as_deref(), &summaries)
        }

        Command::InitConfig { path, force } => init_config(path.as_deref(), force),
    }
}

/// Install the fmt subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match &logging.file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path().context("No platform configuration directory")?,
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to replace it)", path.display());
    }
    write_toml_config(&TomlConfig::default(), &path)?;
    info!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn load_table(path: &Path) -> Result<RecordTable> {
    let table = RecordTable::load_json(path)
        .with_context(|| format!("Failed to read records from {}", path.display()))?;
    info!("Loaded {} records from {}", table.len(), path.display());
    Ok(table)
}

fn write_json<T: Serialize + ?Sized>(path: Option<&Path>, value: &T) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            serde_json::to_writer_pretty(file, value)?;
            info!("Wrote {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, value)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}
