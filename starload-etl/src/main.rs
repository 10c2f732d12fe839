//! starload - star schema loader
//!
//! Command-line front end: resolves configuration, opens the store and runs
//! one command against it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use starload_common::config::{load_toml_config, locate_config_file};
use starload_common::db::connect;
use starload_common::ConnectionConfig;
use starload_etl::pipeline::{run_batch, IngestOptions};
use starload_etl::query::{fetch_denormalized, write_csv};
use starload_etl::schema::reset_schema;
use starload_etl::staging::stage_csv;
use starload_etl::RecordBatch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for starload
#[derive(Parser, Debug)]
#[command(name = "starload")]
#[command(about = "Load entity batches into a star schema")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Database URL (sqlite:...)
    #[arg(long, value_name = "URL", global = true)]
    database_url: Option<String>,

    /// Log filter, e.g. "debug" or "starload_etl=trace"
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drop and recreate the star schema
    Schema,

    /// Load a CSV batch into the star schema
    Ingest {
        /// Batch file
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Require the existing schema instead of recreating it
        #[arg(long)]
        keep_schema: bool,

        /// Names per dimension insert statement
        #[arg(long, value_name = "N")]
        chunk_size: Option<usize>,

        /// Print the batch summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy a CSV file verbatim into a flat table
    Stage {
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        #[arg(long, value_name = "NAME")]
        table: String,
    },

    /// Write the denormalized entity view to CSV
    Export {
        #[arg(long, value_name = "FILE")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before logging starts so its level can apply
    let config_path = locate_config_file(args.config.as_deref());
    let toml_config = load_toml_config(config_path.as_deref())
        .with_context(|| format!("Failed to load config {:?}", config_path))?;

    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level)),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starload {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) if path.exists() => info!("Config: {}", path.display()),
        Some(path) => warn!("Config file {} not found, using defaults", path.display()),
        None => info!("No config file, using defaults"),
    }

    let connection = ConnectionConfig::resolve(args.database_url.as_deref(), &toml_config);
    info!("Database: {}", connection.url);
    let pool = connect(&connection)
        .await
        .context("Failed to connect to database")?;

    match args.command {
        Command::Schema => {
            reset_schema(&pool).await?;
        }
        Command::Ingest {
            input,
            keep_schema,
            chunk_size,
            json,
        } => {
            let mut options = IngestOptions::from(&toml_config.ingest);
            if keep_schema {
                options.reset_schema = false;
            }
            if let Some(chunk_size) = chunk_size {
                options.chunk_size = chunk_size;
            }

            let batch = RecordBatch::from_path(&input)
                .with_context(|| format!("Failed to read batch {}", input.display()))?;
            let summary = run_batch(&pool, &batch, &options).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary);
            }
        }
        Command::Stage { input, table } => {
            let rows = stage_csv(&pool, &input, &table).await?;
            println!("{} rows staged into {}", rows, table);
        }
        Command::Export { output } => {
            let rows = fetch_denormalized(&pool).await?;
            let file = std::fs::File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let written = write_csv(&rows, file)?;
            info!("Exported {} entities to {}", written, output.display());
        }
    }

    pool.close().await;
    Ok(())
}
