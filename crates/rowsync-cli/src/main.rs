//! rowsync CLI - consistent row-level table synchronization.

use clap::{Parser, Subcommand};
use rowsync::{SyncConfig, SyncError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "rowsync")]
#[command(about = "Consistent row-level table synchronization between databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "sync.yaml")]
    config: PathBuf,

    /// Output the final report as JSON to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synchronization
    Run {
        /// Override target rows per chunk
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Override maximum rows per multi-row INSERT
        #[arg(long)]
        insert_size: Option<usize>,

        /// Override number of chunk browser workers
        #[arg(long)]
        browsers: Option<usize>,

        /// Override number of chunk reader workers
        #[arg(long)]
        readers: Option<usize>,

        /// Override number of writer workers
        #[arg(long)]
        writers: Option<usize>,

        /// Suppress INSERT statements (counted as no-ops)
        #[arg(long)]
        no_insert: bool,

        /// Suppress UPDATE statements
        #[arg(long)]
        no_update: bool,

        /// Suppress DELETE statements
        #[arg(long)]
        no_delete: bool,

        /// Promote the best secondary index when a table has no primary key
        #[arg(long)]
        allow_synthetic_pk: bool,

        /// Write the per-table counter report to this file as JSON
        #[arg(long)]
        stats_path: Option<PathBuf>,

        /// Render DML into this SQL script file instead of executing it
        #[arg(long)]
        sql_output: Option<PathBuf>,
    },

    /// Load and validate the configuration, then print the plan
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = SyncConfig::load(&cli.config)?;
    info!("loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            chunk_size,
            insert_size,
            browsers,
            readers,
            writers,
            no_insert,
            no_update,
            no_delete,
            allow_synthetic_pk,
            stats_path,
            sql_output,
        } => {
            // Command-line overrides win over the file.
            if let Some(v) = chunk_size {
                config.sync.chunk_size = v;
            }
            if let Some(v) = insert_size {
                config.sync.insert_size = v;
            }
            if let Some(v) = browsers {
                config.sync.browsers = v;
            }
            if let Some(v) = readers {
                config.sync.readers = v;
            }
            if let Some(v) = writers {
                config.sync.writers = v;
            }
            if no_insert {
                config.sync.no_insert = true;
            }
            if no_update {
                config.sync.no_update = true;
            }
            if no_delete {
                config.sync.no_delete = true;
            }
            if allow_synthetic_pk {
                config.sync.allow_synthetic_pk = true;
            }
            if stats_path.is_some() {
                config.sync.stats_path = stats_path;
            }
            if sql_output.is_some() {
                config.sync.sql_output = sql_output;
            }

            let report = rowsync::pipeline::run(config).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nSynchronization completed!");
                println!("  Source position: {}", report.position);
                for table in &report.tables {
                    println!(
                        "  {}: {} chunks, {} source rows, {} written, {} suppressed",
                        table.table,
                        table.chunks,
                        table.source_rows,
                        table.rows_written,
                        table.rows_suppressed
                    );
                }
            }
        }

        Commands::Validate => {
            config.validate()?;
            println!("Configuration is valid");
            println!("  Destination dialect: {}", config.dest.dialect.as_str());
            println!(
                "  Mode: {}",
                if config.script_mode() {
                    "SQL script output"
                } else {
                    "direct execution"
                }
            );
            for table in &config.tables {
                println!(
                    "  {} -> {}.{}",
                    table.full_name(),
                    table.effective_dest_schema(),
                    table.table
                );
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
