//! usitty - drive USI shogi engines from the command line.
//!
//! - `usitty info <engine>` launches an engine and prints its identity and
//!   declared options.
//! - `usitty mate --engine <json> --position <usi>` runs one mate search.
//! - `usitty research --settings <json>` starts every configured engine and
//!   analyses each position read from stdin until EOF.
//!
//! Logs go to stderr, or to the file named by `--log-file` /
//! `USITTY_LOG_FILE` (see [`config`]). `RUST_LOG` controls the filter.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod process;

#[derive(Parser)]
#[command(name = "usitty", about = "USI engine client and multi-engine research")]
struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the name, author and options an engine declares.
    Info {
        /// Engine executable
        engine: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search for a forced mate.
    Mate {
        /// Engine configuration (JSON)
        #[arg(long)]
        engine: PathBuf,
        /// `startpos ...` or `sfen ...`, optionally followed by `moves ...`
        #[arg(long)]
        position: String,
        /// Give up after this many seconds
        #[arg(long)]
        max_seconds: Option<u32>,
    },
    /// Analyse positions from stdin with every configured engine.
    Research {
        /// Research settings (JSON)
        #[arg(long)]
        settings: PathBuf,
    },
}

/// Installs the tracing subscriber. The returned guard flushes the log file
/// and must live until exit.
fn init_logging(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("invalid log file path {}", path.display()))?;
    std::fs::create_dir_all(dir)?;
    let (non_blocking, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_file = cli.log_file.clone().or_else(config::get_log_file);
    let _guard = init_logging(log_file.as_deref())?;

    match cli.command {
        Commands::Info { engine, json } => commands::info(&engine, json).await,
        Commands::Mate {
            engine,
            position,
            max_seconds,
        } => commands::mate(&engine, &position, max_seconds).await,
        Commands::Research { settings } => commands::research(&settings).await,
    }
}
