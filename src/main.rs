//! Guild Attendance CLI
//!
//! Computes trailing-window attendance from screenshots, roster exports or
//! the killboard, and maintains the cache and daily summaries.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use guild_attendance::cache::{CacheScope, CacheType};
use guild_attendance::logging::{FacadeSink, FanoutSink, FileSink, LogLevel, SharedSink};
use guild_attendance::{paths, AttendanceConfig, AttendancePipeline, EvidenceSource};

#[derive(Parser)]
#[command(name = "guild-attendance")]
#[command(about = "Guild attendance from screenshots, roster exports and the killboard", long_about = None)]
struct Cli {
    /// Config file (defaults to config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute interval attendance and print it as JSON
    Run {
        #[arg(long, value_enum)]
        source: EvidenceSource,

        /// Ignore cached results and stored daily summaries
        #[arg(long)]
        force: bool,
    },

    /// Delete cache entries
    ClearCache {
        /// Only this cache type (memberlist, killboard, textfile, screenshot)
        #[arg(long = "type", value_parser = parse_cache_type)]
        cache_type: Option<CacheType>,
    },

    /// Delete every daily summary and meta file
    ClearSummaries,
}

fn parse_cache_type(s: &str) -> std::result::Result<CacheType, String> {
    CacheType::ALL
        .into_iter()
        .find(|t| t.prefix() == s)
        .ok_or_else(|| format!("unknown cache type '{}'", s))
}

fn main() -> Result<()> {
    // Reads RUST_LOG, defaults to info
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let log_path = paths::default_log_path();
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let sink: SharedSink = Arc::new(FanoutSink::new(vec![
        Arc::new(FacadeSink) as SharedSink,
        Arc::new(FileSink::new(log_path, LogLevel::Info)) as SharedSink,
    ]));

    let config_path = cli.config.unwrap_or_else(paths::default_config_path);
    let base = config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| paths::get_exe_dir().clone());
    let config = paths::anchor_config(AttendanceConfig::load(&config_path, sink.as_ref()), &base);
    paths::ensure_directories(&config).context("Failed to create working directories")?;

    let pipeline = AttendancePipeline::new(config, sink.clone());

    match cli.command {
        Commands::Run { source, force } => {
            let buckets = pipeline.interval_attendance(source, force);
            let json = serde_json::to_string_pretty(&buckets).context("Failed to serialize attendance")?;
            println!("{}", json);
        }
        Commands::ClearCache { cache_type } => {
            let scope = cache_type.map(CacheScope::Only).unwrap_or(CacheScope::All);
            let removed = pipeline.cache().clear(scope);
            sink.info(&format!("Removed {} cache file(s).", removed));
        }
        Commands::ClearSummaries => {
            let removed = pipeline.summary_store(false).clear_summaries();
            sink.info(&format!("Removed {} daily summary file(s).", removed));
        }
    }

    Ok(())
}
