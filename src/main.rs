//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `media_guard` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - User-facing output formatting
//!
//! All core functionality is implemented in the library crate.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::process;

use media_guard::dom::ImageState;
use media_guard::initialization::init_logger_with;
use media_guard::{run_scan, Config};

fn paint(state: ImageState) -> ColoredString {
    let label = state.as_ref();
    match state {
        ImageState::Blocked => label.red().bold(),
        ImageState::Warned => label.yellow(),
        ImageState::Allowed | ImageState::Revealed => label.green(),
        ImageState::Unprocessed | ImageState::Scanning => label.dimmed(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    // This allows setting MEDIA_GUARD_TOKEN in .env without exporting it manually
    // Try loading from current directory first, then from the executable's directory
    if dotenvy::dotenv().is_err() {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let env_path = exe_dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                }
            }
        }
    }

    let config = Config::parse();

    let log_level = config.log_level.clone();
    let log_format = config.log_format.clone();
    init_logger_with(log_level.into(), log_format).context("Failed to initialize logger")?;

    match run_scan(config).await {
        Ok(report) => {
            if report.page_blocked {
                println!("{} {} is on your blacklist", "⛔".red(), report.page_url);
                return Ok(());
            }
            for image in &report.images {
                println!(
                    "{:>10}  {}",
                    paint(image.state),
                    image.source.as_deref().unwrap_or("<no src>")
                );
            }
            let summary = report.summary;
            println!(
                "✅ Scanned {} image{} on {} ({} blocked, {} warned, {} allowed, {} failed, {} skipped) in {:.1}s",
                summary.scanned,
                if summary.scanned == 1 { "" } else { "s" },
                report.page_url,
                summary.blocked,
                summary.warned,
                summary.allowed,
                summary.failed,
                summary.skipped,
                report.elapsed_seconds
            );
            if let Some(counters) = report.counters {
                println!(
                    "Blocked so far: {} total, {} today, {} this week",
                    counters.total, counters.today, counters.weekly
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("media_guard error: {:#}", e);
            process::exit(1);
        }
    }
}
