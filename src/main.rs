//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `earth_viewer` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - User-facing output formatting
//!
//! All core functionality is implemented in the library crate.

use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use earth_viewer::initialization::{init_crypto_provider, init_logger_with};
use earth_viewer::{run_refresh, Config, Opt};

#[tokio::main]
async fn main() -> Result<()> {
    // Pins and directories may come from a .env file next to the working directory.
    let _ = dotenvy::dotenv();

    let config = Config::from(Opt::parse());

    init_logger_with(config.log_level.clone().into(), config.log_format.clone())
        .context("Failed to initialize logger")?;
    init_crypto_provider();

    match run_refresh(config).await {
        Ok(report) => {
            for texture in &report.textures {
                println!(
                    "{:<12} {:<11} {}",
                    texture.kind.as_str(),
                    texture.outcome.as_str(),
                    texture
                        .path
                        .as_ref()
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
            println!(
                "{} refresh cycle{}: {} downloaded, {} cached, {} bundled, {} unavailable ({} failed attempt{}) in {:.1}s",
                report.cycles,
                if report.cycles == 1 { "" } else { "s" },
                report.downloaded,
                report.cached,
                report.bundled,
                report.unavailable,
                report.failed_attempts,
                if report.failed_attempts == 1 { "" } else { "s" },
                report.elapsed_seconds
            );

            match report.exit_code() {
                0 => Ok(()),
                code => process::exit(code),
            }
        }
        Err(e) => {
            eprintln!("earth_viewer error: {:#}", e);
            process::exit(1);
        }
    }
}
