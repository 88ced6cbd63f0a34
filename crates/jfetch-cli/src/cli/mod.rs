//! CLI for the jfetch JSON resource fetcher.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use jfetch_core::config;
use std::path::PathBuf;

use commands::{run_fetch, run_plan};

/// Top-level CLI for jfetch.
#[derive(Debug, Parser)]
#[command(name = "jfetch")]
#[command(about = "jfetch: bounded-concurrency JSON resource fetcher", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch every target in the list, with retries and live progress.
    Run {
        /// Target list file: one URL per line, `#` starts a comment.
        targets: PathBuf,

        /// Directory receiving artifacts and the error log (default: current directory).
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Override the configured number of concurrent fetch attempts.
        #[arg(long, value_name = "N")]
        max_concurrent: Option<usize>,

        /// Override the configured attempt limit per job.
        #[arg(long, value_name = "N")]
        max_attempts: Option<u32>,
    },

    /// Resolve the target list into jobs and print them without fetching.
    Plan {
        /// Target list file: one URL per line, `#` starts a comment.
        targets: PathBuf,

        /// Directory the artifacts would land in (default: current directory).
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
}

impl CliCommand {
    /// Parses the command line and dispatches. Returns the process exit code.
    pub async fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run {
                targets,
                output_dir,
                max_concurrent,
                max_attempts,
            } => {
                if let Some(n) = max_concurrent {
                    cfg.max_concurrent = n;
                }
                if let Some(n) = max_attempts {
                    cfg.max_attempts = n;
                }
                let output_dir = match output_dir {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                run_fetch(&cfg, &targets, &output_dir).await
            }
            CliCommand::Plan {
                targets,
                output_dir,
            } => {
                let output_dir = match output_dir {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                run_plan(&cfg, &targets, &output_dir)?;
                Ok(0)
            }
        }
    }
}
