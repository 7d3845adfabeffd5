//! solve-hook: command-line driver for solvesync.
//!
//! ## Subcommands
//!
//! - `replay`: Feed a JSON-lines file of page events through the engine
//! - `show`: Print the stored record for a problem
//! - `elapsed`: Print the stored active time for a problem
//! - `reset`: Reset the stored timer for a problem

mod error;
mod inspect;
mod logging;
mod outbox;
mod replay;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use error::HookError;
use replay::ProblemArgs;

#[derive(Parser)]
#[command(name = "solve-hook")]
#[command(about = "Practice session tracker for coding-challenge pages")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.solvesync/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay page events (one JSON object per line)
    Replay {
        /// File of page events
        #[arg(value_name = "EVENTS")]
        events: PathBuf,

        /// Problem page the events belong to
        #[arg(long)]
        url: String,

        /// Problem title
        #[arg(long)]
        title: Option<String>,

        /// Difficulty label (Easy, Medium, Hard)
        #[arg(long)]
        difficulty: Option<String>,

        /// Topic tag, repeatable
        #[arg(long = "topic")]
        topics: Vec<String>,

        /// Where outbound pushes are appended (defaults to ~/.solvesync/outbox.jsonl)
        #[arg(long, value_name = "PATH")]
        outbox: Option<PathBuf>,
    },

    /// Print the stored record for a problem
    Show {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Print the stored active time for a problem
    Elapsed {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Reset the stored timer for a problem
    Reset {
        #[arg(value_name = "URL")]
        url: String,
    },
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            tracing::error!(error = %e, "solve-hook failed");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<String, HookError> {
    let config = solve_core::load_config(cli.config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(HookError::Runtime)?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Replay {
                events,
                url,
                title,
                difficulty,
                topics,
                outbox,
            } => {
                let outbox = match outbox {
                    Some(path) => path,
                    None => default_outbox_path()?,
                };
                let problem = ProblemArgs {
                    url,
                    title,
                    difficulty,
                    topics,
                };
                let summary = replay::run(config, &events, problem, outbox).await?;
                serde_json::to_string_pretty(&summary).map_err(|source| {
                    HookError::Core(solve_core::SolveError::Json {
                        context: "encoding replay summary".to_string(),
                        source,
                    })
                })
            }
            Commands::Show { url } => inspect::show(&config, &url).await,
            Commands::Elapsed { url } => inspect::elapsed(&config, &url).await,
            Commands::Reset { url } => inspect::reset(&config, &url).await,
        }
    })
}

fn default_outbox_path() -> Result<PathBuf, HookError> {
    solve_core::get_solvesync_dir()
        .map(|dir| dir.join("outbox.jsonl"))
        .ok_or_else(|| {
            HookError::Core(solve_core::SolveError::ConfigurationMissing(
                "home directory for outbox".to_string(),
            ))
        })
}
