//! # Diagram Stream CLI (`dgs`)
//!
//! Generates architecture diagrams for GitHub repositories through the
//! generation backend and keeps the last result per repository in a local
//! SQLite cache.
//!
//! ## Usage
//!
//! ```bash
//! dgs --config ./config/dgs.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dgs init` | Create the SQLite cache and run schema migrations |
//! | `dgs generate <owner> <repo>` | Serve from cache or generate |
//! | `dgs regenerate <owner> <repo>` | Generate again, bypassing the cache |
//! | `dgs modify <owner> <repo>` | Generate with new instructions, no cost estimate |
//! | `dgs show <owner> <repo>` | Print the cached artifact |
//! | `dgs cost <owner> <repo>` | Print the backend's cost estimate |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use diagram_stream::config;
use diagram_stream::generate::{self, Action};
use diagram_stream::migrate;
use diagram_stream::progress::ProgressMode;
use diagram_stream::show;

/// Diagram Stream CLI: repository architecture diagrams from a streaming
/// generation backend.
#[derive(Parser)]
#[command(
    name = "dgs",
    about = "Diagram Stream: stream, track and cache repository architecture diagrams",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dgs.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal and
    /// `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the cache database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Show the cached diagram, or generate one if there is none.
    Generate {
        owner: String,
        repo: String,

        /// Extra instructions passed to the backend.
        #[arg(long)]
        instructions: Option<String>,

        /// Print the final session snapshot as JSON instead of the diagram.
        #[arg(long)]
        json: bool,
    },

    /// Generate again, ignoring the cache. Re-estimates cost.
    Regenerate {
        owner: String,
        repo: String,

        #[arg(long, default_value = "")]
        instructions: String,

        #[arg(long)]
        json: bool,
    },

    /// Generate with new instructions, ignoring the cache and skipping the
    /// cost estimate.
    Modify {
        owner: String,
        repo: String,

        #[arg(long)]
        instructions: String,

        #[arg(long)]
        json: bool,
    },

    /// Print the cached artifact and when it was last generated.
    Show {
        owner: String,
        repo: String,

        /// Print only the Mermaid diagram.
        #[arg(long)]
        diagram_only: bool,
    },

    /// Ask the backend for a cost estimate.
    Cost { owner: String, repo: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let reporter = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Cache initialized successfully.");
        }
        Commands::Generate {
            owner,
            repo,
            instructions,
            json,
        } => {
            generate::run_generate(&cfg, &owner, &repo, Action::Start(instructions), reporter, json)
                .await?;
        }
        Commands::Regenerate {
            owner,
            repo,
            instructions,
            json,
        } => {
            generate::run_generate(
                &cfg,
                &owner,
                &repo,
                Action::Regenerate(instructions),
                reporter,
                json,
            )
            .await?;
        }
        Commands::Modify {
            owner,
            repo,
            instructions,
            json,
        } => {
            generate::run_generate(&cfg, &owner, &repo, Action::Modify(instructions), reporter, json)
                .await?;
        }
        Commands::Show {
            owner,
            repo,
            diagram_only,
        } => {
            show::run_show(&cfg, &owner, &repo, diagram_only).await?;
        }
        Commands::Cost { owner, repo } => {
            generate::run_cost(&cfg, &owner, &repo).await?;
        }
    }

    Ok(())
}
