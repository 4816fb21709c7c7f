//! rlm CLI - Sandboxed snippet execution over large files.

mod colors;
mod exec;
mod repl;
mod report;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use rlm_core::{EngineConfig, ReloadPolicy};

#[derive(Parser)]
#[command(name = "rlm")]
#[command(about = "Explore large files with budgeted, sandboxed Python snippets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    limits: LimitArgs,
}

/// Overrides layered over the `RLM_*` environment.
#[derive(Args)]
struct LimitArgs {
    /// Executions allowed per session
    #[arg(long, global = true)]
    max_executions: Option<u32>,

    /// Resets allowed per session
    #[arg(long, global = true)]
    max_resets: Option<u32>,

    /// Wall-clock limit per execution, in seconds
    #[arg(long, global = true, value_parser = parse_timeout)]
    timeout: Option<Duration>,

    /// Maximum characters of output returned per execution
    #[arg(long, global = true)]
    max_output: Option<usize>,

    /// Python interpreter used for workers
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    /// Whether loading into an existing session costs a reset
    /// (unmetered, counts-as-reset)
    #[arg(long, global = true)]
    reload_policy: Option<ReloadPolicy>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load files and run snippets against them
    Exec {
        /// File(s) to load as `context`
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Session identifier
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Snippets to run, in order
        #[arg(required = true)]
        code: Vec<String>,
    },

    /// Interactive session reading snippets from stdin
    Repl {
        /// File(s) to load as `context`
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Session identifier
        #[arg(short, long, default_value = "default")]
        session: String,
    },
}

fn parse_timeout(value: &str) -> rlm_core::Result<Duration> {
    rlm_core::config::parse_seconds("--timeout", value)
}

impl LimitArgs {
    fn apply(self, mut config: EngineConfig) -> EngineConfig {
        if let Some(max) = self.max_executions {
            config = config.with_max_executions(max);
        }
        if let Some(max) = self.max_resets {
            config = config.with_max_resets(max);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        if let Some(max) = self.max_output {
            config = config.with_max_output_chars(max);
        }
        if let Some(python) = self.python {
            config = config.with_interpreter(python);
        }
        if let Some(policy) = self.reload_policy {
            config = config.with_reload_policy(policy);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = cli.limits.apply(EngineConfig::from_env()?);

    match cli.command {
        Commands::Exec {
            files,
            session,
            code,
        } => exec::execute(config, &files, &session, &code).await?,

        Commands::Repl { files, session } => repl::execute(config, &files, &session).await?,
    }

    Ok(())
}
