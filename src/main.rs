mod cli;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kratos_core::Config;

use crate::cli::Commands;

#[derive(Parser, Debug)]
#[command(name = "kratos")]
#[command(about = "Journey memory and feature pipeline state for multi-agent development")]
struct Cli {
    /// Journey database file (overrides KRATOS_MEMORY_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory holding <feature>/status.json (overrides KRATOS_PIPELINE_ROOT)
    #[arg(long, global = true)]
    pipeline_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn config(&self) -> anyhow::Result<Config> {
        Ok(Config::from_env_with(
            &cli::project_root()?,
            self.db.clone(),
            self.pipeline_root.clone(),
        )?)
    }
}

fn main() -> anyhow::Result<()> {
    // stdout carries JSON results only; diagnostics go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "kratos=info,kratos_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    tracing::debug!(
        database = %config.database_path.display(),
        pipeline_root = %config.pipeline_root.display(),
        "resolved configuration"
    );

    let output = cli::execute(cli.command, &config)?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
