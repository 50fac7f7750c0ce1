mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use siteproof_core::Config;

const DEFAULT_LOG_FILTER: &str = "siteproof=info,siteproof_core=info";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    dispatch(cli.command, config).await
}

async fn dispatch(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Init => cli::init::run(config).await,
        Commands::Status => cli::status::run(config).await,
        Commands::Add {
            path,
            owner,
            kind,
            mime,
        } => cli::add::run_add(config, &path, &owner, kind.as_deref(), mime.as_deref()).await,
        Commands::Note { owner, text, name } => {
            cli::add::run_note(config, &owner, &text, &name).await
        }
        Commands::Worker { once } => cli::worker::run(config, once).await,
        Commands::Jobs {
            artifact,
            status,
            kind,
        } => cli::jobs::run_list(config, artifact, status.as_deref(), kind.as_deref()).await,
        Commands::Retry { job } => cli::jobs::run_retry(config, job).await,
        Commands::Rerun { artifact, kind } => cli::jobs::run_rerun(config, artifact, &kind).await,
        Commands::Reprocess => cli::jobs::run_reprocess(config).await,
        Commands::Show { artifact, json } => cli::show::run(config, artifact, json).await,
        Commands::Search { query, scope, json } => {
            cli::search::run(config, &query, scope.scope(), json).await
        }
        Commands::Export { scope, output } => {
            cli::export::run(config, scope.scope(), output.as_deref()).await
        }
    }
}
