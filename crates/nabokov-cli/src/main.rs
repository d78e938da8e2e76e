//! nabokov: streaming LLM generation backend for the Nabokov note canvas.

mod cli;
mod commands;
mod config;

use clap::Parser;
use cli::{Cli, Commands};
use config::ConfigStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = ConfigStore::new();
    let mut config = store.load();
    config.apply_env();
    if let Some(model) = &cli.model {
        config.codex.model = Some(model.clone());
        config.claude.model = Some(model.clone());
    }
    tracing::debug!(path = %store.path().display(), provider = ?config.provider, "configuration loaded");

    let service = commands::build_service(&config, cli.provider.as_deref())?;

    match cli.command {
        Commands::Serve { port, ref host } => {
            let port = port.unwrap_or(config.port);
            commands::serve::run(Arc::new(service), host, port).await?;
        }
        Commands::Exec {
            ref prompt,
            ref system,
            json,
        } => {
            let options = commands::exec::ExecOptions {
                system: system.clone(),
                json,
            };
            if let Err(err) = commands::exec::run(&service, prompt, options).await {
                if let Some(exit_err) = err.downcast_ref::<commands::exec::ExecExitError>() {
                    if !json {
                        eprintln!("{}", exit_err.message);
                    }
                    std::process::exit(exit_err.code);
                }
                return Err(err);
            }
        }
        Commands::Generate {
            template,
            title,
            content,
            label,
        } => {
            let options = commands::generate::GenerateOptions {
                template,
                title,
                content,
                label,
            };
            commands::generate::run(Arc::new(service), options).await?;
        }
        Commands::Providers => commands::providers::run(&service),
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `--verbose` selects debug for our crates.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "nabokov_cli=debug,nabokov_provider=debug,nabokov_session=debug,nabokov_server=debug,tower_http=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
