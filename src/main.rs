use anyhow::{Context, Result};
use std::process;
use std::sync::Arc;
use tracing::{debug, info};

use validate_tabular::cli::Cli;
use validate_tabular::config::{Config, ConfigManager};
use validate_tabular::dispatcher::Dispatcher;
use validate_tabular::logging;
use validate_tabular::output::Output;
use validate_tabular::session::UploadSession;
use validate_tabular::snapshot::FileSnapshotStore;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    match run(cli).await {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(2);
        }
    }
}

/// Returns whether every slot ended in success
async fn run(cli: Cli) -> Result<bool> {
    cli.validate().map_err(anyhow::Error::msg)?;

    let config = ConfigManager::load_config(&cli)
        .await
        .context("Failed to load configuration")?;
    logging::init(&config.logging.filter);
    debug!(?config, "Configuration loaded");

    let mut session = build_session(&config);
    if config.session.persist && session.restore().await {
        info!(path = %config.session.snapshot_path.display(), "Continuing previous session");
    }

    if cli.clear {
        session.clear_all().await;
    }

    let uploads = cli.uploads();
    if !uploads.is_empty() {
        session.submit_files(uploads).await;
        session.wait_all().await;
    }

    let output = Output::new(config.output.format, config.output.verbosity());
    print!("{}", output.render(session.state())?);

    Ok(session.state().all_succeeded())
}

fn build_session(config: &Config) -> UploadSession {
    let session = UploadSession::new(Dispatcher::new(config.dispatch.min_latency()));
    if config.session.persist {
        session.with_store(Arc::new(FileSnapshotStore::new(
            config.session.snapshot_path.clone(),
        )))
    } else {
        session
    }
}
