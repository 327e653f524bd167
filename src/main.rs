//! Chess Arbiter Server
//!
//! Entry point: load configuration, connect the repository, and run the
//! accept loop until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use chess_arbiter::config::Config;
use chess_arbiter::repository::mongo::MongoRepository;
use chess_arbiter::repository::Repository;
use chess_arbiter::{GameServer, VERSION};

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to install tracing subscriber");

    info!("chess arbiter server v{}", VERSION);

    if let Err(e) = run().await {
        tracing::error!(error = %format!("{e:#}"), "server exited with an error");
        std::process::exit(1);
    }
}

/// Everything that can fail on the way up is collected here so `main` has a
/// single place to report a fully-contexted error chain before exiting.
async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    let repo: Arc<dyn Repository> = Arc::new(
        MongoRepository::connect(&config.db_uri, &config.db_name)
            .await
            .context("failed to connect to the repository")?,
    );

    let server = GameServer::new(config, repo);
    server.run().await.context("server run loop failed")
}
