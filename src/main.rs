use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moc::Server;
use moc::api::Api;
use moc::config::{Cli, Command, Config};
use moc::models::{Message, SEED_TEXT};
use moc::store::Store;

const RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    moc::recovery::install_panic_hook();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "moc failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), moc::Error> {
    info!("read config");
    cli.config.validate()?;

    let store = connect(&cli.config).await;

    match cli.command() {
        Command::Migrate => migrate(store.as_ref()).await,
        Command::Seed => seed(store.as_ref()).await,
        Command::Serve => {
            if cli.migrate {
                migrate(store.as_ref()).await?;
            }
            if cli.seed {
                seed(store.as_ref()).await?;
            }

            let dispatcher = Api::new(store, cli.config.operator_token).into_dispatcher()?;
            Server::bind(cli.config.addr).serve(dispatcher).await
        }
    }
}

/// Opens the store, retrying until the engine answers.
async fn connect(config: &Config) -> Arc<dyn Store> {
    info!(driver = ?config.driver, "init database");
    loop {
        match config.open_store() {
            Ok(store) => match store.ping().await {
                Ok(()) => {
                    info!("database connected");
                    return store;
                }
                Err(e) => error!(error = %e, "try to connect..."),
            },
            Err(e) => error!(error = %e, "try to connect..."),
        }
        tokio::time::sleep(RETRY_INTERVAL).await;
    }
}

async fn migrate(store: &dyn Store) -> Result<(), moc::Error> {
    info!("migrate");
    store.migrate().await?;
    Ok(())
}

async fn seed(store: &dyn Store) -> Result<(), moc::Error> {
    info!("seed");
    let message = Message::new(SEED_TEXT);
    store.create(&message).await?;
    info!(id = %message.id, "seeded message");
    Ok(())
}
