// DBdex: chat with your relational database
//
// This is the main entry point: it resolves configuration, sets up logging,
// connects to the database and hands over to the REPL.

use anyhow::{Context, Result};
use clap::Parser;
use dbdex::agent::{AgentDeps, AgentRunner, TerminalSink};
use dbdex::cli::Repl;
use dbdex::config::{AppConfig, CliArgs, Settings};
use dbdex::database::DatabaseManager;
use dbdex::llm::ProviderRegistry;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Console logging with `--debug`, otherwise a log file under the data dir
fn init_tracing(debug: bool) {
    if debug {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("dbdex=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
        return;
    }

    let Some(dir) = dirs::data_local_dir().map(|dir| dir.join("dbdex")) else {
        return;
    };
    let file = std::fs::create_dir_all(&dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("dbdex.log"))
    });
    if let Ok(file) = file {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dbdex=info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = CliArgs::parse();
    init_tracing(args.debug);

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    let registry = ProviderRegistry::new();
    let config = AppConfig::resolve(&args, &settings, &registry)?;
    info!(model = %config.model, stream = config.stream, "starting session");

    let provider = registry.build(&config.model, config.api_key.clone())?;
    let database = Arc::new(DatabaseManager::connect(&config.db_uri).await?);

    let deps = AgentDeps::new(database.clone(), Arc::new(TerminalSink))
        .with_max_return_values(config.max_return_values);
    let runner = AgentRunner::new(Arc::from(provider), deps)?.with_streaming(config.stream);

    let mut repl = Repl::new(runner)?;
    repl.run().await?;

    database.close().await;
    Ok(())
}
