use std::process;

use tracing_subscriber::EnvFilter;

use feedr::cli::{self, AppState, CliError, Command};
use feedr::config::Config;
use feedr::core::storage::repository::Repository;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let registry = cli::default_registry();

    let mut args = std::env::args().skip(1);
    let Some(name) = args.next() else {
        return Err(CliError::Usage("feedr <command> [args...]"));
    };
    let command = Command {
        name,
        args: args.collect(),
    };

    let config = Config::load()?;
    let repository = Repository::connect(&config.db_url).await?;
    let mut state = AppState { config, repository };

    match registry.run(&mut state, command).await {
        Err(CliError::UnknownCommand(name)) => Err(CliError::Message(format!(
            "unknown command {name:?}; available: {}",
            registry.command_names().join(", ")
        ))),
        other => other,
    }
}
