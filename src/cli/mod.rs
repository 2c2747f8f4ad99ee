pub mod handlers;

use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::config::{Config, ConfigError};
use crate::core::feed::fetcher::FetchError;
use crate::core::storage::repository::{Repository, StorageError};

/// A parsed invocation: the command name plus its positional arguments.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

pub struct AppState {
    pub config: Config,
    pub repository: Repository,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("no user is logged in; run `feedr login <name>` first")]
    NotLoggedIn,
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub type HandlerResult<'a> = BoxFuture<'a, Result<(), CliError>>;

/// A handler capability: borrow the state, run one command to completion.
pub type Handler = for<'a> fn(&'a mut AppState, Command) -> HandlerResult<'a>;

/// Explicit name → handler mapping, built once at startup.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl CommandRegistry {
    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    pub async fn run(&self, state: &mut AppState, command: Command) -> Result<(), CliError> {
        match self.handlers.get(command.name.as_str()) {
            Some(handler) => handler(state, command).await,
            None => Err(CliError::UnknownCommand(command.name)),
        }
    }

    pub fn command_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

pub fn default_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::default();
    registry.register("login", |state, command| {
        Box::pin(handlers::login(state, command))
    });
    registry.register("register", |state, command| {
        Box::pin(handlers::register(state, command))
    });
    registry.register("reset", |state, command| {
        Box::pin(handlers::reset(state, command))
    });
    registry.register("users", |state, command| {
        Box::pin(handlers::users(state, command))
    });
    registry.register("addfeed", |state, command| {
        Box::pin(handlers::addfeed(state, command))
    });
    registry.register("feeds", |state, command| {
        Box::pin(handlers::feeds(state, command))
    });
    registry.register("follow", |state, command| {
        Box::pin(handlers::follow(state, command))
    });
    registry.register("following", |state, command| {
        Box::pin(handlers::following(state, command))
    });
    registry.register("unfollow", |state, command| {
        Box::pin(handlers::unfollow(state, command))
    });
    registry.register("browse", |state, command| {
        Box::pin(handlers::browse(state, command))
    });
    registry.register("agg", |state, command| {
        Box::pin(handlers::agg(state, command))
    });
    registry
}
