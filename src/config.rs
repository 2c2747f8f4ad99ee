use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = ".feedrconfig.json";
const DEFAULT_DB_FILE: &str = ".feedr.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine the home directory")]
    NoHomeDir,
    #[error("could not access the config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid poll interval: {0:?}")]
    InvalidInterval(String),
}

/// On-disk tool state: which database to talk to and who is logged in.
/// Lives at `~/.feedrconfig.json`; a missing file yields defaults and the
/// file appears on first save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub db_url: String,
    #[serde(default)]
    pub current_user_name: String,
    #[serde(skip)]
    path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(home_dir()?.join(CONFIG_FILE_NAME))
    }

    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<Config>(&contents)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Self::defaults()?,
            Err(err) => return Err(err.into()),
        };
        config.path = path;
        Ok(config)
    }

    pub fn set_user(&mut self, name: &str) -> Result<(), ConfigError> {
        self.current_user_name = name.to_string();
        self.save()
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&self.path, data)?;
        Ok(())
    }

    fn defaults() -> Result<Self, ConfigError> {
        let database_path = home_dir()?.join(DEFAULT_DB_FILE);
        Ok(Config {
            db_url: format!("sqlite://{}?mode=rwc", database_path.to_string_lossy()),
            current_user_name: String::new(),
            path: PathBuf::new(),
        })
    }
}

fn home_dir() -> Result<PathBuf, ConfigError> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or(ConfigError::NoHomeDir)
}
