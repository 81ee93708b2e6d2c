use crate::error::Result;
use config::{Config, Environment, File};
use dirs::home_dir;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = ".clickdeck";
const ENV_PREFIX: &str = "CLICKDECK";

/// Application settings, layered as defaults < `~/.clickdeck/settings.toml`
/// < `CLICKDECK_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub credentials_file: PathBuf,
    pub key_file: PathBuf,
    pub log_file: PathBuf,
    pub log_level: String,
    /// Talk to the server over `https` instead of `http`.
    pub secure: bool,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub default_limit: u32,
    pub max_rows_limit: u32,
    pub max_cell_length: usize,
    pub default_port: u16,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let app_dir = Self::app_dir();
        Self::load_from(&app_dir, &app_dir.join("settings.toml"))
    }

    /// Builds settings with defaults rooted at `app_dir`, overlaid by the
    /// optional file at `settings_file` and the environment.
    pub fn load_from(app_dir: &Path, settings_file: &Path) -> Result<Self> {
        Self::load_layers(app_dir, settings_file, environment())
    }

    fn load_layers(app_dir: &Path, settings_file: &Path, env: Environment) -> Result<Self> {
        let credentials_file = Self::home().join(".clickhouse_credentials.json");

        let settings = Config::builder()
            .set_default("credentials_file", path_value(&credentials_file))?
            .set_default("key_file", path_value(&app_dir.join("key.bin")))?
            .set_default("log_file", path_value(&app_dir.join("clickdeck.log")))?
            .set_default("log_level", "info")?
            .set_default("secure", false)?
            .set_default("connect_timeout_secs", 5_i64)?
            .set_default("query_timeout_secs", 30_i64)?
            .set_default("default_limit", 100_i64)?
            .set_default("max_rows_limit", 1000_i64)?
            .set_default("max_cell_length", 300_i64)?
            .set_default("default_port", 8123_i64)?
            .add_source(File::from(settings_file).required(false))
            .add_source(env)
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn app_dir() -> PathBuf {
        Self::home().join(APP_DIR)
    }

    fn home() -> PathBuf {
        // Fall back to the working directory when no home can be resolved
        home_dir().unwrap_or_else(|| PathBuf::from("."))
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).try_parsing(true)
}

fn path_value(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
