//! Configuration for the Thingbox client
//!
//! Values come from built-in defaults, then an optional config file, then
//! `THINGBOX__*` environment variables.

use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::auth::DEFAULT_TOKEN_KEY;
use crate::storage::FileStore;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// API base URL, without trailing slash
    pub base_url: String,
    /// Key the session token is stored under
    pub token_key: String,
    /// Directory of the file-backed session store (defaults to the user config dir)
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            storage_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the config file and environment variables
    ///
    /// The file is `thingbox.{toml,json,yaml}` in the working directory, or
    /// whatever `THINGBOX_CONFIG` names. It is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = env::var("THINGBOX_CONFIG").unwrap_or_else(|_| "thingbox".to_string());
        Self::load(Some(&file), Some(environment("THINGBOX")))
    }

    fn load(file: Option<&str>, environment: Option<Environment>) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("token_key", DEFAULT_TOKEN_KEY)?;

        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }
        if let Some(environment) = environment {
            builder = builder.add_source(environment);
        }

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        self
    }

    /// Override the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.normalized()
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(FileStore::default_dir)
    }
}

/// `{PREFIX}__BASE_URL` style variables
fn environment(prefix: &str) -> Environment {
    Environment::with_prefix(prefix)
        .prefix_separator("__")
        .separator("__")
}
