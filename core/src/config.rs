//! Client credentials and endpoint configuration.

use thiserror::Error;

/// Production admin API host.
pub const DEFAULT_BASE_URL: &str = "https://api.instantdb.com";

pub const ENV_APP_ID: &str = "INSTANT_APP_ID";
pub const ENV_SECRET: &str = "INSTANT_SECRET";
pub const ENV_BASE_URL: &str = "INSTANT_API_URL";

const LEGACY_ENV_APP_ID: &str = "APP_ID";
const LEGACY_ENV_SECRET: &str = "SECRET";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
}

/// Everything needed to construct an `AdminClient`.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub app_id: String,
    pub secret: String,
    pub base_url: String,
}

impl ClientConfig {
    pub fn new(app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            secret: secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Load from the process environment.
    ///
    /// Reads `INSTANT_APP_ID` and `INSTANT_SECRET`, falling back to `APP_ID`
    /// and `SECRET`. `INSTANT_API_URL` overrides the base URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let first = |keys: [&str; 2]| keys.into_iter().find_map(|key| lookup(key).filter(|v| !v.is_empty()));

        let app_id = first([ENV_APP_ID, LEGACY_ENV_APP_ID]).ok_or(ConfigError::MissingVar(ENV_APP_ID))?;
        let secret = first([ENV_SECRET, LEGACY_ENV_SECRET]).ok_or(ConfigError::MissingVar(ENV_SECRET))?;

        let mut config = Self::new(app_id, secret);
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            config.base_url = base_url;
        }
        Ok(config)
    }
}

// Hand-written so the secret never ends up in logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("app_id", &self.app_id)
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
