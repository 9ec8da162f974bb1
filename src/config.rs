use anyhow::{Context, Result};
use dirs::home_dir;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://idp2-apigw.cloud.grohe.com/v3/iot";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const EMAIL_ENV: &str = "GROHE_EMAIL";
pub const PASSWORD_ENV: &str = "GROHE_PASSWORD";

/// Connection settings, optionally stored in ~/.groheblue.yml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Applies to every request, including each step of the login flow
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ClientConfig {
    pub fn new_with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ClientConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load ~/.groheblue.yml, falling back to defaults when it does not exist
    pub fn load_default() -> Result<Self> {
        let config_path = get_config_path()?;

        if !config_path.exists() {
            debug!("No configuration file, using defaults");
            return Ok(Self::default());
        }

        Self::load(&config_path)
    }

    /// Save configuration to a YAML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        debug!("Saved configuration to {}", path.display());
        Ok(())
    }
}

/// Get the path to the configuration file (~/.groheblue.yml)
pub fn get_config_path() -> Result<PathBuf> {
    let home = home_dir().context("Failed to determine home directory")?;
    Ok(home.join(".groheblue.yml"))
}

/// Grohe account credentials
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Read credentials from GROHE_EMAIL and GROHE_PASSWORD
    pub fn from_env() -> Result<Self> {
        let email = std::env::var(EMAIL_ENV).with_context(|| {
            format!(
                "Email is required. Set the {} environment variable.",
                EMAIL_ENV
            )
        })?;
        let password = std::env::var(PASSWORD_ENV).with_context(|| {
            format!(
                "Password is required. Set the {} environment variable.",
                PASSWORD_ENV
            )
        })?;

        Ok(Self::new(email, password))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
