use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};

/// Provider configuration, built once and handed to every controller.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub function: FunctionSettings,
    #[serde(default)]
    pub namespace: NamespaceSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProviderConfig {
    /// Minimal configuration for the given token; everything else defaulted.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                token: Some(ApiToken::new(token)),
                ..ApiConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match &self.api.token {
            Some(token) if !token.expose().trim().is_empty() => {}
            _ => return Err("api.token is required".into()),
        }
        let base = url::Url::parse(&self.api.base_url)
            .map_err(|e| format!("api.base_url is not a valid URL: {e}"))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err("api.base_url must use http or https".into());
        }
        if self.api.request_timeout_secs == 0 {
            return Err("api.request_timeout_secs must be > 0".into());
        }
        if self.tools.doctl.trim().is_empty() {
            return Err("tools.doctl must not be empty".into());
        }
        if self.tools.command_timeout_secs == 0 {
            return Err("tools.command_timeout_secs must be > 0".into());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be >= 1".into());
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err("retry.initial_backoff_ms must be <= retry.max_backoff_ms".into());
        }
        if self.function.max_archive_bytes == 0 {
            return Err("function.max_archive_bytes must be > 0".into());
        }
        if self.function.fetch_timeout_secs == 0 {
            return Err("function.fetch_timeout_secs must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// The API token. Only meaningful after [`ProviderConfig::validate`] passed.
    pub fn token(&self) -> &str {
        self.api.token.as_ref().map(ApiToken::expose).unwrap_or_default()
    }
}

/// Bearer token for the control-plane API. Never printed.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub token: Option<ApiToken>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.digitalocean.com".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// External tooling used by the controllers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path or name of the `doctl` executable.
    #[serde(default = "default_doctl")]
    pub doctl: String,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_doctl() -> String {
    "doctl".to_string()
}
fn default_command_timeout_secs() -> u64 {
    600
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            doctl: default_doctl(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl ToolsConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Retry policy for idempotent requests (GET/PUT, archive download).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    250
}
fn default_max_backoff_ms() -> u64 {
    4000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSettings {
    /// Parent directory for per-call working directories (system temp dir when unset).
    #[serde(default)]
    pub work_root: Option<PathBuf>,
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_max_archive_bytes() -> u64 {
    256 * 1024 * 1024
}
fn default_fetch_timeout_secs() -> u64 {
    300
}

impl Default for FunctionSettings {
    fn default() -> Self {
        Self {
            work_root: None,
            max_archive_bytes: default_max_archive_bytes(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl FunctionSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceSettings {
    /// Look the namespace up remotely on read instead of trusting local state.
    #[serde(default)]
    pub verify_on_read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::{ApiToken, ProviderConfig};
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Environment variables that supply the token when the file does not.
    pub const TOKEN_ENV_VARS: [&str; 2] = ["DOFUNC_TOKEN", "DIGITALOCEAN_TOKEN"];

    pub fn load_config(path: Option<&str>) -> Result<ProviderConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if !pathbuf.exists() {
                    return Err(format!("config file not found: {p}"));
                }
                builder = builder.add_source(File::from(pathbuf));
            }
            None => {
                let default_path = PathBuf::from("dofunc.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., DOFUNC__API__BASE_URL=http://localhost:8080
        builder = builder.add_source(
            Environment::with_prefix("DOFUNC")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let mut merged: ProviderConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;

        if merged.api.token.is_none() {
            merged.api.token = TOKEN_ENV_VARS
                .iter()
                .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
                .map(ApiToken::new);
        }

        merged.validate()?;
        tracing::debug!(base_url = %merged.api.base_url, doctl = %merged.tools.doctl, "loaded provider configuration");
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<ProviderConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
