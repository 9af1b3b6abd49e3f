use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub notifier: NotifierConfig,
    pub cmms: CmmsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Outbound notification channels. Either channel may be left
/// unconfigured; the dispatcher then skips it.
#[derive(Clone, Debug)]
pub struct NotifierConfig {
    pub email_webhook_url: Option<String>,
    pub chat_webhook_url: Option<String>,
    pub chat_bot_token: Option<SecretString>,
    /// Minimum spacing between chat sends. The chat gateway historically
    /// throttles at roughly 2 requests per second.
    pub chat_min_interval_ms: u64,
    pub send_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CmmsConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub email_webhook_url: Option<String>,
    pub chat_webhook_url: Option<String>,
    pub chat_bot_token: Option<String>,
    pub cmms_enabled: Option<bool>,
    pub cmms_base_url: Option<String>,
    pub cmms_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://gemba.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            notifier: NotifierConfig {
                email_webhook_url: None,
                chat_webhook_url: None,
                chat_bot_token: None,
                chat_min_interval_ms: 500,
                send_timeout_secs: 5,
            },
            cmms: CmmsConfig { enabled: false, base_url: None, api_key: None, timeout_secs: 5 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("gemba.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(notifier) = patch.notifier {
            if let Some(email_webhook_url) = notifier.email_webhook_url {
                self.notifier.email_webhook_url = Some(email_webhook_url);
            }
            if let Some(chat_webhook_url) = notifier.chat_webhook_url {
                self.notifier.chat_webhook_url = Some(chat_webhook_url);
            }
            if let Some(chat_bot_token_value) = notifier.chat_bot_token {
                self.notifier.chat_bot_token = Some(secret_value(chat_bot_token_value));
            }
            if let Some(chat_min_interval_ms) = notifier.chat_min_interval_ms {
                self.notifier.chat_min_interval_ms = chat_min_interval_ms;
            }
            if let Some(send_timeout_secs) = notifier.send_timeout_secs {
                self.notifier.send_timeout_secs = send_timeout_secs;
            }
        }

        if let Some(cmms) = patch.cmms {
            if let Some(enabled) = cmms.enabled {
                self.cmms.enabled = enabled;
            }
            if let Some(base_url) = cmms.base_url {
                self.cmms.base_url = Some(base_url);
            }
            if let Some(api_key_value) = cmms.api_key {
                self.cmms.api_key = Some(secret_value(api_key_value));
            }
            if let Some(timeout_secs) = cmms.timeout_secs {
                self.cmms.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("GEMBA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("GEMBA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("GEMBA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("GEMBA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("GEMBA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("GEMBA_NOTIFY_EMAIL_WEBHOOK_URL") {
            self.notifier.email_webhook_url = Some(value);
        }
        if let Some(value) = read_env("GEMBA_NOTIFY_CHAT_WEBHOOK_URL") {
            self.notifier.chat_webhook_url = Some(value);
        }
        if let Some(value) = read_env("GEMBA_NOTIFY_CHAT_BOT_TOKEN") {
            self.notifier.chat_bot_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("GEMBA_NOTIFY_CHAT_MIN_INTERVAL_MS") {
            self.notifier.chat_min_interval_ms =
                parse_u64("GEMBA_NOTIFY_CHAT_MIN_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("GEMBA_NOTIFY_SEND_TIMEOUT_SECS") {
            self.notifier.send_timeout_secs = parse_u64("GEMBA_NOTIFY_SEND_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("GEMBA_CMMS_ENABLED") {
            self.cmms.enabled = parse_bool("GEMBA_CMMS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("GEMBA_CMMS_BASE_URL") {
            self.cmms.base_url = Some(value);
        }
        if let Some(value) = read_env("GEMBA_CMMS_API_KEY") {
            self.cmms.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("GEMBA_CMMS_TIMEOUT_SECS") {
            self.cmms.timeout_secs = parse_u64("GEMBA_CMMS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("GEMBA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("GEMBA_SERVER_PORT") {
            self.server.port = parse_u16("GEMBA_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("GEMBA_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("GEMBA_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("GEMBA_LOGGING_LEVEL").or_else(|| read_env("GEMBA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("GEMBA_LOGGING_FORMAT").or_else(|| read_env("GEMBA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(email_webhook_url) = overrides.email_webhook_url {
            self.notifier.email_webhook_url = Some(email_webhook_url);
        }
        if let Some(chat_webhook_url) = overrides.chat_webhook_url {
            self.notifier.chat_webhook_url = Some(chat_webhook_url);
        }
        if let Some(chat_bot_token) = overrides.chat_bot_token {
            self.notifier.chat_bot_token = Some(secret_value(chat_bot_token));
        }
        if let Some(enabled) = overrides.cmms_enabled {
            self.cmms.enabled = enabled;
        }
        if let Some(base_url) = overrides.cmms_base_url {
            self.cmms.base_url = Some(base_url);
        }
        if let Some(api_key) = overrides.cmms_api_key {
            self.cmms.api_key = Some(secret_value(api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_notifier(&self.notifier)?;
        validate_cmms(&self.cmms)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("gemba.toml"), PathBuf::from("config/gemba.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_notifier(notifier: &NotifierConfig) -> Result<(), ConfigError> {
    for (key, url) in [
        ("notifier.email_webhook_url", &notifier.email_webhook_url),
        ("notifier.chat_webhook_url", &notifier.chat_webhook_url),
    ] {
        if let Some(url) = url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{key} must start with http:// or https://"
                )));
            }
        }
    }

    if notifier.chat_webhook_url.is_some() {
        let missing = notifier
            .chat_bot_token
            .as_ref()
            .map(|token| token.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "notifier.chat_bot_token is required when notifier.chat_webhook_url is set"
                    .to_string(),
            ));
        }
    }

    if notifier.send_timeout_secs == 0 || notifier.send_timeout_secs > 30 {
        return Err(ConfigError::Validation(
            "notifier.send_timeout_secs must be in range 1..=30".to_string(),
        ));
    }

    Ok(())
}

fn validate_cmms(cmms: &CmmsConfig) -> Result<(), ConfigError> {
    if cmms.enabled {
        let missing = cmms.base_url.as_ref().map(|url| url.trim().is_empty()).unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "cmms.enabled is true but cmms.base_url is not configured".to_string(),
            ));
        }
    }

    if let Some(base_url) = &cmms.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "cmms.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if cmms.timeout_secs == 0 || cmms.timeout_secs > 30 {
        return Err(ConfigError::Validation(
            "cmms.timeout_secs must be in range 1..=30".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    notifier: Option<NotifierPatch>,
    cmms: Option<CmmsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotifierPatch {
    email_webhook_url: Option<String>,
    chat_webhook_url: Option<String>,
    chat_bot_token: Option<String>,
    chat_min_interval_ms: Option<u64>,
    send_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CmmsPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
