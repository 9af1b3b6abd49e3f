use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use gemba_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "GEMBA_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "GEMBA_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "GEMBA_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "notifier.email_webhook_url",
        config.notifier.email_webhook_url.as_deref().unwrap_or("<unset>"),
        source("notifier.email_webhook_url", "GEMBA_NOTIFY_EMAIL_WEBHOOK_URL"),
    ));
    lines.push(render_line(
        "notifier.chat_webhook_url",
        config.notifier.chat_webhook_url.as_deref().unwrap_or("<unset>"),
        source("notifier.chat_webhook_url", "GEMBA_NOTIFY_CHAT_WEBHOOK_URL"),
    ));
    let chat_bot_token =
        if config.notifier.chat_bot_token.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "notifier.chat_bot_token",
        chat_bot_token,
        source("notifier.chat_bot_token", "GEMBA_NOTIFY_CHAT_BOT_TOKEN"),
    ));
    lines.push(render_line(
        "notifier.chat_min_interval_ms",
        &config.notifier.chat_min_interval_ms.to_string(),
        source("notifier.chat_min_interval_ms", "GEMBA_NOTIFY_CHAT_MIN_INTERVAL_MS"),
    ));
    lines.push(render_line(
        "notifier.send_timeout_secs",
        &config.notifier.send_timeout_secs.to_string(),
        source("notifier.send_timeout_secs", "GEMBA_NOTIFY_SEND_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "cmms.enabled",
        &config.cmms.enabled.to_string(),
        source("cmms.enabled", "GEMBA_CMMS_ENABLED"),
    ));
    lines.push(render_line(
        "cmms.base_url",
        config.cmms.base_url.as_deref().unwrap_or("<unset>"),
        source("cmms.base_url", "GEMBA_CMMS_BASE_URL"),
    ));
    let cmms_api_key = if config.cmms.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "cmms.api_key",
        cmms_api_key,
        source("cmms.api_key", "GEMBA_CMMS_API_KEY"),
    ));
    lines.push(render_line(
        "cmms.timeout_secs",
        &config.cmms.timeout_secs.to_string(),
        source("cmms.timeout_secs", "GEMBA_CMMS_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "GEMBA_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "GEMBA_SERVER_PORT"),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", "GEMBA_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "GEMBA_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "GEMBA_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("gemba.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/gemba.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
