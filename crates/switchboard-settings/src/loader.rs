//! Settings loading: compiled defaults, then an optional JSON file, then
//! environment variables (highest priority).
//!
//! `null` values in the file keep the default. Empty or unparseable env
//! values are ignored, the latter with a warning.

use std::path::Path;

use secrecy::SecretString;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{DatabaseType, Settings};

/// Env var naming an alternate settings file.
pub const CONFIG_PATH_ENV: &str = "SWITCHBOARD_CONFIG";

/// Load settings from `path` (or `$SWITCHBOARD_CONFIG`) with env overrides,
/// then validate.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let from_env = read_env_string(CONFIG_PATH_ENV);
    let path = path.or(from_env.as_deref().map(Path::new));
    let mut settings = match path {
        Some(p) => load_file(p)?,
        None => Settings::default(),
    };
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Read one settings file over the compiled defaults. A missing file yields
/// the defaults.
pub fn load_file(path: &Path) -> Result<Settings> {
    if !path.exists() {
        debug!(?path, "settings file not found, using defaults");
        return Ok(Settings::default());
    }
    debug!(?path, "loading settings from file");
    let content = std::fs::read_to_string(path)?;
    let user: Value = serde_json::from_str(&content)?;
    Ok(serde_json::from_value(strip_nulls(user))?)
}

/// Drop `null` object members recursively so they fall back to defaults.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        other => other,
    }
}

pub fn validate(settings: &Settings) -> Result<()> {
    if settings.database.kind == DatabaseType::Postgres {
        return Err(SettingsError::Unsupported(
            "DATABASE_TYPE=postgres (use sqlite or memory)".into(),
        ));
    }
    Ok(())
}

/// Apply environment overrides using the service's historical variable names.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, read_env_string);
}

/// Same as [`apply_env_overrides`] with an injectable lookup.
pub fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("MODE") {
        settings.mode = v;
    }
    if let Some(v) = lookup("HOST") {
        settings.server.host = v;
    }
    if let Some(v) = lookup("PORT") {
        match parse_port(&v) {
            Some(port) => settings.server.port = port,
            None => tracing::warn!(key = "PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = lookup("AUTH_SECRET") {
        settings.server.auth_secret = Some(SecretString::from(v));
    }

    if let Some(v) = lookup("LANGFUSE_PUBLIC_KEY") {
        settings.langfuse.public_key = Some(SecretString::from(v));
    }
    if let Some(v) = lookup("LANGFUSE_SECRET_KEY") {
        settings.langfuse.secret_key = Some(SecretString::from(v));
    }
    if let Some(v) = lookup("LANGFUSE_HOST") {
        settings.langfuse.host = Some(v);
    }

    if let Some(v) = lookup("DATABASE_TYPE") {
        match DatabaseType::parse(&v) {
            Some(kind) => settings.database.kind = kind,
            None => {
                tracing::warn!(key = "DATABASE_TYPE", value = %v, "unknown database type, ignoring");
            }
        }
    }
    if let Some(v) = lookup("SQLITE_DB_PATH") {
        settings.database.sqlite_path = v;
    }

    if let Some(v) = lookup("OPENAI_API_KEY") {
        settings.model.api_key = Some(SecretString::from(v));
    }
    if let Some(v) = lookup("OPENAI_BASE_URL") {
        settings.model.base_url = v;
    }
    if let Some(v) = lookup("DEFAULT_MODEL") {
        settings.model.default_model = v;
    }
}

/// Parse a TCP port, rejecting 0.
pub fn parse_port(val: &str) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= 1).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
