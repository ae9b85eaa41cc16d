//! Settings types. Every section defaults field by field, so a settings file
//! only needs the keys it changes.

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

pub const DEFAULT_LANGFUSE_HOST: &str = "https://cloud.langfuse.com";

/// Root settings object.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// `dev` or `deployment`.
    pub mode: String,
    pub server: ServerSettings,
    pub langfuse: LangfuseSettings,
    pub database: DatabaseSettings,
    pub model: ModelSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: "deployment".to_string(),
            server: ServerSettings::default(),
            langfuse: LangfuseSettings::default(),
            database: DatabaseSettings::default(),
            model: ModelSettings::default(),
        }
    }
}

impl Settings {
    pub fn is_dev(&self) -> bool {
        self.mode == "dev"
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.server.port)
    }

    /// Langfuse keys plus host, only when both keys are present.
    pub fn langfuse_credentials(&self) -> Option<LangfuseCredentials> {
        let public_key = self.langfuse.public_key.clone()?;
        let secret_key = self.langfuse.secret_key.clone()?;
        Some(LangfuseCredentials {
            public_key,
            secret_key,
            host: self
                .langfuse
                .host
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGFUSE_HOST.to_string()),
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Bearer token clients must present. Unset disables auth.
    #[serde(deserialize_with = "secret_opt")]
    pub auth_secret: Option<SecretString>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            auth_secret: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LangfuseSettings {
    #[serde(deserialize_with = "secret_opt")]
    pub public_key: Option<SecretString>,
    #[serde(deserialize_with = "secret_opt")]
    pub secret_key: Option<SecretString>,
    pub host: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LangfuseCredentials {
    pub public_key: SecretString,
    pub secret_key: SecretString,
    pub host: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    Sqlite,
    Memory,
    Postgres,
}

impl DatabaseType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "memory" => Some(Self::Memory),
            "postgres" => Some(Self::Postgres),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseSettings {
    #[serde(rename = "type")]
    pub kind: DatabaseType,
    pub sqlite_path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            kind: DatabaseType::Sqlite,
            sqlite_path: "checkpoints.db".to_string(),
        }
    }
}

/// OpenAI-compatible chat-completions endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelSettings {
    #[serde(deserialize_with = "secret_opt")]
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub default_model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            default_model: "gpt-4o-mini".to_string(),
        }
    }
}

fn secret_opt<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}
