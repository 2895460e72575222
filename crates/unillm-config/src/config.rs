use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use unillm_llm::provider::{bedrock_runtime_url, ANTHROPIC, BEDROCK_MISTRAL};
use unillm_llm::{AuthConfig, ProviderConfig};

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    /// Service used when a request does not name one
    pub default_service: String,
    pub services: HashMap<String, ProviderSettings>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut services = HashMap::new();

        services.insert(
            BEDROCK_MISTRAL.to_string(),
            ProviderSettings {
                enabled: true,
                base_url: bedrock_runtime_url("us-east-1"),
                region: Some("us-east-1".to_string()),
                model: None,
                auth: AuthSettings::None,
                headers: None,
                timeout_seconds: Some(60),
            },
        );

        services.insert(
            ANTHROPIC.to_string(),
            ProviderSettings {
                enabled: true,
                base_url: "https://api.anthropic.com/v1".to_string(),
                region: None,
                model: None,
                auth: AuthSettings::ApiKey {
                    env: "ANTHROPIC_API_KEY".to_string(),
                },
                headers: None,
                timeout_seconds: Some(60),
            },
        );

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            default_service: BEDROCK_MISTRAL.to_string(),
            services,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Read a value by dotted key, e.g. `services.anthropic.model`
    pub fn get_value(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["version"] => Some(self.version.clone()),
            ["default_service"] => Some(self.default_service.clone()),
            ["logging", "level"] => Some(self.logging.level.as_str().to_string()),
            ["logging", "file"] => self.logging.file.clone(),
            ["services", name, field] => {
                let service = self.services.get(*name)?;
                match *field {
                    "enabled" => Some(service.enabled.to_string()),
                    "base_url" => Some(service.base_url.clone()),
                    "region" => service.region.clone(),
                    "model" => service.model.clone(),
                    "timeout_seconds" => service.timeout_seconds.map(|t| t.to_string()),
                    "auth_type" => Some(service.auth.kind().to_string()),
                    "auth_env" => service.auth.env().map(str::to_string),
                    _ => None,
                }
            }
            ["services", name, "headers", header] => self
                .services
                .get(*name)?
                .headers
                .as_ref()?
                .get(*header)
                .cloned(),
            _ => None,
        }
    }

    /// Set a value by dotted key. Service fields can only be set on existing services.
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["default_service"] => {
                self.default_service = value.to_string();
            }
            ["logging", "level"] => {
                self.logging.level = value.parse()?;
            }
            ["logging", "file"] => {
                self.logging.file = Some(value.to_string());
            }
            ["services", name, field] => {
                let service = self
                    .services
                    .get_mut(*name)
                    .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
                match *field {
                    "enabled" => {
                        service.enabled = value.parse().map_err(|_| {
                            ConfigError::Validation(format!("Invalid boolean: {}", value))
                        })?;
                    }
                    "base_url" => {
                        service.base_url = value.to_string();
                    }
                    "region" => {
                        service.region = Some(value.to_string());
                    }
                    "model" => {
                        service.model = Some(value.to_string());
                    }
                    "timeout_seconds" => {
                        service.timeout_seconds = Some(value.parse().map_err(|_| {
                            ConfigError::Validation(format!("Invalid number: {}", value))
                        })?);
                    }
                    _ => return Err(ConfigError::KeyNotFound(key.to_string())),
                }
            }
            ["services", name, "headers", header] => {
                let service = self
                    .services
                    .get_mut(*name)
                    .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
                service
                    .headers
                    .get_or_insert_with(HashMap::new)
                    .insert(header.to_string(), value.to_string());
            }
            _ => return Err(ConfigError::KeyNotFound(key.to_string())),
        }
        Ok(())
    }

    /// Names of enabled services, sorted
    pub fn enabled_services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .services
            .iter()
            .filter(|(_, settings)| settings.enabled)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Provider config for `service`, or for the default service when `None`
    pub fn provider_config(&self, service: Option<&str>) -> ConfigResult<ProviderConfig> {
        let name = service.unwrap_or(&self.default_service);
        let settings = self
            .services
            .get(name)
            .ok_or_else(|| ConfigError::Validation(format!("Unknown service '{}'", name)))?;
        if !settings.enabled {
            return Err(ConfigError::Validation(format!("Service '{}' is disabled", name)));
        }
        settings.to_provider_config(name)
    }
}

/// Per-service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub base_url: String,
    /// AWS region for Bedrock services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub auth: AuthSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl ProviderSettings {
    /// Resolve credentials and build the transport-level config
    pub fn to_provider_config(&self, service: &str) -> ConfigResult<ProviderConfig> {
        let mut config = ProviderConfig::new(service, self.base_url.clone());
        config.auth = self.auth.resolve()?;
        config.region = self.region.clone();
        config.model = self.model.clone();
        if let Some(secs) = self.timeout_seconds {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(headers) = &self.headers {
            config.headers = headers.clone();
        }
        Ok(config)
    }
}

/// Authentication settings; secrets are read from the named environment variable.
/// Bedrock services use `none` and sign with the default AWS credential chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum AuthSettings {
    ApiKey {
        env: String,
    },
    Bearer {
        env: String,
    },
    #[default]
    None,
}

impl AuthSettings {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey { .. } => "api_key",
            Self::Bearer { .. } => "bearer",
            Self::None => "none",
        }
    }

    pub fn env(&self) -> Option<&str> {
        match self {
            Self::ApiKey { env } | Self::Bearer { env } => Some(env),
            Self::None => None,
        }
    }

    /// Read the secret from the environment
    pub fn resolve(&self) -> ConfigResult<AuthConfig> {
        match self {
            Self::ApiKey { env } => AuthConfig::api_key_from_env(env)
                .ok_or_else(|| ConfigError::EnvVarNotFound(env.clone())),
            Self::Bearer { env } => AuthConfig::bearer_from_env(env)
                .ok_or_else(|| ConfigError::EnvVarNotFound(env.clone())),
            Self::None => Ok(AuthConfig::None),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Append logs to this file instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_service, "bedrock-mistral");
        assert_eq!(config.enabled_services(), vec!["anthropic", "bedrock-mistral"]);
        assert_eq!(config.logging.level, LogLevel::Warn);

        let bedrock = config.provider_config(None).unwrap();
        assert_eq!(bedrock.auth, AuthConfig::None);
        assert_eq!(bedrock.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_auth_settings_are_flattened() {
        let settings = ProviderSettings {
            enabled: true,
            base_url: "https://api.anthropic.com/v1".to_string(),
            region: None,
            model: None,
            auth: AuthSettings::ApiKey {
                env: "ANTHROPIC_API_KEY".to_string(),
            },
            headers: None,
            timeout_seconds: None,
        };

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["auth_type"], "api_key");
        assert_eq!(json["env"], "ANTHROPIC_API_KEY");
        assert!(json.get("model").is_none());

        let parsed: ProviderSettings = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_get_and_set_values() {
        let mut config = Config::default();
        config.set_value("services.anthropic.model", "claude-3-haiku-20240307").unwrap();
        config.set_value("services.anthropic.headers.x-trace", "1").unwrap();
        config.set_value("logging.level", "DEBUG").unwrap();
        config.set_value("services.bedrock-mistral.region", "eu-west-3").unwrap();

        assert_eq!(
            config.get_value("services.anthropic.model").as_deref(),
            Some("claude-3-haiku-20240307")
        );
        assert_eq!(config.get_value("services.anthropic.headers.x-trace").as_deref(), Some("1"));
        assert_eq!(config.get_value("services.anthropic.auth_type").as_deref(), Some("api_key"));
        assert_eq!(config.get_value("logging.level").as_deref(), Some("debug"));
        assert_eq!(config.get_value("services.bedrock-mistral.region").as_deref(), Some("eu-west-3"));
        assert_eq!(config.get_value("services.bedrock-mistral.auth_type").as_deref(), Some("none"));
        assert_eq!(config.get_value("services.missing.model"), None);
    }

    #[test]
    fn test_set_value_errors() {
        let mut config = Config::default();
        assert!(matches!(
            config.set_value("services.missing.model", "m"),
            Err(ConfigError::KeyNotFound(_))
        ));
        assert!(matches!(
            config.set_value("services.anthropic.enabled", "maybe"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(config.set_value("nope", "x"), Err(ConfigError::KeyNotFound(_))));
    }

    #[test]
    fn test_provider_config_resolves_env() {
        std::env::set_var("UNILLM_TEST_ANTHROPIC_KEY", "secret");
        let mut config = Config::default();
        let anthropic = config.services.get_mut("anthropic").unwrap();
        anthropic.auth = AuthSettings::ApiKey {
            env: "UNILLM_TEST_ANTHROPIC_KEY".to_string(),
        };
        anthropic.timeout_seconds = Some(5);
        anthropic.model = Some("claude-3-haiku-20240307".to_string());

        let provider = config.provider_config(Some("anthropic")).unwrap();
        assert_eq!(provider.provider_id, "anthropic");
        assert_eq!(provider.auth, AuthConfig::ApiKey { key: "secret".into() });
        assert_eq!(provider.timeout, Duration::from_secs(5));
        assert_eq!(provider.model.as_deref(), Some("claude-3-haiku-20240307"));
    }

    #[test]
    fn test_provider_config_errors() {
        let mut config = Config::default();
        config.services.get_mut("bedrock-mistral").unwrap().auth = AuthSettings::Bearer {
            env: "UNILLM_TEST_UNSET_TOKEN".to_string(),
        };
        assert!(matches!(
            config.provider_config(None),
            Err(ConfigError::EnvVarNotFound(name)) if name == "UNILLM_TEST_UNSET_TOKEN"
        ));

        config.services.get_mut("anthropic").unwrap().enabled = false;
        assert!(matches!(config.provider_config(Some("anthropic")), Err(ConfigError::Validation(_))));
        assert!(matches!(config.provider_config(Some("openai")), Err(ConfigError::Validation(_))));
    }
}
