use crate::config::{Config, ConfigError, ConfigResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

const ENV_PATTERN: &str = r"\$\{([^}]+)\}";

/// Loads, validates and persists the config file
#[derive(Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    /// Load `path`, writing the default config there first if it does not exist
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            info!("Config file not found, creating default config at {:?}", path);
            Self::write(path, &Config::default()).await?;
        }

        let config = Self::read(path).await?;
        Ok(Self::new(config, path.to_path_buf()))
    }

    /// Load from `$UNILLM_CONFIG` or `~/.unillm/config.json`
    pub async fn load_default() -> ConfigResult<Self> {
        let config_path = Self::default_config_path()?;
        Self::load(&config_path).await
    }

    pub fn default_config_path() -> ConfigResult<PathBuf> {
        crate::default_config_path()
            .ok_or_else(|| ConfigError::InvalidPath("Could not find home directory".to_string()))
    }

    /// Write the default config to `path`. Refuses to overwrite unless `force`.
    pub async fn init(path: &Path, force: bool) -> ConfigResult<Self> {
        if path.exists() && !force {
            return Err(ConfigError::InvalidPath(format!(
                "Config file already exists: {:?}",
                path
            )));
        }
        let config = Config::default();
        Self::write(path, &config).await?;
        info!("Initialized config at {:?}", path);
        Ok(Self::new(config, path.to_path_buf()))
    }

    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Shared handle to the live config
    pub fn get(&self) -> Arc<RwLock<Config>> {
        Arc::clone(&self.config)
    }

    /// Copy of the current config
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn save(&self) -> ConfigResult<()> {
        let config = self.config.read().await.clone();
        Self::write(&self.path, &config).await?;
        info!("Config saved to {:?}", self.path);
        Ok(())
    }

    /// Re-read the file; the live config is untouched when the new one is invalid
    pub async fn reload(&self) -> ConfigResult<()> {
        if !self.path.exists() {
            return Err(ConfigError::InvalidPath(format!(
                "Config file not found: {:?}",
                self.path
            )));
        }

        let new_config = Self::read(&self.path).await?;
        *self.config.write().await = new_config;

        info!("Config reloaded from {:?}", self.path);
        Ok(())
    }

    /// Apply `f`, validate, and save. Nothing changes if validation fails.
    pub async fn update<F>(&self, f: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config) -> ConfigResult<()>,
    {
        let mut config = self.config.write().await;
        let mut updated = config.clone();
        f(&mut updated)?;
        Self::validate(&updated)?;
        *config = updated;
        drop(config);
        self.save().await
    }

    pub fn validate(config: &Config) -> ConfigResult<()> {
        let default = config.services.get(&config.default_service).ok_or_else(|| {
            ConfigError::Validation(format!(
                "Default service '{}' not found in services list",
                config.default_service
            ))
        })?;
        if !default.enabled {
            return Err(ConfigError::Validation(format!(
                "Default service '{}' is disabled",
                config.default_service
            )));
        }

        for (name, settings) in &config.services {
            if settings.timeout_seconds == Some(0) {
                return Err(ConfigError::Validation(format!(
                    "Service '{}' timeout_seconds must be greater than 0",
                    name
                )));
            }
            if settings.enabled && settings.base_url.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Service '{}' has an empty base_url",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Expand `${VAR}` and `${VAR:-default}`
    pub fn expand_env_vars(content: &str) -> ConfigResult<String> {
        let re = Regex::new(ENV_PATTERN).map_err(|e| ConfigError::Validation(e.to_string()))?;
        let mut result = String::with_capacity(content.len());
        let mut last = 0;

        for cap in re.captures_iter(content) {
            let (Some(full), Some(expr)) = (cap.get(0), cap.get(1)) else {
                continue;
            };

            let (var_name, default_value) = match expr.as_str().split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (expr.as_str(), None),
            };

            let replacement = match (std::env::var(var_name), default_value) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.to_string(),
                (Err(_), None) => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
            };

            result.push_str(&content[last..full.start()]);
            result.push_str(&replacement);
            last = full.end();
        }

        result.push_str(&content[last..]);
        Ok(result)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(path: &Path) -> ConfigResult<Config> {
        debug!("Loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::expand_env_vars(&content)?;
        let config: Config = serde_json::from_str(&content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    async fn write(path: &Path, config: &Config) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(config)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
