pub mod config;
pub mod manager;

pub use config::{
    AuthSettings, Config, ConfigError, ConfigResult, LogLevel, LoggingConfig, ProviderSettings,
};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "UNILLM_CONFIG";

/// unillm directory (`~/.unillm`)
pub fn unillm_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".unillm"))
}

/// Config file path: `$UNILLM_CONFIG`, else `~/.unillm/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => expand_tilde(&path),
        _ => unillm_dir().map(|dir| dir.join("config.json")),
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unillm_dir() {
        let dir = unillm_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().to_string_lossy().ends_with(".unillm"));
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/.unillm/config.json").unwrap();
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with(".unillm/config.json"));

        assert_eq!(expand_tilde("/etc/unillm.json"), Some(PathBuf::from("/etc/unillm.json")));
    }
}
