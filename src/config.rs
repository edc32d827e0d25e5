use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default staleness threshold in hours.
pub const DEFAULT_STALENESS_HOURS: u64 = 24;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteConfig {
    /// GraphQL endpoint URL
    pub endpoint: Option<String>,
    /// API key sent in the `x-api-key` header
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Request timeout in seconds (unbounded when absent)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl RemoteConfig {
    /// Returns true if both endpoint and api_key are present
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.api_key.is_some()
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Path to the persisted sync state
    pub state_path: ConfigValue<PathBuf>,
    /// Hours after which synced data is considered stale
    pub staleness_hours: ConfigValue<u64>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Remote API configuration
    pub remote: RemoteConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    state_path: Option<PathBuf>,
    staleness_hours: Option<u64>,
    remote: Option<RemoteConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let data_dir = Self::default_data_dir();

        // Start with defaults
        let mut database_path =
            ConfigValue::new(data_dir.join("customers.db"), ConfigSource::Default);
        let mut state_path =
            ConfigValue::new(data_dir.join("sync_state.json"), ConfigSource::Default);
        let mut staleness_hours = ConfigValue::new(DEFAULT_STALENESS_HOURS, ConfigSource::Default);
        let mut config_file = None;
        let mut remote = RemoteConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                database_path = ConfigValue::new(resolve(&path, db_path), ConfigSource::File);
            }
            if let Some(file_state_path) = file_config.state_path {
                state_path = ConfigValue::new(resolve(&path, file_state_path), ConfigSource::File);
            }
            if let Some(hours) = file_config.staleness_hours {
                staleness_hours = ConfigValue::new(hours, ConfigSource::File);
            }
            if let Some(remote_config) = file_config.remote {
                remote = remote_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("CUSTSYNC_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(env_state_path) = std::env::var("CUSTSYNC_STATE_PATH") {
            state_path = ConfigValue::new(PathBuf::from(env_state_path), ConfigSource::Environment);
        }
        if let Ok(hours) = std::env::var("CUSTSYNC_STALENESS_HOURS") {
            if let Ok(hours) = hours.parse() {
                staleness_hours = ConfigValue::new(hours, ConfigSource::Environment);
            }
        }
        if let Ok(url) = std::env::var("CUSTSYNC_REMOTE_URL") {
            remote.endpoint = Some(url);
        }
        if let Ok(key) = std::env::var("CUSTSYNC_API_KEY") {
            remote.api_key = Some(key);
        }

        Ok(Self {
            database_path,
            state_path,
            staleness_hours,
            config_file,
            remote,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/custsync/
    /// - macOS: ~/Library/Application Support/custsync/
    /// - Windows: %APPDATA%/custsync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("custsync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/custsync/
    /// - macOS: ~/Library/Application Support/custsync/
    /// - Windows: %APPDATA%/custsync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("custsync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Resolve relative paths against the config file's directory
fn resolve(config_path: &Path, value: PathBuf) -> PathBuf {
    if value.is_relative() {
        config_path
            .parent()
            .map(|p| p.join(&value))
            .unwrap_or(value)
    } else {
        value
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config
            .database_path
            .value
            .to_string_lossy()
            .contains("customers.db"));
        assert_eq!(config.database_path.source, ConfigSource::Default);
        assert_eq!(config.staleness_hours.value, DEFAULT_STALENESS_HOURS);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: /custom/path/db.sqlite").unwrap();
        writeln!(file, "staleness_hours: 2").unwrap();
        writeln!(file, "remote:").unwrap();
        writeln!(file, "  endpoint: https://api.example.com/graphql").unwrap();
        writeln!(file, "  api_key: da2-secret").unwrap();
        writeln!(file, "  timeout_secs: 30").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(
            config.database_path.value,
            PathBuf::from("/custom/path/db.sqlite")
        );
        assert_eq!(config.database_path.source, ConfigSource::File);
        assert_eq!(config.staleness_hours.value, 2);
        assert_eq!(config.staleness_hours.source, ConfigSource::File);
        assert!(config.remote.is_configured());
        assert_eq!(config.remote.timeout_secs, Some(30));
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: data/customers.db").unwrap();
        writeln!(file, "state_path: state.json").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(
            config.database_path.value,
            temp_dir.path().join("data/customers.db")
        );
        assert_eq!(config.state_path.value, temp_dir.path().join("state.json"));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "staleness_hours: 5").unwrap();

        std::env::set_var("CUSTSYNC_STALENESS_HOURS", "7");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.staleness_hours.value, 7);
        assert_eq!(config.staleness_hours.source, ConfigSource::Environment);

        std::env::remove_var("CUSTSYNC_STALENESS_HOURS");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let remote = RemoteConfig {
            endpoint: Some("https://api.example.com".to_string()),
            api_key: Some("da2-secret".to_string()),
            timeout_secs: None,
        };
        let json = serde_json::to_string(&remote).unwrap();
        assert!(!json.contains("da2-secret"));
    }
}
