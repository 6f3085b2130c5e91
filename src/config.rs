//! Application configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::ServiceError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub model: ModelConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Historical vessel positions, re-read on every request
    pub csv_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Exported isolation forest (JSON)
    pub path: PathBuf,
    /// Scorer label that marks a position report as anomalous
    #[serde(default = "default_anomaly_label")]
    pub anomaly_label: i32,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: Duration,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_anomaly_label() -> i32 {
    -1
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("AISAPI")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        self.server.socket_addr()?;
        self.data.validate()?;
        self.model.validate()?;
        self.database.validate()
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ServiceError> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .map_err(|e| ServiceError::ConfigurationError {
                message: format!("Invalid listen address: {}", e),
            })
    }
}

impl DataConfig {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.csv_path.as_os_str().is_empty() {
            return Err(ServiceError::ConfigurationError {
                message: "CSV path cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if !self.path.is_file() {
            return Err(ServiceError::ConfigurationError {
                message: format!("Model artifact not found: {}", self.path.display()),
            });
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.url.is_empty() {
            return Err(ServiceError::ConfigurationError {
                message: "Database URL cannot be empty".to_string(),
            });
        }
        if self.max_connections == 0 {
            return Err(ServiceError::ConfigurationError {
                message: "Database pool needs at least one connection".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_load_config() {
        env::set_var("AISAPI__SERVER__PORT", "9000");
        env::set_var("AISAPI__DATA__CSV_PATH", "/tmp/anomalies.csv");
        env::set_var("AISAPI__MODEL__PATH", "/tmp/model.json");
        env::set_var("AISAPI__DATABASE__URL", "postgres://localhost/ais");
        env::set_var("AISAPI__DATABASE__ACQUIRE_TIMEOUT", "10");

        let config = AppConfig::load().unwrap();
        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.data.csv_path, PathBuf::from("/tmp/anomalies.csv"));
        assert_eq!(config.model.path, PathBuf::from("/tmp/model.json"));
        assert_eq!(config.model.anomaly_label, -1);
        assert_eq!(config.database.url, "postgres://localhost/ais");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.acquire_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_server_config_socket_addr() {
        let config = ServerConfig {
            address: "127.0.0.1".to_string(),
            port: 8080,
        };
        assert_eq!(
            config.socket_addr().unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );

        let config = ServerConfig {
            address: "not an address".to_string(),
            port: 8080,
        };
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_data_config_validate_empty_path() {
        let config = DataConfig {
            csv_path: PathBuf::from(""),
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_config_validate() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = ModelConfig {
            path: file.path().to_path_buf(),
            anomaly_label: -1,
        };
        assert!(config.validate().is_ok());

        let config = ModelConfig {
            path: PathBuf::from("/nonexistent/model.json"),
            anomaly_label: -1,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_config_validate_zero_connections() {
        let config = DatabaseConfig {
            url: "postgres://localhost/ais".to_string(),
            max_connections: 0,
            acquire_timeout: Duration::from_secs(5),
        };

        assert!(config.validate().is_err());
    }
}
