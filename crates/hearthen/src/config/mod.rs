use error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod error;

const CONFIG_FILE_NAME: &str = "config.toml";
/// The authentication cookie is a fixed-size token issued by the account
/// service, carried here hex-encoded.
const COOKIE_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub account: AccountConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccountConfig {
    pub username: String,
    /// Hex-encoded session cookie from the account service.
    pub cookie: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:1870".to_string(),
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username: "wanderer".to_string(),
            cookie: "00".repeat(COOKIE_LEN),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            account: AccountConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if SocketAddr::from_str(&self.network.address).is_err() {
            return Err(ConfigError::Validation {
                reason: format!(
                    "Invalid server address format: '{}'. Expected format like 'IP:PORT'.",
                    self.network.address
                ),
            });
        }

        if self.account.username.trim().is_empty() {
            return Err(ConfigError::Validation {
                reason: "Account username cannot be empty.".to_string(),
            });
        }

        match hex::decode(&self.account.cookie) {
            Ok(cookie) if cookie.len() == COOKIE_LEN => {}
            Ok(cookie) => {
                return Err(ConfigError::Validation {
                    reason: format!(
                        "Cookie must be {} bytes, got {}.",
                        COOKIE_LEN,
                        cookie.len()
                    ),
                });
            }
            Err(err) => {
                return Err(ConfigError::Validation {
                    reason: format!("Cookie is not valid hex: {}.", err),
                });
            }
        }

        Ok(())
    }
}

pub fn handle() -> Result<Config, ConfigError> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);
    if config_path.exists() {
        let config_content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: CONFIG_FILE_NAME.to_string(),
            source,
        })?;
        let config: Config =
            toml::from_str(&config_content).map_err(|source| ConfigError::TomlDeserialization {
                path: CONFIG_FILE_NAME.to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    } else {
        let config = Config::default();
        save(&config, &config_path)?;
        Ok(config)
    }
}

fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let config_content =
        toml::to_string_pretty(config).map_err(|source| ConfigError::TomlSerialization {
            path: path.display().to_string(),
            source,
        })?;
    let mut file = fs::File::create(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    file.write_all(config_content.as_bytes())
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
    Ok(())
}
