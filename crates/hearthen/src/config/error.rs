use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse TOML from file '{path}': {source}")]
    TomlDeserialization {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize configuration to TOML for file '{path}': {source}")]
    TomlSerialization {
        path: String,
        #[source]
        source: toml::ser::Error,
    },
    #[error("Configuration validation failed: {reason}")]
    Validation { reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
