//! Error types for conditional order hashing and signing.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid domain: {message}")]
    Domain { message: String },

    #[error("Signing error: {message}")]
    Signing { message: String },

    #[error("Malformed condition: {message}")]
    Condition { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
