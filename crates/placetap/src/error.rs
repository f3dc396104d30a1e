use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlacetapError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Invalid job parameters: {0}")]
    Validation(#[from] ValidationError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crate::fetch::FetchError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// A batch operation was called with nothing to do. This is a caller bug,
    /// raised before any statement is issued.
    #[error("{operation} called with an empty batch")]
    EmptyBatch { operation: &'static str },

    #[error("Invalid zip reference CSV: {0}")]
    ZipCsv(#[from] csv::Error),

    #[error("No zip codes found for state '{state}'")]
    NoZipsForState { state: String },

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Rejected job parameters. Raised before any queue state is touched.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("keyword must not be empty")]
    EmptyKeyword,

    #[error("state must be a two-letter code, got '{0}'")]
    InvalidState(String),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

pub type Result<T> = std::result::Result<T, PlacetapError>;
