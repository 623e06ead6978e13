use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected HTTP status: {status}")]
    UnexpectedStatus { status: u16 },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {message}")]
    Api { message: String },
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
