//! Error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotError>;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Risk limit: {0}")]
    RiskLimit(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("No open position for {0}")]
    PositionNotFound(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for BotError {
    fn from(e: config::ConfigError) -> Self {
        BotError::Config(e.to_string())
    }
}

impl From<csv::Error> for BotError {
    fn from(e: csv::Error) -> Self {
        BotError::Csv(e.to_string())
    }
}

impl BotError {
    /// Errors raised by risk rules rather than by infrastructure
    pub fn is_risk_rejection(&self) -> bool {
        matches!(self, BotError::RiskLimit(_))
    }
}
