use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("user {0} has exceeded the LLM token budget for this month")]
    BudgetExceeded(i64),

    #[error("invalid start date {date} for period type {period}")]
    InvalidStartDate {
        date: chrono::NaiveDate,
        period: crate::Period,
    },

    #[error("period type {0} is not supported")]
    UnsupportedPeriod(crate::Period),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}
