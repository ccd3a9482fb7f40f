use thiserror::Error;

/// Validation and contract errors exposed by `propdata-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameters: {}", fields.join(", "))]
    MissingParameters { fields: Vec<&'static str> },

    #[error("field '{field}' must not be blank")]
    BlankField { field: &'static str },

    #[error("bedrooms must be between 0 and {max}, got {value}")]
    InvalidBedrooms { value: i64, max: i64 },

    #[error("period must be between 1 and {max} months, got {value}")]
    InvalidPeriod { value: i64, max: i64 },

    #[error("rollout percentage must be within 0..=100, got {value}")]
    InvalidPercentage { value: i64 },

    #[error("unknown facet '{value}'")]
    UnknownFacet { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("circuit name cannot be empty")]
    EmptyCircuitName,

    #[error("breaker setting '{field}' must be greater than zero")]
    NonPositiveBreakerSetting { field: &'static str },

    #[error("invalid value '{value}' for {name}")]
    InvalidSetting { name: String, value: String },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] propdata_store::StoreError),

    #[error("background task failed: {0}")]
    Task(String),
}
