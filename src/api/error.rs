use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::error_response;

/// A rejected plan request. Messages name the offending flag so the same
/// text reads well on the command line and in the JSON error body.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("{field} must be > 0")]
    NotPositive { field: String },

    #[error("{field} must be >= 0")]
    Negative { field: String },

    #[error("{field} must be between 0 and 20 percent")]
    RateOutOfRange { field: String },

    #[error("--current-age must be between {min} and {max}")]
    CurrentAge { min: u32, max: u32 },

    #[error("--retirement-age must be > --current-age")]
    AgeOrder,

    #[error("--retirement-age must be at most {max}")]
    RetirementAge { max: u32 },

    #[error("--preservation-years must be one of 10, 15, 20 or 25 when preserving capital, got {0}")]
    PreservationPeriod(u32),

    #[error("at least one --provision is required")]
    NoProvisions,

    #[error("at most {max} provisions are supported")]
    TooManyProvisions { max: usize },

    #[error("invalid provision `{spec}`: {reason}")]
    MalformedProvision { spec: String, reason: String },

    #[error("Invalid API JSON payload: {0}")]
    Json(String),

    #[error("Invalid query string: {0}")]
    Query(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("failed to serialize plan: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IntoResponse for InputError {
    fn into_response(self) -> Response {
        error_response(StatusCode::BAD_REQUEST, &self.to_string())
    }
}
