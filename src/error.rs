use axum::http::StatusCode;
use thiserror::Error;

/// Error taxonomy for the ingestion and settlement pipeline.
///
/// Everything user-correctable carries a message safe to return to the
/// caller; `Internal` wraps storage and other unexpected failures and is
/// never shown verbatim.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The uploaded file could not be decoded into rows.
    #[error("unable to parse spreadsheet: {0}")]
    Parse(String),

    /// Upload exceeds the configured size or row-count cap.
    #[error("{0}")]
    LimitExceeded(String),

    /// Malformed or unsatisfiable request payload.
    #[error("invalid request: {0}")]
    ValidationInput(String),

    /// Settlement attempted while a leg's game is not final.
    #[error("bet {bet_id} is not ready to settle: {reason}")]
    NotReady { bet_id: i64, reason: String },

    /// Rollback refused because an imported record was mutated downstream.
    #[error("rollback blocked: {0}")]
    Rollback(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Parse(_) => StatusCode::BAD_REQUEST,
            PipelineError::LimitExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::ValidationInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotReady { .. } => StatusCode::CONFLICT,
            PipelineError::Rollback(_) => StatusCode::CONFLICT,
            PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
