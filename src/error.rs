use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("The draft has already started.")]
    AlreadyStarted,

    #[error("The draft is not active.")]
    SessionNotActive,

    #[error("It is not your team's turn.")]
    NotYourTurn,

    #[error("Hero {0} is not available.")]
    HeroUnavailable(i64),

    #[error("The draft configuration is locked once the draft starts.")]
    ConfigLocked,

    #[error("Invalid draft configuration: {0}")]
    InvalidConfig(String),

    #[error("Not every seated participant is ready.")]
    NotReady,

    #[error("{0} was not found.")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(String),

    /// More turns were due than heroes exist. Start-time validation should
    /// make this unreachable.
    #[error("No heroes left to resolve turn {0}.")]
    RosterExhausted(usize),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type DraftResult<T> = Result<T, DraftError>;

impl DraftError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            DraftError::AlreadyStarted => (StatusCode::CONFLICT, "ALREADY_STARTED"),
            DraftError::SessionNotActive => (StatusCode::CONFLICT, "SESSION_NOT_ACTIVE"),
            DraftError::NotYourTurn => (StatusCode::FORBIDDEN, "NOT_YOUR_TURN"),
            DraftError::HeroUnavailable(_) => (StatusCode::CONFLICT, "HERO_UNAVAILABLE"),
            DraftError::ConfigLocked => (StatusCode::CONFLICT, "CONFIG_LOCKED"),
            DraftError::InvalidConfig(_) => (StatusCode::BAD_REQUEST, "INVALID_CONFIG"),
            DraftError::NotReady => (StatusCode::CONFLICT, "NOT_READY"),
            DraftError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            DraftError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            DraftError::RosterExhausted(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            DraftError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for DraftError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Draft request failed: {}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}
