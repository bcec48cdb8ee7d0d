// src/errors.rs

use crate::models::{InvalidPeriod, PeriodKey, SettlementStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// A transition the record's current status does not allow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("settlement is already frozen")]
    AlreadyFrozen,

    #[error("settlement is already paid")]
    AlreadyPaid,

    #[error("settlement must be frozen before it can be paid (currently {status})")]
    NotFrozen { status: SettlementStatus },

    #[error("settlement is {status}; computed and manual fields are locked")]
    Locked { status: SettlementStatus },
}

/// A worker's earnings could not be computed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("arithmetic overflow while computing {context}")]
    Overflow { context: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Auth errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid token")]
    InvalidToken,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // Business logic errors
    #[error("Settlement for worker {worker_id} in {period} rejected: {source}")]
    Lifecycle {
        worker_id: Uuid,
        period: PeriodKey,
        source: LifecycleError,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn lifecycle(worker_id: Uuid, period: PeriodKey, source: LifecycleError) -> Self {
        AppError::Lifecycle {
            worker_id,
            period,
            source,
        }
    }

    /// Failures worth retrying later rather than surfacing as final.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Unavailable(_) | AppError::Conflict(_)
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Lifecycle { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<InvalidPeriod> for AppError {
    fn from(err: InvalidPeriod) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

// Convenience alias
pub type AppResult<T> = Result<T, AppError>;
