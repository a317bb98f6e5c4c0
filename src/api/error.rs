use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::application::LedgerError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            LedgerError::WalletNotFound(_) => {
                json_error(StatusCode::NOT_FOUND, "not_found", message)
            }
            LedgerError::InvalidAmount(_) => {
                json_error(StatusCode::BAD_REQUEST, "invalid_amount", message)
            }
            LedgerError::InsufficientBalance { balance, .. } => (
                StatusCode::BAD_REQUEST,
                axum::Json(json!({
                    "error": "insufficient_balance",
                    "message": message,
                    "current_balance": balance,
                })),
            )
                .into_response(),
            LedgerError::SameWalletTransfer(_) => {
                json_error(StatusCode::BAD_REQUEST, "same_wallet_transfer", message)
            }
            LedgerError::InvalidYear(_) => {
                json_error(StatusCode::BAD_REQUEST, "invalid_year", message)
            }
            LedgerError::LockTimeout(_) => {
                json_error(StatusCode::SERVICE_UNAVAILABLE, "lock_timeout", message)
            }
            LedgerError::Aborted(err) => {
                error!(error = ?err, "ledger operation aborted");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "aborted", "operation aborted")
            }
        }
    }
}

/// Handler error: a ledger failure, or a request axum could not extract.
#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    InvalidRequest(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Ledger(err) => err.into_response(),
            ApiError::InvalidRequest(message) => {
                json_error(StatusCode::BAD_REQUEST, "invalid_request", message)
            }
        }
    }
}
