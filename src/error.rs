use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("no report has been produced yet")]
    NoReport,

    #[error("report {0} not found")]
    ReportNotFound(i64),

    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid record payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Session(SessionError::RunInProgress) => StatusCode::CONFLICT,
            AppError::Session(SessionError::NoRecords)
            | AppError::InvalidDate(_)
            | AppError::Payload(_) => StatusCode::BAD_REQUEST,
            AppError::NoReport | AppError::ReportNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {:?}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
