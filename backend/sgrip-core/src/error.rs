// src/error.rs
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use crate::grid::EntryError;
use crate::imputation::WeekError;
use crate::report::ReportError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing x-employee-id header")]
    MissingIdentity,
    #[error("Invalid x-employee-id header: {0}")]
    InvalidIdentity(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Week(#[from] WeekError),
    #[error("Report rendering failed: {0}")]
    Report(#[from] ReportError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingIdentity | AppError::InvalidIdentity(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) | AppError::Week(_) => StatusCode::BAD_REQUEST,
            AppError::Store(e) => match e {
                StoreError::UnknownActor(_) => StatusCode::UNAUTHORIZED,
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Forbidden(_) => StatusCode::FORBIDDEN,
                StoreError::Entry(EntryError::Locked(_)) | StoreError::Transition(_) => {
                    StatusCode::CONFLICT
                }
                StoreError::Entry(_)
                | StoreError::Week(_)
                | StoreError::NoTeam(_)
                | StoreError::InvalidRange { .. }
                | StoreError::InvalidMonth { .. } => StatusCode::BAD_REQUEST,
                StoreError::Io(_) | StoreError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Report(_) | AppError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error. Check logs.".to_string()
        } else {
            warn!("Request refused ({}): {}", status.as_u16(), self);
            self.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
