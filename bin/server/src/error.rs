//! Domain error types for the HTTP API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use loomwork_workflow::EngineError;
use rootcause::Report;
use serde_json::json;
use std::fmt;

/// Errors returned to API clients as `{"error": message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request cannot be served as sent.
    BadRequest { message: String },
    /// The addressed resource does not exist.
    NotFound { message: String },
    /// Something failed on our side. The message is logged, not returned.
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest { message } => write!(f, "bad request: {message}"),
            Self::NotFound { message } => write!(f, "not found: {message}"),
            Self::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<Report<EngineError>> for ApiError {
    fn from(report: Report<EngineError>) -> Self {
        let context = report.current_context();
        let message = context.to_string();
        if context.is_client_error() {
            Self::BadRequest { message }
        } else if context.is_not_found() {
            Self::NotFound { message }
        } else {
            tracing::error!(error = %report, "engine request failed");
            Self::Internal { message }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::BadRequest { message } | Self::NotFound { message } => message.as_str(),
            Self::Internal { .. } => "internal server error",
        };
        (self.status(), Json(json!({ "error": body }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomwork_core::WorkflowInstanceId;
    use loomwork_workflow::{DefinitionError, StoreError};

    fn report(error: EngineError) -> Report<EngineError> {
        error.into()
    }

    #[test]
    fn engine_errors_map_to_status_codes() {
        let err = ApiError::from(report(EngineError::Definition(
            DefinitionError::MissingStartNode,
        )));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err,
            ApiError::bad_request("workflow definition has no start node")
        );

        let err = ApiError::from(report(EngineError::InstanceNotFound {
            workflow_id: WorkflowInstanceId::from_raw(5),
        }));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = ApiError::from(report(EngineError::Store(StoreError::Database {
            details: "connection reset".to_string(),
        })));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_details_are_not_returned() {
        let response = ApiError::Internal {
            message: "password=hunter2".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
