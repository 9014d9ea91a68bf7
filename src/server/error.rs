//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`batchforge_common::Error`] so that route
//! handlers can return `Result<T, AppError>` and use `?` on coordinator calls.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use batchforge_common::Error;
use serde_json::json;

use crate::conversion::RunReport;

/// Wrapper so we can implement `IntoResponse` for an external type.
pub struct AppError {
    inner: Error,
    report: Option<RunReport>,
}

impl AppError {
    pub fn new(inner: Error) -> Self {
        Self {
            inner,
            report: None,
        }
    }

    /// Attach the report of the run that produced this error.
    pub fn with_report(mut self, report: RunReport) -> Self {
        self.report = Some(report);
        self
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.inner.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let mut body = json!({
            "error": self.inner.to_string(),
            "code": self.inner.code(),
        });
        if let Some(report) = self.report {
            body["report"] = serde_json::to_value(report).unwrap_or_default();
        }

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::path::PathBuf;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_produces_400() {
        let response = AppError::new(Error::validation("batch size must be at least 1")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "validation_error");
        assert!(body.get("report").is_none());
    }

    #[tokio::test]
    async fn run_in_progress_produces_409() {
        let err = Error::RunInProgress {
            input: PathBuf::from("in"),
            output: PathBuf::from("out"),
        };
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn directory_unreadable_produces_500() {
        let err = Error::DirectoryUnreadable {
            path: PathBuf::from("/missing"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "directory_unreadable");
    }
}
