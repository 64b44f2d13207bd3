//! Error and payload shapes of the HTTP API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::errors::ConsoleError;

impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "Request failed");
        }

        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        match self {
            ConsoleError::Validation(errors) => body["errors"] = json!(errors),
            ConsoleError::Transaction { errors, .. } => body["errors"] = json!(errors),
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BatchItemError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ConsoleError::validation("bad ttl").into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ConsoleError::UpstreamUnavailable("no dns".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let tx = ConsoleError::Transaction {
            message: "bulk create".into(),
            errors: vec![BatchItemError {
                index: 3,
                name: "www".into(),
                message: "duplicate".into(),
            }],
        };
        assert_eq!(tx.into_response().status(), StatusCode::CONFLICT);
    }
}
