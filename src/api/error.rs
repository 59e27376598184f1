use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

use crate::attendance::AttendanceError;

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::Declined(_) => StatusCode::CONFLICT,
            AttendanceError::LocationUnavailable(_) | AttendanceError::Capture(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AttendanceError::Comparison(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AttendanceError::Forbidden(_) => StatusCode::FORBIDDEN,
            AttendanceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            AttendanceError::Declined(decline) => {
                let mut body = serde_json::to_value(decline).unwrap_or_else(|_| json!({}));
                body["reason"] = json!(decline.reason());
                body["message"] = json!(decline.to_string());
                HttpResponse::build(status).json(body)
            }
            AttendanceError::Store(e) => {
                tracing::error!(error = %e, "Attendance store failure");
                HttpResponse::build(status).json(json!({
                    "message": "Something went wrong, Contact with system admin",
                    "retryable": true
                }))
            }
            other => HttpResponse::build(status).json(json!({
                "message": other.to_string(),
                "retryable": other.is_retryable()
            })),
        }
    }
}
