use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use leasekeep_core::WorkItemStatus;
use leasekeep_infra::StoreError;

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    tracing::error!(error = %err, "store query failed");
    match err {
        StoreError::NotFound(id) => json_error(StatusCode::NOT_FOUND, "not_found", format!("work item {id} not found")),
        other => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", other.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_status(s: &str) -> Result<WorkItemStatus, axum::response::Response> {
    s.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_status",
            "status must be one of: PENDING, PROCESSING, COMPLETED, FAILED",
        )
    })
}
