use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::{dto, errors, AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_reports))
        .route("/stats", get(report_stats))
        .route("/status/:status", get(reports_by_status))
        .route("/user/:owner_id", get(reports_by_owner))
}

pub async fn list_reports(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.work_items.list_all().await {
        Ok(items) => Json(dto::work_items_json(items)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn reports_by_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(status): Path<String>,
) -> axum::response::Response {
    let status = match errors::parse_status(&status) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.work_items.list_by_status(status).await {
        Ok(items) => Json(dto::work_items_json(items)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn reports_by_owner(
    Extension(services): Extension<Arc<AppServices>>,
    Path(owner_id): Path<String>,
) -> axum::response::Response {
    match services.work_items.list_by_owner(&owner_id).await {
        Ok(items) => Json(dto::work_items_json(items)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn report_stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.work_items.counts_by_status().await {
        Ok(counts) => Json(dto::StatsResponse::from(counts)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
