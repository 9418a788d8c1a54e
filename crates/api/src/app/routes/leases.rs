use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, Json};
use chrono::Utc;

use crate::app::{dto, errors, AppServices};

pub async fn list_leases(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.leases.list().await {
        Ok(leases) => {
            let now = Utc::now();
            let body: Vec<dto::LeaseResponse> = leases.into_iter().map(|l| dto::LeaseResponse::at(l, now)).collect();
            Json(body).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}
