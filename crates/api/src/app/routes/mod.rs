use axum::{routing::get, Router};

pub mod leases;
pub mod reports;
pub mod system;

/// Router for everything under `/api`.
pub fn router() -> Router {
    Router::new()
        .nest("/reports", reports::router())
        .route("/leases", get(leases::list_leases))
}
