//! Route definitions for the statistics API.

pub mod health;
pub mod statistics;

use axum::{http::HeaderValue, http::Method, http::Uri, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::AppState;

/// Build the application router with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let mut cors = CorsLayer::new().allow_methods([Method::GET]);
    match state.config.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!(
                frontend_url = %state.config.frontend_url,
                error = %e,
                "Ignoring invalid FRONTEND_URL for CORS"
            );
        }
    }

    Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/statistics", get(statistics::get))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {uri}"))
}
