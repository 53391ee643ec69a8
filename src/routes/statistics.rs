//! Statistics route: aggregate usage numbers for the whole instance.

use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::models::report::AggregateReport;
use crate::AppState;

/// GET /statistics — dashboards, page views, revisions, sessions and users.
///
/// The report is all-or-nothing: if any query fails the response is a 500
/// carrying the failure detail.
pub async fn get(State(state): State<AppState>) -> Result<Json<AggregateReport>, AppError> {
    let report = state.stats.report().await?;
    Ok(Json(report))
}
