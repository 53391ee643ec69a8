//! Combined statistics response.

use serde::Serialize;

use super::metric::MetricResult;

/// Top-level statistics report returned by `GET /statistics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub dashboards: MetricResult,
    pub page_views: MetricResult,
    pub revisions: MetricResult,
    pub sessions: MetricResult,
    /// User activity merged with per-editor revision metrics.
    pub users: MetricResult,
}
