//! Shapes joined query results into the statistics report.

use crate::models::report::AggregateReport;
use crate::services::fanout::JoinResult;
use crate::services::metrics::{
    DASHBOARD_COUNTS, PAGE_VIEW_COUNTS, REVISION_COUNTS, SESSION_COUNTS, USERS_BY_REVISIONS,
    USER_COUNTS,
};

/// Build the report from a completed join. Missing entries become empty sections.
pub fn assemble(mut results: JoinResult) -> AggregateReport {
    let mut take = |query: &str| results.take(query).unwrap_or_default();

    AggregateReport {
        dashboards: take(DASHBOARD_COUNTS),
        page_views: take(PAGE_VIEW_COUNTS),
        revisions: take(REVISION_COUNTS),
        sessions: take(SESSION_COUNTS),
        users: take(USER_COUNTS).merge(take(USERS_BY_REVISIONS)),
    }
}
