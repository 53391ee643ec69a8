//! The statistics queries. Each one reads through a [`DataSource`] and reduces
//! its pipeline output to a [`MetricResult`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, Utc};

use crate::datasource::{DataSource, DataSourceError};
use crate::models::metric::{safe_divide, MetricResult};
use crate::pipeline::{Accumulator, Collection, Derived, Document, Group, Pipeline, Predicate};

pub const DASHBOARD_COUNTS: &str = "dashboardCounts";
pub const PAGE_VIEW_COUNTS: &str = "pageViewCounts";
pub const USER_COUNTS: &str = "userCounts";
pub const SESSION_COUNTS: &str = "sessionCounts";
pub const REVISION_COUNTS: &str = "revisionCounts";
pub const USERS_BY_REVISIONS: &str = "usersByRevisions";

/// Name of the built-in service account excluded from user statistics.
pub const DEFAULT_SYSTEM_USER: &str = "Cyclotron";

/// A named, independent, read-only statistics computation.
#[async_trait]
pub trait MetricQuery: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compute the summary. `now` is the reference instant for every
    /// time-window comparison.
    async fn execute(
        &self,
        source: &dyn DataSource,
        now: DateTime<Utc>,
    ) -> Result<MetricResult, DataSourceError>;
}

/// The six queries behind the statistics report.
pub fn standard_queries(system_user: &str) -> Vec<Arc<dyn MetricQuery>> {
    vec![
        Arc::new(DashboardCounts),
        Arc::new(PageViewCounts),
        Arc::new(UserCounts::new(system_user)),
        Arc::new(SessionCounts),
        Arc::new(UsersByRevisions),
        Arc::new(RevisionCounts),
    ]
}

/// Cut-off instants for the "past day / month / six months" windows.
#[derive(Debug, Clone, Copy)]
struct Windows {
    past_day: DateTime<Utc>,
    past_month: DateTime<Utc>,
    past_six_months: DateTime<Utc>,
}

impl Windows {
    fn ending_at(now: DateTime<Utc>) -> Self {
        Self {
            past_day: now - Duration::days(1),
            past_month: months_before(now, 1, 30),
            past_six_months: months_before(now, 6, 182),
        }
    }

    /// Three 0/1 flags telling whether `field` falls inside each window.
    fn flags(&self, field: &str, prefix: &str) -> Vec<(String, Derived)> {
        [
            ("PastDay", self.past_day),
            ("PastMonth", self.past_month),
            ("PastSixMonths", self.past_six_months),
        ]
        .into_iter()
        .map(|(suffix, cutoff)| {
            (
                format!("{prefix}{suffix}"),
                Derived::Flag(Predicate::gt(field, cutoff)),
            )
        })
        .collect()
    }
}

fn months_before(now: DateTime<Utc>, months: u32, fallback_days: i64) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or_else(|| now - Duration::days(fallback_days))
}

/// The single record of a global group, or an empty one when the input was empty.
fn summary(docs: Vec<Document>) -> Document {
    docs.into_iter().next().unwrap_or_default()
}

/// Attach window-flag counts (`{prefix}PastDayCount` and friends) to a group.
fn count_flags(group: Group, prefix: &str) -> Group {
    ["PastDay", "PastMonth", "PastSixMonths"]
        .into_iter()
        .fold(group, |group, suffix| {
            group.accumulate(
                &format!("{prefix}{suffix}Count"),
                Accumulator::sum(&format!("{prefix}{suffix}")),
            )
        })
}

fn flag_counts(doc: &Document, prefix: &str, result: MetricResult) -> MetricResult {
    ["PastDay", "PastMonth", "PastSixMonths"]
        .into_iter()
        .fold(result, |result, suffix| {
            let key = format!("{prefix}{suffix}Count");
            let value = doc.int_or_zero(&key);
            result.with(&key, value)
        })
}

/// Total, deleted and undeleted dashboard counts with edit recency.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardCounts;

impl DashboardCounts {
    fn pipeline(deleted: Option<bool>, windows: &Windows) -> Pipeline {
        Pipeline::new()
            .filter_opt(deleted.map(|d| Predicate::eq("deleted", d)))
            .project(windows.flags("date", "edited"))
            .group(count_flags(
                Group::global().accumulate("count", Accumulator::Count),
                "edited",
            ))
    }

    async fn counts(
        source: &dyn DataSource,
        deleted: Option<bool>,
        windows: &Windows,
    ) -> Result<MetricResult, DataSourceError> {
        let pipeline = Self::pipeline(deleted, windows);
        let doc = summary(source.run_aggregation(Collection::Dashboards, &pipeline).await?);
        let result = MetricResult::new().with("count", doc.int_or_zero("count"));
        Ok(flag_counts(&doc, "edited", result))
    }
}

#[async_trait]
impl MetricQuery for DashboardCounts {
    fn name(&self) -> &'static str {
        DASHBOARD_COUNTS
    }

    async fn execute(
        &self,
        source: &dyn DataSource,
        now: DateTime<Utc>,
    ) -> Result<MetricResult, DataSourceError> {
        let windows = Windows::ending_at(now);
        let (total, deleted, undeleted) = tokio::try_join!(
            Self::counts(source, None, &windows),
            Self::counts(source, Some(true), &windows),
            Self::counts(source, Some(false), &windows),
        )?;

        Ok(MetricResult::new()
            .with("total", total)
            .with("deletedDashboards", deleted)
            .with("undeletedDashboards", undeleted))
    }
}

/// Page views, visits and unique visitors from the analytics log.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageViewCounts;

#[async_trait]
impl MetricQuery for PageViewCounts {
    fn name(&self) -> &'static str {
        PAGE_VIEW_COUNTS
    }

    async fn execute(
        &self,
        source: &dyn DataSource,
        _now: DateTime<Utc>,
    ) -> Result<MetricResult, DataSourceError> {
        let pipeline = Pipeline::new()
            .group(Group::by(&["uid", "visit_id"]).accumulate("totalPageViews", Accumulator::Count))
            .group(
                Group::by(&["uid"])
                    .accumulate("totalPageViews", Accumulator::sum("totalPageViews"))
                    .accumulate("totalVisits", Accumulator::Count),
            )
            .group(
                Group::global()
                    .accumulate("totalPageViews", Accumulator::sum("totalPageViews"))
                    .accumulate("totalVisits", Accumulator::sum("totalVisits"))
                    .accumulate("uniqueUids", Accumulator::Count),
            );

        let doc = summary(source.run_aggregation(Collection::Analytics, &pipeline).await?);
        let page_views = doc.int_or_zero("totalPageViews");
        let visits = doc.int_or_zero("totalVisits");
        let uids = doc.int_or_zero("uniqueUids");

        Ok(MetricResult::new()
            .with("totalPageViews", page_views)
            .with("totalVisits", visits)
            .with("uniqueUids", uids)
            .with("avgPageViewsPerUid", safe_divide(page_views as f64, uids as f64))
            .with("avgVisitsPerUid", safe_divide(visits as f64, uids as f64))
            .with("avgPageViewsPerVisit", safe_divide(page_views as f64, visits as f64)))
    }
}

/// User totals, login recency and login frequency.
#[derive(Debug, Clone)]
pub struct UserCounts {
    system_user: String,
}

impl UserCounts {
    /// `system_user` names the service account left out of every count.
    pub fn new(system_user: &str) -> Self {
        Self {
            system_user: system_user.to_string(),
        }
    }
}

impl Default for UserCounts {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_USER)
    }
}

#[async_trait]
impl MetricQuery for UserCounts {
    fn name(&self) -> &'static str {
        USER_COUNTS
    }

    async fn execute(
        &self,
        source: &dyn DataSource,
        now: DateTime<Utc>,
    ) -> Result<MetricResult, DataSourceError> {
        let mut fields = vec![(
            "times_logged_in".to_string(),
            Derived::Field("times_logged_in".to_string()),
        )];
        fields.extend(Windows::ending_at(now).flags("last_login", "active"));

        let pipeline = Pipeline::new()
            .filter(Predicate::ne("name", self.system_user.as_str()))
            .project(fields)
            .group(count_flags(
                Group::global()
                    .accumulate("count", Accumulator::Count)
                    .accumulate("avgLoginsPerUser", Accumulator::avg("times_logged_in")),
                "active",
            ));

        let doc = summary(source.run_aggregation(Collection::Users, &pipeline).await?);
        let result = MetricResult::new()
            .with("count", doc.int_or_zero("count"))
            .with("avgLoginsPerUser", doc.float_or_zero("avgLoginsPerUser"));
        Ok(flag_counts(&doc, "active", result))
    }
}

/// Sessions that have not yet expired.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCounts;

#[async_trait]
impl MetricQuery for SessionCounts {
    fn name(&self) -> &'static str {
        SESSION_COUNTS
    }

    async fn execute(
        &self,
        source: &dyn DataSource,
        now: DateTime<Utc>,
    ) -> Result<MetricResult, DataSourceError> {
        let pipeline = Pipeline::new()
            .filter(Predicate::gt("expiration", now))
            .group(Group::global().accumulate("activeSessions", Accumulator::Count));

        let doc = summary(source.run_aggregation(Collection::Sessions, &pipeline).await?);
        Ok(MetricResult::new().with("activeSessions", doc.int_or_zero("activeSessions")))
    }
}

/// Revision volume per dashboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionCounts;

#[async_trait]
impl MetricQuery for RevisionCounts {
    fn name(&self) -> &'static str {
        REVISION_COUNTS
    }

    async fn execute(
        &self,
        source: &dyn DataSource,
        _now: DateTime<Utc>,
    ) -> Result<MetricResult, DataSourceError> {
        let pipeline = Pipeline::new()
            .group(Group::by(&["name"]).accumulate("revisionCount", Accumulator::Count))
            .group(
                Group::global()
                    .accumulate("dashboardCount", Accumulator::Count)
                    .accumulate("count", Accumulator::sum("revisionCount"))
                    .accumulate("avgRevisionCount", Accumulator::avg("revisionCount"))
                    .accumulate("maxRevisionCount", Accumulator::max("revisionCount")),
            );

        let doc = summary(source.run_aggregation(Collection::Revisions, &pipeline).await?);
        Ok(MetricResult::new()
            .with("dashboardCount", doc.int_or_zero("dashboardCount"))
            .with("count", doc.int_or_zero("count"))
            .with("avgRevisionCount", doc.float_or_zero("avgRevisionCount"))
            .with("maxRevisionCount", doc.int_or_zero("maxRevisionCount")))
    }
}

/// How many users edit dashboards, and how much.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsersByRevisions;

#[async_trait]
impl MetricQuery for UsersByRevisions {
    fn name(&self) -> &'static str {
        USERS_BY_REVISIONS
    }

    async fn execute(
        &self,
        source: &dyn DataSource,
        _now: DateTime<Utc>,
    ) -> Result<MetricResult, DataSourceError> {
        let pipeline = Pipeline::new()
            .filter(Predicate::not_null("last_updated_by"))
            .project(vec![
                ("name", Derived::Field("name".to_string())),
                ("last_updated_by", Derived::Field("last_updated_by".to_string())),
            ])
            .group(
                Group::by(&["name", "last_updated_by"])
                    .accumulate("revisionCount", Accumulator::Count),
            )
            .group(
                Group::by(&["last_updated_by"])
                    .accumulate("dashboardCount", Accumulator::Count)
                    .accumulate("revisionCount", Accumulator::sum("revisionCount")),
            )
            .group(
                Group::global()
                    .accumulate("avgDashboardsModifiedByUser", Accumulator::avg("dashboardCount"))
                    .accumulate("avgRevisionsByUser", Accumulator::avg("revisionCount"))
                    .accumulate("editingUserCount", Accumulator::Count),
            );

        let doc = summary(source.run_aggregation(Collection::Revisions, &pipeline).await?);
        Ok(MetricResult::new()
            .with("avgDashboardsModifiedByUser", doc.float_or_zero("avgDashboardsModifiedByUser"))
            .with("avgRevisionsByUser", doc.float_or_zero("avgRevisionsByUser"))
            .with("editingUserCount", doc.int_or_zero("editingUserCount")))
    }
}
