//! Instance statistics: the query set, its data source, and report assembly.

use std::sync::Arc;

use chrono::Utc;

use crate::datasource::{DataSource, DataSourceError};
use crate::errors::QueryError;
use crate::models::report::AggregateReport;
use crate::services::fanout::FanOutJoin;
use crate::services::metrics;
use crate::services::report;

/// Computes the statistics report against an injected data source.
#[derive(Clone)]
pub struct StatisticsService {
    source: Arc<dyn DataSource>,
    fan_out: Arc<FanOutJoin>,
}

impl StatisticsService {
    /// The standard six-query report, excluding `system_user` from user counts.
    pub fn new(source: Arc<dyn DataSource>, system_user: &str) -> Self {
        Self {
            source,
            fan_out: Arc::new(FanOutJoin::new(metrics::standard_queries(system_user))),
        }
    }

    /// Run every query and assemble the report. Any single failure fails the whole report.
    pub async fn report(&self) -> Result<AggregateReport, QueryError> {
        let results = self.fan_out.run(Arc::clone(&self.source), Utc::now()).await?;
        Ok(report::assemble(results))
    }

    /// Check that the data source is reachable.
    pub async fn ping(&self) -> Result<(), DataSourceError> {
        self.source.ping().await
    }
}

impl std::fmt::Debug for StatisticsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsService")
            .field("fan_out", &self.fan_out)
            .finish_non_exhaustive()
    }
}
