//! Runs a fixed set of metric queries concurrently and joins them all-or-nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::task::{Id, JoinSet};

use crate::datasource::DataSource;
use crate::errors::QueryError;
use crate::models::metric::MetricResult;
use crate::services::metrics::MetricQuery;

/// Every query's result, keyed by query name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinResult {
    results: HashMap<&'static str, MetricResult>,
}

impl JoinResult {
    /// Remove and return the result of `query`.
    pub fn take(&mut self, query: &str) -> Option<MetricResult> {
        self.results.remove(query)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

#[cfg(test)]
impl JoinResult {
    fn get(&self, query: &str) -> Option<&MetricResult> {
        self.results.get(query)
    }

    fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl FromIterator<(&'static str, MetricResult)> for JoinResult {
    fn from_iter<I: IntoIterator<Item = (&'static str, MetricResult)>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

/// A fixed set of independent queries executed as one unit.
pub struct FanOutJoin {
    queries: Vec<Arc<dyn MetricQuery>>,
}

impl FanOutJoin {
    pub fn new(queries: Vec<Arc<dyn MetricQuery>>) -> Self {
        Self { queries }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.queries.iter().map(|q| q.name())
    }

    /// Spawn every query, then wait for all of them.
    ///
    /// Returns the first failure observed; the queries still running at that
    /// point are aborted and their results discarded.
    pub async fn run(
        &self,
        source: Arc<dyn DataSource>,
        now: DateTime<Utc>,
    ) -> Result<JoinResult, QueryError> {
        let started = Instant::now();
        let mut tasks = JoinSet::new();
        let mut names: HashMap<Id, &'static str> = HashMap::with_capacity(self.queries.len());

        for query in &self.queries {
            let query = Arc::clone(query);
            let source = Arc::clone(&source);
            let name = query.name();
            let handle = tasks.spawn(async move { query.execute(source.as_ref(), now).await });
            names.insert(handle.id(), name);
        }
        tracing::debug!(queries = names.len(), "Statistics queries dispatched");

        let name_of = |id: &Id| names.get(id).copied().unwrap_or("unknown");
        let mut results = HashMap::with_capacity(names.len());

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, Ok(result))) => {
                    results.insert(name_of(&id), result);
                }
                Ok((id, Err(cause))) => {
                    tasks.abort_all();
                    return Err(QueryError::Failed {
                        query: name_of(&id),
                        cause,
                    });
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(QueryError::Crashed {
                        query: name_of(&e.id()),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let joined = JoinResult { results };
        tracing::debug!(
            queries = joined.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Statistics queries joined"
        );
        Ok(joined)
    }
}

impl std::fmt::Debug for FanOutJoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutJoin")
            .field("queries", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
