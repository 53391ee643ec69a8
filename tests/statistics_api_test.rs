//! Router-level tests for `GET /statistics` against in-memory data sources.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;

use usage_stats::config::AppConfig;
use usage_stats::datasource::{DataSource, DataSourceError, InMemoryDataSource};
use usage_stats::pipeline::{Collection, Document, Pipeline};
use usage_stats::routes;
use usage_stats::services::statistics::StatisticsService;
use usage_stats::AppState;

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        database_acquire_timeout_secs: 1,
        host: "127.0.0.1".to_string(),
        port: 0,
        frontend_url: "http://localhost:5173".to_string(),
        system_user: "Cyclotron".to_string(),
    }
}

fn app(source: Arc<dyn DataSource>) -> axum::Router {
    let config = test_config();
    let stats = StatisticsService::new(source, &config.system_user);
    routes::router(AppState { stats, config })
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn populated_source() -> InMemoryDataSource {
    let now = Utc::now();
    InMemoryDataSource::new()
        .with_documents(
            Collection::Dashboards,
            vec![
                Document::new().with("name", "a").with("deleted", false).with("date", now),
                Document::new()
                    .with("name", "b")
                    .with("deleted", true)
                    .with("date", now - Duration::days(40)),
                Document::new()
                    .with("name", "c")
                    .with("deleted", false)
                    .with("date", now - Duration::days(300)),
            ],
        )
        .with_documents(
            Collection::Analytics,
            vec![
                Document::new().with("uid", "u1").with("visit_id", "v1"),
                Document::new().with("uid", "u1").with("visit_id", "v2"),
            ],
        )
        .with_documents(
            Collection::Users,
            vec![
                Document::new()
                    .with("name", "alice")
                    .with("last_login", now - Duration::days(2))
                    .with("times_logged_in", 3_i64),
                Document::new()
                    .with("name", "bob")
                    .with("last_login", now - Duration::days(60))
                    .with("times_logged_in", 1_i64),
                Document::new()
                    .with("name", "Cyclotron")
                    .with("last_login", now)
                    .with("times_logged_in", 1000_i64),
            ],
        )
        .with_documents(
            Collection::Sessions,
            [now - Duration::hours(1), now + Duration::hours(1), now + Duration::hours(2)]
                .into_iter()
                .map(|expiration| Document::new().with("expiration", expiration))
                .collect(),
        )
        .with_documents(
            Collection::Revisions,
            vec![
                Document::new().with("name", "a").with("last_updated_by", "alice"),
                Document::new().with("name", "a").with("last_updated_by", "bob"),
                Document::new().with("name", "b").with("last_updated_by", "alice"),
            ],
        )
}

/// Fails every aggregation against one collection and delegates the rest.
struct FailingOn {
    inner: InMemoryDataSource,
    collection: Collection,
}

#[async_trait]
impl DataSource for FailingOn {
    async fn run_aggregation(
        &self,
        collection: Collection,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, DataSourceError> {
        if collection == self.collection {
            return Err(DataSourceError::Unavailable("injected fault".to_string()));
        }
        self.inner.run_aggregation(collection, pipeline).await
    }

    async fn ping(&self) -> Result<(), DataSourceError> {
        Err(DataSourceError::Unavailable("injected fault".to_string()))
    }
}

#[tokio::test]
async fn statistics_returns_complete_report() {
    let (status, body) = get_json(app(Arc::new(populated_source())), "/statistics").await;
    assert_eq!(status, StatusCode::OK);

    let mut keys: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, ["dashboards", "pageViews", "revisions", "sessions", "users"]);

    let dashboards = &body["dashboards"];
    assert_eq!(dashboards["total"]["count"], 3);
    assert_eq!(
        dashboards["total"]["count"].as_i64().unwrap(),
        dashboards["deletedDashboards"]["count"].as_i64().unwrap()
            + dashboards["undeletedDashboards"]["count"].as_i64().unwrap()
    );
    assert_eq!(dashboards["total"]["editedPastDayCount"], 1);
    assert_eq!(dashboards["total"]["editedPastSixMonthsCount"], 2);

    assert_eq!(body["sessions"]["activeSessions"], 2);

    assert_eq!(body["pageViews"]["totalPageViews"], 2);
    assert_eq!(body["pageViews"]["totalVisits"], 2);
    assert_eq!(body["pageViews"]["uniqueUids"], 1);
    assert_eq!(body["pageViews"]["avgVisitsPerUid"], 2.0);

    assert_eq!(body["revisions"]["dashboardCount"], 2);
    assert_eq!(body["revisions"]["count"], 3);
    assert_eq!(body["revisions"]["maxRevisionCount"], 2);

    let users = &body["users"];
    assert_eq!(users["count"], 2);
    assert_eq!(users["activePastDayCount"], 0);
    assert_eq!(users["activePastMonthCount"], 1);
    assert_eq!(users["avgLoginsPerUser"], 2.0);
    assert_eq!(users["editingUserCount"], 2);
    assert_eq!(users["avgDashboardsModifiedByUser"], 1.5);
    assert_eq!(users["avgRevisionsByUser"], 1.5);
}

#[tokio::test]
async fn statistics_on_empty_instance_has_zero_averages() {
    let (status, body) = get_json(app(Arc::new(InMemoryDataSource::new())), "/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pageViews"]["uniqueUids"], 0);
    assert_eq!(body["pageViews"]["avgPageViewsPerUid"], 0.0);
    assert_eq!(body["pageViews"]["avgPageViewsPerVisit"], 0.0);
    assert_eq!(body["revisions"]["avgRevisionCount"], 0.0);
    assert_eq!(body["users"]["avgLoginsPerUser"], 0.0);
}

#[tokio::test]
async fn single_failing_query_fails_whole_report() {
    let source = FailingOn {
        inner: populated_source(),
        collection: Collection::Sessions,
    };
    let (status, body) = get_json(app(Arc::new(source)), "/statistics").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["data"].is_null());
    assert!(body.get("dashboards").is_none());
    assert_eq!(body["error"]["code"], "QUERY_FAILED");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("sessionCounts"), "{message}");
    assert!(message.contains("injected fault"), "{message}");
}

#[tokio::test]
async fn shared_collection_failure_names_one_of_its_queries() {
    let source = FailingOn {
        inner: populated_source(),
        collection: Collection::Revisions,
    };
    let (status, body) = get_json(app(Arc::new(source)), "/statistics").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = body["error"]["message"].as_str().unwrap();
    assert!(
        message.contains("revisionCounts") || message.contains("usersByRevisions"),
        "{message}"
    );
}

#[tokio::test]
async fn readiness_reports_data_source_status() {
    let (status, body) = get_json(app(Arc::new(InMemoryDataSource::new())), "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database"], "connected");

    let failing = FailingOn {
        inner: InMemoryDataSource::new(),
        collection: Collection::Users,
    };
    let (_, body) = get_json(app(Arc::new(failing)), "/health/ready").await;
    assert!(body["data"]["database"]
        .as_str()
        .unwrap()
        .starts_with("error:"));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (status, body) = get_json(app(Arc::new(InMemoryDataSource::new())), "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}
