pub mod config;
pub mod datasource;
pub mod db;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;

use services::statistics::StatisticsService;

/// Shared application state passed to all Axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub stats: StatisticsService,
    pub config: config::AppConfig,
}
