//! Data-source abstraction the metric queries read through.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::pipeline::{Collection, Document, Pipeline};

pub use memory::InMemoryDataSource;
pub use postgres::PgDataSource;

/// Errors raised while running a pipeline against a data source.
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Unsupported column type {type_name} for column {column}")]
    UnsupportedType { column: String, type_name: String },

    #[error("Data source unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to the statistics collections.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Run `pipeline` over `collection` and return the resulting records.
    async fn run_aggregation(
        &self,
        collection: Collection,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, DataSourceError>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), DataSourceError> {
        Ok(())
    }
}
