//! Business logic services.

pub mod fanout;
pub mod metrics;
pub mod report;
pub mod statistics;
