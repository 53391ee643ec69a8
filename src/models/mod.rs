//! Response models for the statistics endpoint.

pub mod metric;
pub mod report;
