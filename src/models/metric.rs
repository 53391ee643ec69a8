//! Numeric summaries produced by a single statistics query.

use std::collections::BTreeMap;

use serde::Serialize;

/// A number or a nested summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Nested(MetricResult),
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Integer(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<MetricResult> for MetricValue {
    fn from(v: MetricResult) -> Self {
        MetricValue::Nested(v)
    }
}

/// Mapping from field name to metric value. Keys serialize in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricResult(BTreeMap<String, MetricValue>);

impl MetricResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<MetricValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Integer at `key`, if present and integral.
    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            MetricValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Float at `key`, if present and numeric.
    pub fn float(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            MetricValue::Float(f) => Some(*f),
            MetricValue::Integer(i) => Some(*i as f64),
            MetricValue::Nested(_) => None,
        }
    }

    /// Nested summary at `key`, if present.
    pub fn nested(&self, key: &str) -> Option<&MetricResult> {
        match self.0.get(key)? {
            MetricValue::Nested(m) => Some(m),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deep key-wise union. On collision `other` wins, except that two nested
    /// summaries are merged recursively.
    pub fn merge(mut self, other: MetricResult) -> MetricResult {
        for (key, incoming) in other.0 {
            let merged = match (self.0.remove(&key), incoming) {
                (Some(MetricValue::Nested(left)), MetricValue::Nested(right)) => {
                    MetricValue::Nested(left.merge(right))
                }
                (_, right) => right,
            };
            self.0.insert(key, merged);
        }
        self
    }
}

/// Division that reports 0.0 instead of NaN or infinity for a zero denominator.
pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
