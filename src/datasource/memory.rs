//! In-process pipeline evaluator over plain documents.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;

use super::{DataSource, DataSourceError};
use crate::pipeline::{Accumulator, Collection, Derived, Document, Group, Pipeline, Predicate, Stage, Value};

/// Data source backed by documents held in memory.
///
/// A global group over an empty input yields no record, matching document-store
/// semantics.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataSource {
    collections: HashMap<Collection, Vec<Document>>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append of records to `collection`.
    pub fn with_documents(mut self, collection: Collection, documents: Vec<Document>) -> Self {
        self.collections.entry(collection).or_default().extend(documents);
        self
    }

    fn documents(&self, collection: Collection) -> &[Document] {
        self.collections
            .get(&collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[async_trait]
impl DataSource for InMemoryDataSource {
    async fn run_aggregation(
        &self,
        collection: Collection,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, DataSourceError> {
        evaluate(self.documents(collection).to_vec(), pipeline)
    }
}

/// Apply every stage of `pipeline` to `documents` in order.
pub fn evaluate(documents: Vec<Document>, pipeline: &Pipeline) -> Result<Vec<Document>, DataSourceError> {
    pipeline
        .stages()
        .iter()
        .try_fold(documents, |docs, stage| match stage {
            Stage::Match(predicate) => Ok(docs.into_iter().filter(|d| matches(d, predicate)).collect()),
            Stage::Project(fields) => Ok(docs.iter().map(|d| project(d, fields)).collect()),
            Stage::Group(group) => group_by(&docs, group),
        })
}

fn matches(doc: &Document, predicate: &Predicate) -> bool {
    let value = doc.get(predicate.field());
    match predicate {
        Predicate::Eq(_, expected) => value == expected,
        Predicate::Ne(_, expected) => value != expected,
        Predicate::Gt(_, bound) => compare(value, bound) == Some(Ordering::Greater),
        Predicate::NotNull(_) => !value.is_null(),
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn project(doc: &Document, fields: &[(String, Derived)]) -> Document {
    let mut out = Document::new();
    for (name, derived) in fields {
        let value = match derived {
            Derived::Field(source) => doc.get(source).clone(),
            Derived::Flag(predicate) => Value::Int(i64::from(matches(doc, predicate))),
        };
        out.insert(name, value);
    }
    out
}

fn group_by(docs: &[Document], group: &Group) -> Result<Vec<Document>, DataSourceError> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<(Vec<Value>, Vec<&Document>)> = Vec::new();

    for doc in docs {
        let key: Vec<Value> = group.keys.iter().map(|(_, field)| doc.get(field).clone()).collect();
        let encoded = serde_json::to_string(&key)
            .map_err(|e| DataSourceError::InvalidPipeline(format!("unhashable group key: {e}")))?;
        let slot = *index.entry(encoded).or_insert_with(|| {
            buckets.push((key, Vec::new()));
            buckets.len() - 1
        });
        buckets[slot].1.push(doc);
    }

    Ok(buckets
        .into_iter()
        .map(|(key, members)| {
            let mut out = Document::new();
            for ((alias, _), value) in group.keys.iter().zip(key) {
                out.insert(alias, value);
            }
            for (name, accumulator) in &group.accumulators {
                out.insert(name, accumulate(&members, accumulator));
            }
            out
        })
        .collect())
}

fn accumulate(members: &[&Document], accumulator: &Accumulator) -> Value {
    let numbers = |field: &str| -> Vec<Value> {
        members
            .iter()
            .map(|d| d.get(field).clone())
            .filter(|v| v.as_f64().is_some())
            .collect()
    };

    match accumulator {
        Accumulator::Count => Value::Int(members.len() as i64),
        Accumulator::Sum(field) => {
            let values = numbers(field);
            if values.iter().all(|v| matches!(v, Value::Int(_))) {
                Value::Int(values.iter().map(|v| if let Value::Int(i) = v { *i } else { 0 }).sum())
            } else {
                Value::Float(values.iter().filter_map(Value::as_f64).sum())
            }
        }
        Accumulator::Avg(field) => {
            let values = numbers(field);
            if values.is_empty() {
                Value::Null
            } else {
                let total: f64 = values.iter().filter_map(Value::as_f64).sum();
                Value::Float(total / values.len() as f64)
            }
        }
        Accumulator::Max(field) => numbers(field)
            .into_iter()
            .max_by(|a, b| compare(a, b).unwrap_or(Ordering::Equal))
            .unwrap_or(Value::Null),
    }
}
