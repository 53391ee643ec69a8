//! Declarative aggregation pipelines: filter, project and group-and-reduce stages.
//!
//! A [`Pipeline`] describes *what* to compute over a collection. Each
//! [`DataSource`](crate::datasource::DataSource) decides how to run it: the
//! PostgreSQL source compiles it into nested subqueries, the in-memory source
//! evaluates it directly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single field value inside a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A record read from or produced by a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Document(BTreeMap<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    /// Field lookup. Missing fields read as `Null`.
    pub fn get(&self, field: &str) -> &Value {
        self.0.get(field).unwrap_or(&Value::Null)
    }

    /// Integer field, treating null or missing as zero.
    pub fn int_or_zero(&self, field: &str) -> i64 {
        match self.get(field) {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            _ => 0,
        }
    }

    /// Float field, treating null or missing as zero.
    pub fn float_or_zero(&self, field: &str) -> f64 {
        self.get(field).as_f64().unwrap_or(0.0)
    }
}

/// Named record collections the statistics are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Dashboards,
    Analytics,
    Users,
    Sessions,
    Revisions,
}

impl Collection {
    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Dashboards => "dashboards",
            Collection::Analytics => "analytics",
            Collection::Users => "users",
            Collection::Sessions => "sessions",
            Collection::Revisions => "revisions",
        }
    }
}

/// Record filter used by `Match` stages and projected flags.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    /// Null or missing fields count as "not equal".
    Ne(String, Value),
    /// Strictly greater; null never matches.
    Gt(String, Value),
    NotNull(String),
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Eq(field.to_string(), value.into())
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Ne(field.to_string(), value.into())
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Gt(field.to_string(), value.into())
    }

    pub fn not_null(field: &str) -> Self {
        Predicate::NotNull(field.to_string())
    }

    pub fn field(&self) -> &str {
        match self {
            Predicate::Eq(f, _) | Predicate::Ne(f, _) | Predicate::Gt(f, _) => f,
            Predicate::NotNull(f) => f,
        }
    }
}

/// Expression for a projected field.
#[derive(Debug, Clone, PartialEq)]
pub enum Derived {
    /// Copy a field from the input record.
    Field(String),
    /// 1 when the predicate holds, 0 otherwise.
    Flag(Predicate),
}

/// Reduction applied to each group.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Count,
    /// Integer sum; non-numeric values are ignored and an empty group sums to 0.
    /// Float input yields a float total, which `Document::int_or_zero` truncates.
    Sum(String),
    /// Arithmetic mean of numeric values; `Null` when there are none.
    Avg(String),
    /// Largest numeric value; `Null` when there are none.
    Max(String),
}

impl Accumulator {
    pub fn sum(field: &str) -> Self {
        Accumulator::Sum(field.to_string())
    }

    pub fn avg(field: &str) -> Self {
        Accumulator::Avg(field.to_string())
    }

    pub fn max(field: &str) -> Self {
        Accumulator::Max(field.to_string())
    }
}

/// Grouping stage: one output record per distinct key tuple.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Group {
    /// `(output alias, input field)` pairs. Empty means one global group.
    pub keys: Vec<(String, String)>,
    pub accumulators: Vec<(String, Accumulator)>,
}

impl Group {
    /// A group with no keys, reducing every record into one.
    pub fn global() -> Self {
        Self::default()
    }

    pub fn by(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(|k| (k.to_string(), k.to_string())).collect(),
            accumulators: Vec::new(),
        }
    }

    pub fn accumulate(mut self, name: &str, accumulator: Accumulator) -> Self {
        self.accumulators.push((name.to_string(), accumulator));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Predicate),
    Project(Vec<(String, Derived)>),
    Group(Group),
}

/// Ordered sequence of stages applied to one collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.stages.push(Stage::Match(predicate));
        self
    }

    /// Optional filter; `None` leaves the pipeline unchanged.
    pub fn filter_opt(self, predicate: Option<Predicate>) -> Self {
        match predicate {
            Some(p) => self.filter(p),
            None => self,
        }
    }

    pub fn project<S: Into<String>>(mut self, fields: impl IntoIterator<Item = (S, Derived)>) -> Self {
        let fields = fields
            .into_iter()
            .map(|(name, derived)| (name.into(), derived))
            .collect();
        self.stages.push(Stage::Project(fields));
        self
    }

    pub fn group(mut self, group: Group) -> Self {
        self.stages.push(Stage::Group(group));
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_reads_as_null() {
        let doc = Document::new().with("count", 3_i64);
        assert_eq!(doc.get("count"), &Value::Int(3));
        assert!(doc.get("absent").is_null());
        assert_eq!(doc.int_or_zero("absent"), 0);
        assert_eq!(doc.float_or_zero("count"), 3.0);
    }

    #[test]
    fn option_converts_to_null() {
        let v: Value = Option::<i64>::None.into();
        assert!(v.is_null());
        let v: Value = Some("alice").into();
        assert_eq!(v, Value::Text("alice".to_string()));
    }

    #[test]
    fn filter_opt_skips_none() {
        let pipeline = Pipeline::new()
            .filter_opt(None)
            .group(Group::global().accumulate("count", Accumulator::Count));
        assert_eq!(pipeline.stages().len(), 1);

        let pipeline = Pipeline::new().filter_opt(Some(Predicate::eq("deleted", true)));
        assert!(matches!(pipeline.stages()[0], Stage::Match(_)));
    }

    #[test]
    fn group_by_uses_field_as_alias() {
        let group = Group::by(&["uid", "visit_id"]);
        assert_eq!(
            group.keys,
            vec![
                ("uid".to_string(), "uid".to_string()),
                ("visit_id".to_string(), "visit_id".to_string())
            ]
        );
    }
}
