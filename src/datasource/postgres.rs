//! PostgreSQL data source: compiles pipelines into nested subqueries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Postgres, QueryBuilder, Row, TypeInfo};

use super::{DataSource, DataSourceError};
use crate::pipeline::{Accumulator, Collection, Derived, Document, Group, Pipeline, Predicate, Stage, Value};

/// Data source reading the statistics tables through a shared pool.
#[derive(Debug, Clone)]
pub struct PgDataSource {
    pool: PgPool,
}

impl PgDataSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DataSource for PgDataSource {
    async fn run_aggregation(
        &self,
        collection: Collection,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, DataSourceError> {
        let mut builder = compile(collection, pipeline)?;
        tracing::debug!(
            collection = collection.table_name(),
            stages = pipeline.stages().len(),
            sql = builder.sql(),
            "Running aggregation"
        );

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn ping(&self) -> Result<(), DataSourceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Translate a pipeline into a single SQL statement.
///
/// Every stage wraps its predecessor as a subquery aliased `sN`, where `N` is
/// the stage's 1-based position. Literals become bind parameters in text order.
pub fn compile(
    collection: Collection,
    pipeline: &Pipeline,
) -> Result<QueryBuilder<'static, Postgres>, DataSourceError> {
    let mut builder = QueryBuilder::new("");
    push_stages(&mut builder, collection, pipeline.stages())?;
    Ok(builder)
}

fn push_stages(
    b: &mut QueryBuilder<'static, Postgres>,
    collection: Collection,
    stages: &[Stage],
) -> Result<(), DataSourceError> {
    let Some((last, inner)) = stages.split_last() else {
        b.push("SELECT * FROM ");
        b.push(quote(collection.table_name())?);
        return Ok(());
    };
    let alias = format!("s{}", stages.len());

    match last {
        Stage::Match(predicate) => {
            b.push("SELECT * FROM (");
            push_stages(b, collection, inner)?;
            b.push(format!(") AS {alias} WHERE "));
            push_predicate(b, predicate)?;
        }
        Stage::Project(fields) => {
            if fields.is_empty() {
                return Err(DataSourceError::InvalidPipeline(
                    "project stage lists no fields".to_string(),
                ));
            }
            b.push("SELECT ");
            for (i, (name, derived)) in fields.iter().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                push_derived(b, derived)?;
                b.push(" AS ");
                b.push(quote(name)?);
            }
            b.push(" FROM (");
            push_stages(b, collection, inner)?;
            b.push(format!(") AS {alias}"));
        }
        Stage::Group(group) => push_group(b, collection, inner, group, &alias)?,
    }
    Ok(())
}

fn push_group(
    b: &mut QueryBuilder<'static, Postgres>,
    collection: Collection,
    inner: &[Stage],
    group: &Group,
    alias: &str,
) -> Result<(), DataSourceError> {
    if group.keys.is_empty() && group.accumulators.is_empty() {
        return Err(DataSourceError::InvalidPipeline(
            "group stage has neither keys nor accumulators".to_string(),
        ));
    }

    let mut items = Vec::with_capacity(group.keys.len() + group.accumulators.len());
    for (key_alias, field) in &group.keys {
        items.push(format!("{} AS {}", quote(field)?, quote(key_alias)?));
    }
    for (name, accumulator) in &group.accumulators {
        items.push(format!("{} AS {}", accumulator_sql(accumulator)?, quote(name)?));
    }

    b.push("SELECT ");
    b.push(items.join(", "));
    b.push(" FROM (");
    push_stages(b, collection, inner)?;
    b.push(format!(") AS {alias}"));

    if !group.keys.is_empty() {
        let keys = group
            .keys
            .iter()
            .map(|(_, field)| quote(field))
            .collect::<Result<Vec<_>, _>>()?;
        b.push(" GROUP BY ");
        b.push(keys.join(", "));
    }
    Ok(())
}

fn accumulator_sql(accumulator: &Accumulator) -> Result<String, DataSourceError> {
    Ok(match accumulator {
        Accumulator::Count => "COUNT(*)".to_string(),
        Accumulator::Sum(field) => format!("COALESCE(SUM({}), 0)::BIGINT", quote(field)?),
        Accumulator::Avg(field) => format!("AVG({})::DOUBLE PRECISION", quote(field)?),
        Accumulator::Max(field) => format!("MAX({})", quote(field)?),
    })
}

fn push_derived(b: &mut QueryBuilder<'static, Postgres>, derived: &Derived) -> Result<(), DataSourceError> {
    match derived {
        Derived::Field(source) => {
            b.push(quote(source)?);
        }
        Derived::Flag(predicate) => {
            b.push("(CASE WHEN ");
            push_predicate(b, predicate)?;
            b.push(" THEN 1 ELSE 0 END)::BIGINT");
        }
    }
    Ok(())
}

fn push_predicate(b: &mut QueryBuilder<'static, Postgres>, predicate: &Predicate) -> Result<(), DataSourceError> {
    let column = quote(predicate.field())?;
    match predicate {
        Predicate::Eq(_, Value::Null) => {
            b.push(format!("{column} IS NULL"));
        }
        Predicate::Eq(_, value) => {
            b.push(format!("{column} = "));
            push_value(b, value);
        }
        Predicate::Ne(_, Value::Null) | Predicate::NotNull(_) => {
            b.push(format!("{column} IS NOT NULL"));
        }
        Predicate::Ne(_, value) => {
            b.push(format!("{column} IS DISTINCT FROM "));
            push_value(b, value);
        }
        Predicate::Gt(_, Value::Null) => {
            b.push("FALSE");
        }
        Predicate::Gt(_, value) => {
            b.push(format!("{column} > "));
            push_value(b, value);
        }
    }
    Ok(())
}

fn push_value(b: &mut QueryBuilder<'static, Postgres>, value: &Value) {
    match value {
        Value::Null => {
            b.push("NULL");
        }
        Value::Bool(v) => {
            b.push_bind(*v);
        }
        Value::Int(v) => {
            b.push_bind(*v);
        }
        Value::Float(v) => {
            b.push_bind(*v);
        }
        Value::Text(v) => {
            b.push_bind(v.clone());
        }
        Value::Timestamp(v) => {
            b.push_bind(*v);
        }
    }
}

/// Double-quote an identifier after checking it is a plain name.
fn quote(ident: &str) -> Result<String, DataSourceError> {
    let mut chars = ident.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(DataSourceError::InvalidPipeline(format!(
            "invalid identifier: {ident:?}"
        )));
    }
    Ok(format!("\"{ident}\""))
}

fn decode_row(row: &PgRow) -> Result<Document, DataSourceError> {
    let mut doc = Document::new();
    for column in row.columns() {
        let i = column.ordinal();
        let value = match column.type_info().name() {
            "INT8" => Value::from(row.try_get::<Option<i64>, _>(i)?),
            "INT4" => Value::from(row.try_get::<Option<i32>, _>(i)?.map(i64::from)),
            "INT2" => Value::from(row.try_get::<Option<i16>, _>(i)?.map(i64::from)),
            "FLOAT8" => Value::from(row.try_get::<Option<f64>, _>(i)?),
            "FLOAT4" => Value::from(row.try_get::<Option<f32>, _>(i)?.map(f64::from)),
            "BOOL" => Value::from(row.try_get::<Option<bool>, _>(i)?),
            "TEXT" | "VARCHAR" | "NAME" => Value::from(row.try_get::<Option<String>, _>(i)?),
            "TIMESTAMPTZ" => Value::from(row.try_get::<Option<DateTime<Utc>>, _>(i)?),
            other => {
                return Err(DataSourceError::UnsupportedType {
                    column: column.name().to_string(),
                    type_name: other.to_string(),
                })
            }
        };
        doc.insert(column.name(), value);
    }
    Ok(doc)
}
