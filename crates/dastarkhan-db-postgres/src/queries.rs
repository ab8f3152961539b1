//! SQL for the per-collection JSONB tables.
//!
//! Every function takes any Postgres executor, so the same statements serve
//! the pool and an open transaction.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;
use time::OffsetDateTime;

use dastarkhan_storage::{Collection, Filter, FindMany, StorageError, StoredRecord};

use crate::error::{classify, classify_for};

type RecordRow = (String, Value, DateTime<Utc>, DateTime<Utc>);

const COLUMNS: &str = "id, data, created_at, updated_at";

/// Converts chrono DateTime to time OffsetDateTime.
fn chrono_to_time(dt: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(dt.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
        + time::Duration::nanoseconds(i64::from(dt.timestamp_subsec_nanos()))
}

fn into_record(collection: Collection, row: RecordRow) -> StoredRecord {
    let (id, data, created_at, updated_at) = row;
    StoredRecord {
        collection,
        id,
        data,
        created_at: chrono_to_time(created_at),
        updated_at: chrono_to_time(updated_at),
    }
}

/// A positional parameter of a generated statement.
#[derive(Debug, Clone, PartialEq)]
enum Param {
    Text(String),
    TextArray(Vec<String>),
    Json(Value),
    Int(i64),
}

fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Builds the SELECT for a `find_many` query together with its parameters.
///
/// A missing payload field compares as JSON `null`, and rows are always
/// tie-broken by id so the order is stable.
fn build_select(collection: Collection, find: &FindMany) -> (String, Vec<Param>) {
    let mut sql = format!("SELECT {COLUMNS} FROM \"{}\"", collection.table_name());
    let mut params = Vec::new();
    let mut clauses = Vec::new();

    for filter in &find.filters {
        match filter {
            Filter::Eq(field, value) if field == "id" => {
                params.push(Param::Text(id_text(value)));
                clauses.push(format!("id = ${}", params.len()));
            }
            Filter::In(field, values) if field == "id" => {
                params.push(Param::TextArray(values.iter().map(id_text).collect()));
                clauses.push(format!("id = ANY(${})", params.len()));
            }
            Filter::Eq(field, value) => {
                params.push(Param::Text(field.clone()));
                params.push(Param::Json(value.clone()));
                clauses.push(format!(
                    "COALESCE(data -> ${}, 'null'::jsonb) = ${}",
                    params.len() - 1,
                    params.len()
                ));
            }
            Filter::In(field, values) => {
                params.push(Param::Text(field.clone()));
                params.push(Param::Json(Value::Array(values.clone())));
                clauses.push(format!(
                    "${}::jsonb @> jsonb_build_array(COALESCE(data -> ${}, 'null'::jsonb))",
                    params.len(),
                    params.len() - 1
                ));
            }
        }
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    match &find.order {
        Some(sort) => {
            params.push(Param::Text(sort.field.clone()));
            let direction = if sort.descending { "DESC" } else { "ASC" };
            sql.push_str(&format!(
                " ORDER BY data -> ${} {direction}, id ASC",
                params.len()
            ));
        }
        None => sql.push_str(" ORDER BY id ASC"),
    }

    if let Some(limit) = find.limit {
        params.push(Param::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
        sql.push_str(&format!(" LIMIT ${}", params.len()));
    }

    (sql, params)
}

/// Returns all records of a collection matching the query.
pub async fn find_many<'c, E>(
    executor: E,
    collection: Collection,
    find: &FindMany,
) -> Result<Vec<StoredRecord>, StorageError>
where
    E: Executor<'c, Database = Postgres>,
{
    let (sql, params) = build_select(collection, find);
    let mut q = query_as::<_, RecordRow>(&sql);
    for param in params {
        q = match param {
            Param::Text(v) => q.bind(v),
            Param::TextArray(v) => q.bind(v),
            Param::Json(v) => q.bind(v),
            Param::Int(v) => q.bind(v),
        };
    }

    let rows = q.fetch_all(executor).await.map_err(classify)?;
    Ok(rows
        .into_iter()
        .map(|row| into_record(collection, row))
        .collect())
}

/// Reads a record by id.
pub async fn find_unique<'c, E>(
    executor: E,
    collection: Collection,
    id: &str,
) -> Result<Option<StoredRecord>, StorageError>
where
    E: Executor<'c, Database = Postgres>,
{
    let sql = format!(
        "SELECT {COLUMNS} FROM \"{}\" WHERE id = $1",
        collection.table_name()
    );
    let row = query_as::<_, RecordRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(classify)?;
    Ok(row.map(|row| into_record(collection, row)))
}

/// Inserts a record whose payload already carries its id.
pub async fn insert<'c, E>(
    executor: E,
    collection: Collection,
    id: &str,
    payload: &Value,
) -> Result<StoredRecord, StorageError>
where
    E: Executor<'c, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO \"{}\" (id, data) VALUES ($1, $2) RETURNING {COLUMNS}",
        collection.table_name()
    );
    let row = query_as::<_, RecordRow>(&sql)
        .bind(id)
        .bind(payload)
        .fetch_one(executor)
        .await
        .map_err(|e| classify_for(e, collection, id))?;
    Ok(into_record(collection, row))
}

/// Shallow-merges `patch` into an existing record.
pub async fn update<'c, E>(
    executor: E,
    collection: Collection,
    id: &str,
    patch: &Value,
) -> Result<StoredRecord, StorageError>
where
    E: Executor<'c, Database = Postgres>,
{
    let mut fields: Map<String, Value> = patch
        .as_object()
        .cloned()
        .ok_or_else(|| StorageError::invalid_record("patch must be a JSON object"))?;
    fields.remove("id");

    let sql = format!(
        "UPDATE \"{}\" SET data = data || $2, updated_at = NOW() WHERE id = $1 RETURNING {COLUMNS}",
        collection.table_name()
    );
    let row = query_as::<_, RecordRow>(&sql)
        .bind(id)
        .bind(Value::Object(fields))
        .fetch_optional(executor)
        .await
        .map_err(classify)?;

    row.map(|row| into_record(collection, row))
        .ok_or_else(|| StorageError::not_found(collection, id))
}

/// Inserts a record or replaces its payload.
pub async fn upsert<'c, E>(
    executor: E,
    collection: Collection,
    id: &str,
    payload: &Value,
) -> Result<StoredRecord, StorageError>
where
    E: Executor<'c, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO \"{}\" (id, data) VALUES ($1, $2) \
         ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW() \
         RETURNING {COLUMNS}",
        collection.table_name()
    );
    let row = query_as::<_, RecordRow>(&sql)
        .bind(id)
        .bind(payload)
        .fetch_one(executor)
        .await
        .map_err(classify)?;
    Ok(into_record(collection, row))
}

/// Deletes a record.
pub async fn delete<'c, E>(executor: E, collection: Collection, id: &str) -> Result<(), StorageError>
where
    E: Executor<'c, Database = Postgres>,
{
    let sql = format!("DELETE FROM \"{}\" WHERE id = $1", collection.table_name());
    let result = query(&sql)
        .bind(id)
        .execute(executor)
        .await
        .map_err(classify)?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(collection, id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dastarkhan_storage::SortParam;
    use serde_json::json;

    #[test]
    fn test_select_without_filters_orders_by_id() {
        let (sql, params) = build_select(Collection::Restaurant, &FindMany::new());
        assert_eq!(
            sql,
            "SELECT id, data, created_at, updated_at FROM \"restaurant\" ORDER BY id ASC"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_select_numbers_parameters_in_order() {
        let find = FindMany::new()
            .where_eq("menuItemId", "osh")
            .where_in("id", ["a", "b"])
            .order_by(SortParam::desc("name"))
            .with_limit(5);
        let (sql, params) = build_select(Collection::MenuItemIngredient, &find);

        assert!(sql.contains("COALESCE(data -> $1, 'null'::jsonb) = $2"));
        assert!(sql.contains("id = ANY($3)"));
        assert!(sql.contains("ORDER BY data -> $4 DESC, id ASC"));
        assert!(sql.ends_with("LIMIT $5"));
        assert_eq!(
            params,
            vec![
                Param::Text("menuItemId".into()),
                Param::Json(json!("osh")),
                Param::TextArray(vec!["a".into(), "b".into()]),
                Param::Text("name".into()),
                Param::Int(5),
            ]
        );
    }

    #[test]
    fn test_select_quotes_reserved_table_names() {
        let (sql, _) = build_select(Collection::Order, &FindMany::new());
        assert!(sql.contains("FROM \"order\""));
    }
}
