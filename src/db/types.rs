//! Native row decoding.
//!
//! Converts driver rows into [`Row`] column maps so relational results reach
//! callers in one shape regardless of backend.
//!
//! # Architecture
//!
//! PostgreSQL decoding uses a two-phase approach:
//! 1. `TypeCategory` classifies the column's type name into a logical category
//! 2. Category-specific decoders handle the actual value extraction
//!
//! SQL Server rows carry self-describing `ColumnData`, so they are matched
//! directly.

use crate::models::{Row, SqlValue};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column, Row as _, TypeInfo};
use tiberius::{ColumnData, FromSql};

const NAIVE_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for PostgreSQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
}

/// Classify a PostgreSQL type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with the float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    match lower.as_str() {
        "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "smallserial"
        | "serial" | "bigserial" => TypeCategory::Integer,
        "bool" | "boolean" => TypeCategory::Boolean,
        "float4" | "float8" | "real" | "double precision" => TypeCategory::Float,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "bytea" => TypeCategory::Binary,
        "timestamptz" => TypeCategory::TimestampTz,
        "timestamp" => TypeCategory::Timestamp,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        // Default to text for everything else (varchar, text, char, name, ...)
        _ => TypeCategory::Text,
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// Convert a PostgreSQL row into a column map.
pub fn pg_row_to_values(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name());
            (col.name().to_string(), postgres::decode_column(row, idx, category))
        })
        .collect()
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> SqlValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Decimal => decode_as::<Decimal, _>(row, idx, |d| d.to_string()),
            TypeCategory::Boolean => decode_as::<bool, _>(row, idx, SqlValue::Bool),
            TypeCategory::Binary => decode_as::<Vec<u8>, _>(row, idx, SqlValue::Bytes),
            TypeCategory::Json => decode_as::<serde_json::Value, _>(row, idx, |v| v.to_string()),
            TypeCategory::Uuid => decode_as::<Uuid, _>(row, idx, |u| u.to_string()),
            TypeCategory::Timestamp => decode_as::<NaiveDateTime, _>(row, idx, |t| {
                t.format(NAIVE_DATETIME_FORMAT).to_string()
            }),
            TypeCategory::TimestampTz => {
                decode_as::<DateTime<Utc>, _>(row, idx, |t| t.to_rfc3339())
            }
            TypeCategory::Date => decode_as::<NaiveDate, _>(row, idx, |d| d.to_string()),
            TypeCategory::Time => decode_as::<NaiveTime, _>(row, idx, |t| t.to_string()),
            TypeCategory::Text => decode_as::<String, _>(row, idx, SqlValue::Text),
        }
    }

    fn decode_as<T, V>(row: &PgRow, idx: usize, convert: impl FnOnce(T) -> V) -> SqlValue
    where
        T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
        V: Into<SqlValue>,
    {
        match row.try_get::<Option<T>, _>(idx) {
            Ok(Some(v)) => convert(v).into(),
            Ok(None) => SqlValue::Null,
            Err(e) => {
                tracing::debug!(column = idx, error = %e, "Failed to decode column");
                SqlValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> SqlValue {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.into();
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(i64::from).into();
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(i64::from).into();
        }
        SqlValue::Null
    }

    fn decode_float(row: &PgRow, idx: usize) -> SqlValue {
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.into();
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v.map(f64::from).into();
        }
        SqlValue::Null
    }
}

// =============================================================================
// SQL Server
// =============================================================================

/// Convert a SQL Server row into a column map.
pub fn sqlserver_row_to_values(row: tiberius::Row) -> Row {
    let names: Vec<String> = row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    names
        .into_iter()
        .zip(row)
        .map(|(name, data)| (name, column_data_to_value(data)))
        .collect()
}

fn column_data_to_value(data: ColumnData<'static>) -> SqlValue {
    match data {
        ColumnData::U8(v) => v.map(i64::from).into(),
        ColumnData::I16(v) => v.map(i64::from).into(),
        ColumnData::I32(v) => v.map(i64::from).into(),
        ColumnData::I64(v) => v.into(),
        ColumnData::F32(v) => v.map(f64::from).into(),
        ColumnData::F64(v) => v.into(),
        ColumnData::Bit(v) => v.into(),
        ColumnData::String(v) => v.map(|s| s.into_owned()).into(),
        ColumnData::Guid(v) => v.map(|g| g.to_string()).into(),
        ColumnData::Binary(v) => v.map(|b| b.into_owned()).into(),
        ColumnData::Numeric(v) => v.map(|n| n.to_string()).into(),
        other => temporal_to_value(&other),
    }
}

fn temporal_to_value(data: &ColumnData<'static>) -> SqlValue {
    if let Ok(Some(t)) = DateTime::<FixedOffset>::from_sql(data) {
        return SqlValue::Text(t.to_rfc3339());
    }
    if let Ok(Some(t)) = NaiveDateTime::from_sql(data) {
        return SqlValue::Text(t.format(NAIVE_DATETIME_FORMAT).to_string());
    }
    if let Ok(Some(d)) = NaiveDate::from_sql(data) {
        return SqlValue::Text(d.to_string());
    }
    if let Ok(Some(t)) = NaiveTime::from_sql(data) {
        return SqlValue::Text(t.to_string());
    }
    tracing::debug!(column_type = ?data, "Unsupported or null SQL Server value");
    SqlValue::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT4"), TypeCategory::Integer);
        assert_eq!(categorize_type("INT8"), TypeCategory::Integer);
        assert_eq!(categorize_type("int2"), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_type_interval_is_not_integer() {
        assert_eq!(categorize_type("INTERVAL"), TypeCategory::Text);
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
    }

    #[test]
    fn test_categorize_type_json_and_time() {
        assert_eq!(categorize_type("jsonb"), TypeCategory::Json);
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::TimestampTz);
        assert_eq!(categorize_type("TIMESTAMP"), TypeCategory::Timestamp);
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Text);
    }

    #[test]
    fn test_column_data_scalars() {
        assert_eq!(column_data_to_value(ColumnData::I32(Some(7))), SqlValue::Int(7));
        assert_eq!(column_data_to_value(ColumnData::I32(None)), SqlValue::Null);
        assert_eq!(column_data_to_value(ColumnData::U8(Some(255))), SqlValue::Int(255));
        assert_eq!(column_data_to_value(ColumnData::Bit(Some(true))), SqlValue::Bool(true));
        assert_eq!(
            column_data_to_value(ColumnData::String(Some(Cow::Borrowed("ada")))),
            SqlValue::Text("ada".to_string())
        );
        assert_eq!(
            column_data_to_value(ColumnData::Binary(Some(Cow::Owned(vec![1, 2])))),
            SqlValue::Bytes(vec![1, 2])
        );
    }
}
