//! Parameter binding for built statements.
//!
//! Binds [`SqlValue`]s onto the native query objects in placeholder order.

use crate::db::sql::Statement;
use crate::models::SqlValue;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Build a PostgreSQL query from a statement with every parameter bound.
pub(crate) fn postgres_query(stmt: &Statement) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    stmt.params
        .iter()
        .fold(sqlx::query(&stmt.sql), bind_postgres_param)
}

/// Bind a parameter to a SQL Server query.
pub(crate) fn bind_sqlserver_param(query: &mut tiberius::Query<'_>, param: &SqlValue) {
    match param {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
    }
}

/// Build a SQL Server query from a statement with every parameter bound.
pub(crate) fn sqlserver_query(stmt: &Statement) -> tiberius::Query<'_> {
    let mut query = tiberius::Query::new(stmt.sql.as_str());
    for param in &stmt.params {
        bind_sqlserver_param(&mut query, param);
    }
    query
}
