//! Parameterized statement building for the relational adapters.
//!
//! Column maps are `BTreeMap`s, so columns are always emitted in sorted order
//! and the same input yields the same SQL text. Placeholders are numbered from
//! 1 without gaps; an UPDATE numbers its SET clause first and continues into the
//! WHERE clause. Only identifiers that pass [`Dialect::quote_ident`] reach the
//! SQL text, everything else travels as a bound parameter. Null is the one value
//! written inline: `IS NULL` in predicates and an untyped `NULL` literal in
//! VALUES and SET lists, so the server types it from the target column.
//!
//! Text values are bound as the driver's text type. [`ColumnCasts`] names the
//! columns whose server type differs; their text placeholders get an explicit
//! `::type` cast (Postgres only) so values read back as text can be written or
//! matched against their own column.

use crate::error::{DbError, DbResult};
use crate::models::{Row, SqlValue};
use std::collections::BTreeMap;

/// Predicate emitted for an empty filter. Matches every row.
pub const MATCH_ALL: &str = "1=1";

/// Column name to server type name, for text parameters that need a cast.
pub type ColumnCasts = BTreeMap<String, String>;

/// SQL flavour for quoting and placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `[ident]`, `@P1`, `SELECT TOP n`
    SqlServer,
    /// `"ident"`, `$1`, `LIMIT n`
    Postgres,
}

impl Dialect {
    /// Placeholder for the `n`th (1-indexed) bound parameter.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::SqlServer => format!("@P{}", n),
            Self::Postgres => format!("${}", n),
        }
    }

    /// Validate and quote a table or column name.
    ///
    /// Accepts `name` or dot-separated `schema.name`, where each part is
    /// `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn quote_ident(self, ident: &str) -> DbResult<String> {
        let parts = ident
            .split('.')
            .map(|part| {
                if is_plain_ident(part) {
                    Ok(match self {
                        Self::SqlServer => format!("[{}]", part),
                        Self::Postgres => format!("\"{}\"", part),
                    })
                } else {
                    Err(DbError::invalid_input(format!(
                        "Invalid identifier: '{}'",
                        ident
                    )))
                }
            })
            .collect::<DbResult<Vec<_>>>()?;
        Ok(parts.join("."))
    }
}

fn is_plain_ident(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Hands out placeholders in order and collects the bound values.
struct Binder<'a> {
    dialect: Dialect,
    casts: &'a ColumnCasts,
    params: Vec<SqlValue>,
}

impl<'a> Binder<'a> {
    fn new(dialect: Dialect, casts: &'a ColumnCasts) -> Self {
        Self {
            dialect,
            casts,
            params: Vec::new(),
        }
    }

    /// Placeholder for `value` destined for column `col`.
    fn bind(&mut self, col: &str, value: &SqlValue) -> String {
        self.params.push(value.clone());
        let placeholder = self.dialect.placeholder(self.params.len());
        match (self.dialect, value, self.casts.get(col)) {
            (Dialect::Postgres, SqlValue::Text(_), Some(ty)) => format!("{}::{}", placeholder, ty),
            _ => placeholder,
        }
    }

    /// Right-hand side of a VALUES entry or SET assignment. Null is inlined.
    fn value(&mut self, col: &str, value: &SqlValue) -> String {
        if value.is_null() {
            "NULL".to_string()
        } else {
            self.bind(col, value)
        }
    }

    /// AND-joined equality predicate for `filter`. Null values become
    /// `IS NULL` and consume no placeholder.
    fn predicate(&mut self, filter: &Row) -> DbResult<String> {
        if filter.is_empty() {
            return Ok(MATCH_ALL.to_string());
        }

        let mut clauses = Vec::with_capacity(filter.len());
        for (name, val) in filter {
            let col = self.dialect.quote_ident(name)?;
            if val.is_null() {
                clauses.push(format!("{} IS NULL", col));
            } else {
                let placeholder = self.bind(name, val);
                clauses.push(format!("{} = {}", col, placeholder));
            }
        }
        Ok(clauses.join(" AND "))
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }
}

/// `INSERT INTO t (a,b) VALUES (@P1,@P2)`
pub fn insert(dialect: Dialect, table: &str, data: &Row, casts: &ColumnCasts) -> DbResult<Statement> {
    if data.is_empty() {
        return Err(DbError::invalid_input("Insert requires at least one column"));
    }

    let table = dialect.quote_ident(table)?;
    let mut binder = Binder::new(dialect, casts);
    let mut columns = Vec::with_capacity(data.len());
    let mut values = Vec::with_capacity(data.len());
    for (col, val) in data {
        columns.push(dialect.quote_ident(col)?);
        values.push(binder.value(col, val));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        values.join(", ")
    );
    Ok(binder.finish(sql))
}

/// `SELECT * FROM t WHERE ...`, optionally capped at `limit` rows.
pub fn select(
    dialect: Dialect,
    table: &str,
    filter: &Row,
    limit: Option<u32>,
    casts: &ColumnCasts,
) -> DbResult<Statement> {
    let table = dialect.quote_ident(table)?;
    let mut binder = Binder::new(dialect, casts);
    let predicate = binder.predicate(filter)?;

    let sql = match (dialect, limit) {
        (Dialect::SqlServer, Some(n)) => {
            format!("SELECT TOP {} * FROM {} WHERE {}", n, table, predicate)
        }
        (Dialect::Postgres, Some(n)) => {
            format!("SELECT * FROM {} WHERE {} LIMIT {}", table, predicate, n)
        }
        (_, None) => format!("SELECT * FROM {} WHERE {}", table, predicate),
    };
    Ok(binder.finish(sql))
}

/// `UPDATE t SET a = @P1 WHERE b = @P2`
pub fn update(
    dialect: Dialect,
    table: &str,
    filter: &Row,
    changes: &Row,
    casts: &ColumnCasts,
) -> DbResult<Statement> {
    if changes.is_empty() {
        return Err(DbError::invalid_input("Update requires at least one column"));
    }

    let table = dialect.quote_ident(table)?;
    let mut binder = Binder::new(dialect, casts);
    let mut assignments = Vec::with_capacity(changes.len());
    for (name, val) in changes {
        let col = dialect.quote_ident(name)?;
        let value = binder.value(name, val);
        assignments.push(format!("{} = {}", col, value));
    }
    let predicate = binder.predicate(filter)?;

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        table,
        assignments.join(", "),
        predicate
    );
    Ok(binder.finish(sql))
}

/// `DELETE FROM t WHERE ...`
pub fn delete(dialect: Dialect, table: &str, filter: &Row, casts: &ColumnCasts) -> DbResult<Statement> {
    let table = dialect.quote_ident(table)?;
    let mut binder = Binder::new(dialect, casts);
    let predicate = binder.predicate(filter)?;
    let sql = format!("DELETE FROM {} WHERE {}", table, predicate);
    Ok(binder.finish(sql))
}
