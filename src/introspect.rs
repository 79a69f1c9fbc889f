//! Database introspection: discovering a table's column layout before generating rows for it.

use async_trait::async_trait;

use crate::error::Error;
use crate::model::{ColumnInfo, DataSource, TableInfo};
use crate::value::Value;

/// Reads a table's column structure from a live data source.
///
/// Grounded on the original system's `GetTableStructure`/`openConnection` pair: a database task
/// needs the real column list (names, types, nullability, auto-increment) before it can
/// synthesize values that fit the schema, so introspection happens once per task, up front.
#[async_trait]
pub trait DatabaseIntrospector: Send + Sync {
    /// Connects to `data_source` and returns `table_name`'s column layout.
    async fn get_table_structure(&self, data_source: &DataSource, table_name: &str) -> Result<TableInfo, Error>;

    /// Fetches up to `limit` distinct values of `column` from `table`, used to pre-seed the
    /// `db_lookup` rule's cache before generation starts (see [`crate::context::RunContext`]).
    ///
    /// Defaults to an empty result; a `db_lookup` rule referencing a source this introspector
    /// doesn't know how to query surfaces as a generation error rather than a panic.
    async fn fetch_column_values(
        &self,
        _data_source: &DataSource,
        _table: &str,
        _column: &str,
        _limit: usize,
    ) -> Result<Vec<Value>, Error> {
        Ok(Vec::new())
    }
}

/// A [`DatabaseIntrospector`] that hands back a fixed [`TableInfo`] regardless of the data
/// source, for tests and for callers that already know their schema (e.g. from a prior
/// introspection cached elsewhere).
pub struct StaticIntrospector {
    table: TableInfo,
}

impl StaticIntrospector {
    /// Creates an introspector that always returns `table`.
    pub fn new(table: TableInfo) -> Self {
        Self { table }
    }

    /// Convenience constructor building a [`TableInfo`] from bare `(name, type)` pairs, with no
    /// column flagged as primary key or auto-increment.
    pub fn from_columns(table_name: impl Into<String>, columns: &[(&str, &str)]) -> Self {
        let columns = columns
            .iter()
            .map(|(name, kind)| ColumnInfo {
                name: (*name).to_owned(),
                kind: (*kind).to_owned(),
                nullable: false,
                default_value: String::new(),
                is_primary_key: false,
                is_auto_increment: false,
                max_length: 0,
            })
            .collect();
        Self::new(TableInfo { table_name: table_name.into(), columns })
    }
}

#[async_trait]
impl DatabaseIntrospector for StaticIntrospector {
    async fn get_table_structure(&self, _data_source: &DataSource, _table_name: &str) -> Result<TableInfo, Error> {
        Ok(self.table.clone())
    }
}

/// Introspects a table's real column layout over a live `sqlx::AnyPool` connection.
///
/// Grounded directly on the original system's `getMySQLColumns`/`getPostgreSQLColumns`/
/// `getSQLiteColumns` (`backend/services/database.go`): one dialect-specific query against
/// `information_schema.columns` (MySQL/PostgreSQL) or `PRAGMA table_info` (SQLite), since each
/// dialect exposes column metadata under different names and through a different mechanism.
pub struct SqlxIntrospector;

#[async_trait]
impl DatabaseIntrospector for SqlxIntrospector {
    async fn get_table_structure(&self, data_source: &DataSource, table_name: &str) -> Result<TableInfo, Error> {
        let dsn = data_source.connection_string().map_err(|e| Error::Introspection {
            table: table_name.to_owned(),
            source: e.into(),
        })?;
        let pool = sqlx::AnyPool::connect(&dsn).await.map_err(|e| Error::Introspection {
            table: table_name.to_owned(),
            source: Box::new(e),
        })?;

        let columns = match data_source.kind.to_lowercase().as_str() {
            "mysql" => mysql_columns(&pool, table_name).await,
            "postgresql" | "postgres" => postgres_columns(&pool, table_name).await,
            "sqlite" => sqlite_columns(&pool, table_name).await,
            other => Err(Error::Introspection {
                table: table_name.to_owned(),
                source: format!("unsupported database type: {other}").into(),
            }),
        }?;

        Ok(TableInfo { table_name: table_name.to_owned(), columns })
    }

    async fn fetch_column_values(
        &self,
        data_source: &DataSource,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<Value>, Error> {
        let dsn = data_source.connection_string().map_err(|e| Error::Sink(e))?;
        let pool = sqlx::AnyPool::connect(&dsn).await.map_err(|e| Error::Sink(e.to_string()))?;
        let sql = format!("SELECT {column} FROM {table} LIMIT {limit}");
        let rows = sqlx::query(&sql).fetch_all(&pool).await.map_err(|e| Error::Sink(e.to_string()))?;
        let values = rows
            .iter()
            .filter_map(|row| sqlx::Row::try_get::<String, _>(row, 0).ok().map(Value::Str))
            .collect();
        Ok(values)
    }
}

async fn mysql_columns(pool: &sqlx::AnyPool, table_name: &str) -> Result<Vec<ColumnInfo>, Error> {
    let query = "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT, COLUMN_KEY, EXTRA, \
                 CHARACTER_MAXIMUM_LENGTH FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION";
    let rows = sqlx::query(query)
        .bind(table_name)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::Introspection { table: table_name.to_owned(), source: Box::new(e) })?;

    Ok(rows
        .iter()
        .map(|row| {
            use sqlx::Row;
            let nullable: String = row.try_get(2).unwrap_or_default();
            let column_key: String = row.try_get(4).unwrap_or_default();
            let extra: String = row.try_get(5).unwrap_or_default();
            ColumnInfo {
                name: row.try_get(0).unwrap_or_default(),
                kind: row.try_get(1).unwrap_or_default(),
                nullable: nullable.eq_ignore_ascii_case("YES"),
                default_value: row.try_get::<Option<String>, _>(3).ok().flatten().unwrap_or_default(),
                is_primary_key: column_key == "PRI",
                is_auto_increment: extra.contains("auto_increment"),
                max_length: row.try_get::<Option<i64>, _>(6).ok().flatten().unwrap_or_default(),
            }
        })
        .collect())
}

async fn postgres_columns(pool: &sqlx::AnyPool, table_name: &str) -> Result<Vec<ColumnInfo>, Error> {
    let query = "SELECT column_name, data_type, is_nullable, column_default, character_maximum_length \
                 FROM information_schema.columns WHERE table_name = $1 ORDER BY ordinal_position";
    let rows = sqlx::query(query)
        .bind(table_name)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::Introspection { table: table_name.to_owned(), source: Box::new(e) })?;

    let pk_query = "SELECT kcu.column_name FROM information_schema.table_constraints tc \
                     JOIN information_schema.key_column_usage kcu ON tc.constraint_name = kcu.constraint_name \
                     WHERE tc.table_name = $1 AND tc.constraint_type = 'PRIMARY KEY'";
    let pk_rows = sqlx::query(pk_query).bind(table_name).fetch_all(pool).await.unwrap_or_default();
    let primary_keys: std::collections::HashSet<String> = pk_rows
        .iter()
        .filter_map(|row| sqlx::Row::try_get::<String, _>(row, 0).ok())
        .collect();

    Ok(rows
        .iter()
        .map(|row| {
            use sqlx::Row;
            let name: String = row.try_get(0).unwrap_or_default();
            let nullable: String = row.try_get(2).unwrap_or_default();
            ColumnInfo {
                is_primary_key: primary_keys.contains(&name),
                name,
                kind: row.try_get(1).unwrap_or_default(),
                nullable: nullable.eq_ignore_ascii_case("YES"),
                default_value: row.try_get::<Option<String>, _>(3).ok().flatten().unwrap_or_default(),
                is_auto_increment: false,
                max_length: row.try_get::<Option<i64>, _>(4).ok().flatten().unwrap_or_default(),
            }
        })
        .collect())
}

async fn sqlite_columns(pool: &sqlx::AnyPool, table_name: &str) -> Result<Vec<ColumnInfo>, Error> {
    let query = format!("PRAGMA table_info({table_name})");
    let rows = sqlx::query(&query)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::Introspection { table: table_name.to_owned(), source: Box::new(e) })?;

    Ok(rows
        .iter()
        .map(|row| {
            use sqlx::Row;
            let not_null: i64 = row.try_get(3).unwrap_or(0);
            let pk: i64 = row.try_get(5).unwrap_or(0);
            ColumnInfo {
                name: row.try_get(1).unwrap_or_default(),
                kind: row.try_get(2).unwrap_or_default(),
                nullable: not_null == 0,
                default_value: row.try_get::<Option<String>, _>(4).ok().flatten().unwrap_or_default(),
                is_primary_key: pk == 1,
                is_auto_increment: false,
                max_length: 0,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> DataSource {
        DataSource {
            name: "db".to_owned(),
            kind: "mysql".to_owned(),
            host: "localhost".to_owned(),
            port: 3306,
            database: "test".to_owned(),
            username: "root".to_owned(),
            password: String::new(),
        }
    }

    #[tokio::test]
    async fn static_introspector_returns_fixed_table() {
        let introspector = StaticIntrospector::from_columns("users", &[("id", "int"), ("name", "varchar")]);
        let table = introspector.get_table_structure(&source(), "users").await.unwrap();
        assert_eq!(table.table_name, "users");
        assert_eq!(table.columns.len(), 2);
    }
}
