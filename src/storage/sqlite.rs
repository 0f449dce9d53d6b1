//! `SQLite` source of record: one table, paged by its key column.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params};

use super::RecordSource;
use crate::indexer::projection::{PROJECTION_WIDTH, ProjectionRow, project};
use crate::model::{Record, SearchEntity, Value};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("identifier regex"));

fn quoted(identifier: &str) -> Result<String> {
    if !IDENTIFIER.is_match(identifier) {
        bail!("`{identifier}` is not a valid SQL identifier");
    }
    Ok(format!("\"{identifier}\""))
}

/// Builds an entity from one table row.
pub type RowMapper<E> = Arc<dyn Fn(&SqliteRow) -> Result<E> + Send + Sync>;

/// One fetched row, readable by column name.
#[derive(Debug, Clone)]
pub struct SqliteRow {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record for SqliteRow {
    fn get(&self, property: &str) -> Option<Value> {
        let i = self.columns.iter().position(|c| c == property)?;
        self.values.get(i).filter(|v| !v.is_null()).cloned()
    }
}

/// Reads entities from `table`, ordered by `key_column`.
///
/// Each call opens its own read-only connection on a blocking thread.
/// Projections read same-named columns raw; when a projected property has
/// no column of that name the rows go through the mapper instead.
pub struct SqliteRecordSource<E> {
    path: PathBuf,
    table: String,
    key_column: String,
    mapper: RowMapper<E>,
}

impl<E> Clone for SqliteRecordSource<E> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            table: self.table.clone(),
            key_column: self.key_column.clone(),
            mapper: Arc::clone(&self.mapper),
        }
    }
}

impl<E: SearchEntity> SqliteRecordSource<E> {
    pub fn new<F>(path: impl AsRef<Path>, table: &str, key_column: &str, mapper: F) -> Result<Self>
    where
        F: Fn(&SqliteRow) -> Result<E> + Send + Sync + 'static,
    {
        quoted(table)?;
        quoted(key_column)?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            table: table.to_string(),
            key_column: key_column.to_string(),
            mapper: Arc::new(mapper),
        })
    }

    /// Run `sql` with `LIMIT ?1 OFFSET ?2` bound and collect every row.
    async fn select(&self, sql: String, skip: usize, take: usize) -> Result<Vec<SqliteRow>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<SqliteRow>> {
            let conn = open_readonly(&path)?;
            let mut stmt = conn.prepare(&sql).with_context(|| format!("preparing `{sql}`"))?;
            let columns: Arc<[String]> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let width = columns.len();
            let take = i64::try_from(take).unwrap_or(i64::MAX);
            let skip = i64::try_from(skip).unwrap_or(i64::MAX);
            let rows = stmt.query_map(params![take, skip], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(from_sql))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?;
            let fetched = rows
                .map(|values| -> Result<SqliteRow> {
                    Ok(SqliteRow {
                        columns: Arc::clone(&columns),
                        values: values?,
                    })
                })
                .collect::<Result<Vec<_>>>();
            fetched
        })
        .await
        .context("sqlite worker panicked")?
    }

    /// Column names of the source table.
    async fn table_columns(&self) -> Result<Vec<String>> {
        let path = self.path.clone();
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let conn = open_readonly(&path)?;
            let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
            let names = stmt
                .query_map(params![table], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
        .await
        .context("sqlite worker panicked")?
    }

    fn page_sql(&self, columns: &str) -> Result<String> {
        Ok(format!(
            "SELECT {columns} FROM {} ORDER BY {} LIMIT ?1 OFFSET ?2",
            quoted(&self.table)?,
            quoted(&self.key_column)?,
        ))
    }
}

fn open_readonly(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("opening {}", path.display()))
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[async_trait]
impl<E> RecordSource<E> for SqliteRecordSource<E>
where
    E: SearchEntity,
    E::Key: FromStr,
    <E::Key as FromStr>::Err: Display,
{
    async fn fetch_page(&self, skip: usize, take: usize) -> Result<Vec<E>> {
        let rows = self.select(self.page_sql("*")?, skip, take).await?;
        rows.iter().map(|row| (self.mapper)(row)).collect()
    }

    async fn fetch_projection(
        &self,
        columns: &[String],
        skip: usize,
        take: usize,
    ) -> Result<Vec<ProjectionRow>> {
        if columns.len() > PROJECTION_WIDTH + 1 {
            bail!("{} columns exceed a projection row", columns.len());
        }
        let present = self.table_columns().await?;
        if let Some(missing) = columns.iter().find(|c| !present.contains(c)) {
            tracing::debug!(
                table = %self.table,
                column = %missing,
                "projected property has no column; mapping full rows"
            );
            let entities = self.fetch_page(skip, take).await?;
            return entities
                .iter()
                .map(|e| {
                    project(e, columns)
                        .ok_or_else(|| anyhow!("{} columns exceed a projection row", columns.len()))
                })
                .collect();
        }
        let list = columns
            .iter()
            .map(|c| quoted(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let rows = self.select(self.page_sql(&list)?, skip, take).await?;
        Ok(rows
            .into_iter()
            .map(|row| row.values.into_iter().collect())
            .collect())
    }

    async fn fetch_ids(&self) -> Result<Vec<E::Key>> {
        let sql = self.page_sql(&quoted(&self.key_column)?)?;
        let rows = self.select(sql, 0, usize::MAX).await?;
        rows.into_iter()
            .map(|row| -> Result<E::Key> {
                let raw = row
                    .values
                    .first()
                    .and_then(Value::to_index_string)
                    .ok_or_else(|| anyhow!("null key in `{}`", self.table))?;
                raw.parse::<E::Key>()
                    .map_err(|e| anyhow!("bad key `{raw}` in `{}`: {e}", self.table))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: i64,
        name: String,
    }

    impl Record for Item {
        fn get(&self, property: &str) -> Option<Value> {
            match property {
                "id" => Some(Value::Int(self.id)),
                "name" => Some(Value::from(&self.name)),
                _ => None,
            }
        }
    }

    impl SearchEntity for Item {
        const ENTITY_TYPE: &'static str = "Item";
        type Key = i64;

        fn key(&self) -> i64 {
            self.id
        }
    }

    fn fixture() -> (TempDir, SqliteRecordSource<Item>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, price REAL);
             INSERT INTO items VALUES (3, 'gamma', 1.5), (1, 'alpha', NULL), (2, 'beta', 2.0);",
        )
        .unwrap();
        let source = SqliteRecordSource::new(&path, "items", "id", |row| {
            Ok(Item {
                id: match row.get("id") {
                    Some(Value::Int(id)) => id,
                    other => bail!("bad id {other:?}"),
                },
                name: row
                    .get("name")
                    .and_then(|v| v.to_index_string())
                    .unwrap_or_default(),
            })
        })
        .unwrap();
        (dir, source)
    }

    #[tokio::test]
    async fn pages_are_ordered_by_key() {
        let (_dir, source) = fixture();
        let first = source.fetch_page(0, 2).await.unwrap();
        assert_eq!(
            first.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            ["alpha", "beta"]
        );
        let rest = source.fetch_page(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(source.fetch_page(3, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn projection_selects_only_requested_columns() {
        let (_dir, source) = fixture();
        let columns = vec!["id".to_string(), "price".to_string()];
        let rows = source.fetch_projection(&columns, 0, 10).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].as_slice(), [Value::Int(1), Value::Null]);
        assert_eq!(rows[2].as_slice(), [Value::Int(3), Value::Float(1.5)]);
    }

    #[tokio::test]
    async fn renamed_columns_project_through_the_mapper() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT);
             INSERT INTO items VALUES (2, 'beta'), (1, 'alpha');",
        )
        .unwrap();
        let source = SqliteRecordSource::new(&path, "items", "id", |row| {
            Ok(Item {
                id: match row.get("id") {
                    Some(Value::Int(id)) => id,
                    other => bail!("bad id {other:?}"),
                },
                name: row
                    .get("label")
                    .and_then(|v| v.to_index_string())
                    .unwrap_or_default(),
            })
        })
        .unwrap();

        let columns = vec!["id".to_string(), "name".to_string()];
        let rows = source.fetch_projection(&columns, 0, 10).await.unwrap();
        assert_eq!(rows[0].as_slice(), [Value::Int(1), Value::from("alpha")]);
        assert_eq!(rows[1].as_slice(), [Value::Int(2), Value::from("beta")]);
    }

    #[tokio::test]
    async fn ids_parse_into_keys() {
        let (_dir, source) = fixture();
        assert_eq!(source.fetch_ids().await.unwrap(), [1, 2, 3]);
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let result = SqliteRecordSource::<Item>::new("x.db", "items; DROP TABLE x", "id", |_| {
            bail!("unused")
        });
        assert!(result.is_err());
        assert!(quoted("name").is_ok());
        assert!(quoted("na\"me").is_err());
    }
}
