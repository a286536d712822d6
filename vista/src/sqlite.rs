//! A query engine backed by an SQLite database.

use std::path::Path;

use async_trait::async_trait;
use eyre::Result;
use log::debug;
use rusqlite::{types::ValueRef, Connection};

use crate::query::{QueryEngine, QueryResult, Row, SqlValue};
use crate::Error;

/// Provides a [`QueryEngine`] on top of an SQLite connection.
///
/// Statements are executed to completion as soon as they are submitted.
#[derive(Debug)]
pub struct SqliteEngine {
    conn: Connection,
}

impl SqliteEngine {
    /// Open the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening SQLite database: {}", path.display());
        Ok(Self {
            conn: Connection::open(path).map_err(Error::Sqlite)?,
        })
    }

    /// Open a fresh in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory().map_err(Error::Sqlite)?,
        })
    }

    /// Execute one or more statements that produce no results, e.g. to
    /// create and populate tables.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        Ok(self.conn.execute_batch(sql).map_err(Error::Sqlite)?)
    }

    fn run(&self, statement: &str) -> rusqlite::Result<(Vec<String>, Vec<Row>)> {
        let mut stmt = self.conn.prepare(statement)?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<String>>();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (i, name) in columns.iter().enumerate() {
                values.push((name.clone(), to_sql_value(row.get_ref(i)?)));
            }
            rows.push(Row::new(values));
        }
        Ok((columns, rows))
    }
}

fn to_sql_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Long(i),
        ValueRef::Real(f) => SqlValue::Double(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}

impl QueryEngine for SqliteEngine {
    fn query(&self, statement: &str) -> Box<dyn QueryResult> {
        Box::new(SqliteResult {
            outcome: self.run(statement).map_err(|e| e.to_string()),
        })
    }
}

struct SqliteResult {
    outcome: std::result::Result<(Vec<String>, Vec<Row>), String>,
}

#[async_trait(?Send)]
impl QueryResult for SqliteResult {
    async fn wait_all_rows(&mut self) -> Result<()> {
        match &self.outcome {
            Ok(_) => Ok(()),
            Err(msg) => Err(Error::Query(msg.clone()).into()),
        }
    }

    fn columns(&self) -> Vec<String> {
        match &self.outcome {
            Ok((columns, _)) => columns.clone(),
            Err(_) => Vec::new(),
        }
    }

    fn rows(&mut self) -> Box<dyn Iterator<Item = Row> + '_> {
        match &mut self.outcome {
            Ok((_, rows)) => Box::new(std::mem::take(rows).into_iter()),
            Err(_) => Box::new(std::iter::empty()),
        }
    }
}
