//! Query engine capability and its adaptation into a [`Loader`].

use std::rc::Rc;

use async_trait::async_trait;
use eyre::Result;
use log::{debug, error};
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use subtle_encoding::hex;

use crate::loader::{DefaultLoader, LoadOptions, Loader, Sanitized};
use crate::{Error, Map};

/// A single value produced by a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    /// A 64-bit integer. These are narrowed to `f64` when encoded as JSON.
    Long(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<SqlValue> for JsonValue {
    fn from(v: SqlValue) -> Self {
        match v {
            SqlValue::Null => Self::Null,
            // Integers beyond 2^53 lose precision here.
            SqlValue::Long(i) => JsonNumber::from_f64(i as f64)
                .map(Self::Number)
                .unwrap_or(Self::Null),
            SqlValue::Double(f) => JsonNumber::from_f64(f)
                .map(Self::Number)
                .unwrap_or(Self::Null),
            SqlValue::Text(s) => Self::String(s),
            SqlValue::Blob(b) => Self::String(String::from_utf8(hex::encode(b)).unwrap_or_default()),
        }
    }
}

/// A row of a query result, with values accessible by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Map<String, SqlValue>);

impl Row {
    /// Constructor.
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (String, SqlValue)>,
    {
        Self(values.into_iter().collect())
    }

    /// Get the value of the column with the given name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0.get(column)
    }
}

/// The result of a query that may still be executing.
#[async_trait(?Send)]
pub trait QueryResult {
    /// Wait until all rows of the result have been materialized.
    ///
    /// Fails with [`Error::Query`] if the engine failed to execute the query.
    async fn wait_all_rows(&mut self) -> Result<()>;

    /// The names of the result's columns, in order.
    fn columns(&self) -> Vec<String>;

    /// Iterate through the result's rows. The iteration can only be performed
    /// once.
    fn rows(&mut self) -> Box<dyn Iterator<Item = Row> + '_>;
}

/// An external query-execution service.
pub trait QueryEngine {
    /// Start executing the given statement.
    fn query(&self, statement: &str) -> Box<dyn QueryResult>;
}

/// A [`Loader`] that treats URIs passed to [`Loader::load`] as query
/// statements to be executed against a query engine. All other loading
/// operations are delegated to a [`DefaultLoader`].
pub struct QueryLoader {
    engine: Option<Rc<dyn QueryEngine>>,
    fallback: DefaultLoader,
}

impl QueryLoader {
    /// Constructor. Without an engine, every query loads as empty content.
    pub fn new(engine: Option<Rc<dyn QueryEngine>>) -> Self {
        Self {
            engine,
            fallback: DefaultLoader::default(),
        }
    }
}

#[async_trait(?Send)]
impl Loader for QueryLoader {
    async fn load(&self, uri: &str) -> Result<String> {
        let engine = match &self.engine {
            Some(engine) => engine,
            None => return Ok(String::new()),
        };
        debug!("Executing query: {}", uri);
        let mut result = engine.query(uri);
        if let Err(e) = result.wait_all_rows().await {
            return match e.downcast_ref::<Error>() {
                Some(Error::Query(msg)) => {
                    error!("Query failed, continuing without data: {}", msg);
                    Ok(String::new())
                }
                _ => Err(e),
            };
        }
        let columns = result.columns();
        let rows = result
            .rows()
            .map(|row| {
                let obj = columns
                    .iter()
                    .map(|name| {
                        let value = row.get(name).cloned().unwrap_or(SqlValue::Null);
                        (name.clone(), JsonValue::from(value))
                    })
                    .collect::<JsonMap<String, JsonValue>>();
                JsonValue::Object(obj)
            })
            .collect::<Vec<JsonValue>>();
        debug!("Query produced {} row(s)", rows.len());
        Ok(serde_json::to_string(&rows).map_err(Error::Json)?)
    }

    async fn sanitize(&self, uri: &str, options: &LoadOptions) -> Result<Sanitized> {
        self.fallback.sanitize(uri, options).await
    }

    async fn http(&self, uri: &str, options: &LoadOptions) -> Result<String> {
        self.fallback.http(uri, options).await
    }

    async fn file(&self, name: &str) -> Result<String> {
        self.fallback.file(name).await
    }
}
