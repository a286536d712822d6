//! Vista renders declarative chart specifications against application data
//! and the results of live queries.
//!
//! The centerpiece is the [`RenderController`], which compiles a spec,
//! feeds it data and manages the asynchronous lifecycle of the resulting
//! runtime view. For Vista's command line interface, see the `vista-cli`
//! crate.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value as JsonValue;

mod config;
mod controller;
pub mod dialect;
mod error;
mod loader;
mod query;
pub mod runtime;
mod shallow;
mod sqlite;
mod surface;

pub use config::Config;
pub use controller::{RenderController, RenderStatus};
pub use dialect::Dialect;
pub use error::{error_message, Error};
pub use loader::{DefaultLoader, LoadOptions, Loader, Sanitized, UriKind};
pub use query::{QueryEngine, QueryLoader, QueryResult, Row, SqlValue};
pub use runtime::{Runtime, RuntimeView, SvgRuntime};
pub use shallow::{shallow_eq, Identity, ShallowEq};
pub use sqlite::SqliteEngine;
pub use surface::{RedrawCounter, RedrawScheduler, Surface};

/// We use [`std::collections::BTreeMap`] as our default map structure.
pub type Map<K, V> = BTreeMap<K, V>;

/// The rows of a single dataset. Shared, so that bundles can be compared
/// cheaply by identity.
pub type Dataset = Rc<Vec<JsonValue>>;

/// Named datasets supplied by the application.
pub type DataBundle = Map<String, Dataset>;
