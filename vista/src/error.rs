use thiserror::Error;

/// The primary error type that can be produced by Vista.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse spec: {0}")]
    SpecParse(serde_json::Error),
    #[error("failed to compile spec: {0}")]
    SpecCompile(String),
    #[error("failed to execute visualization")]
    RuntimeExecution,
    #[error("query failed: {0}")]
    Query(String),
    #[error("unsupported URI: {0}")]
    UnsupportedUri(String),
    #[error("I/O error {0}: {1}")]
    Io(String, std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("data loaded from {0} is not an array of rows")]
    NotAnArray(String),
    #[error("no such dataset: {0}")]
    UnknownDataset(String),
    #[error("no such scale: {0}")]
    UnknownScale(String),
    #[error("unsupported mark type: {0}")]
    UnknownMark(String),
    #[error("template with name \"{0}\" already exists")]
    TemplateAlreadyExists(String),
    #[error("failed to parse template \"{0}\": {1}")]
    TemplateParse(String, handlebars::TemplateError),
    #[error("failed to render template \"{0}\": {1}")]
    TemplateRender(String, handlebars::RenderError),
    #[error("configuration value \"{0}\" has an unexpected type")]
    InvalidConfigValue(String),
}

/// Renders the given report, including its chain of causes, as a single line
/// suitable for display to a user.
pub fn error_message(report: &eyre::Report) -> String {
    format!("{:#}", report)
}
