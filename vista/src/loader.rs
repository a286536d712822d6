//! URI-addressed text loading, used by runtime views to resolve external
//! data references.

use async_trait::async_trait;
use eyre::Result;
use log::trace;

use crate::Error;

/// Options influencing how URIs are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Relative URIs are resolved against this base, if given.
    pub base_url: Option<String>,
}

/// The means by which a sanitized URI must be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriKind {
    Http,
    File,
}

/// A URI that has been checked and resolved, ready to be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub href: String,
    pub kind: UriKind,
}

/// A pluggable capability resolving URIs to textual content.
///
/// Loaders are used from a single thread, so their futures need not be
/// `Send`.
#[async_trait(?Send)]
pub trait Loader {
    /// Fetch the content addressed by the given URI.
    async fn load(&self, uri: &str) -> Result<String>;

    /// Check and resolve the given URI without fetching it.
    async fn sanitize(&self, uri: &str, options: &LoadOptions) -> Result<Sanitized>;

    /// Fetch the given URL over HTTP(S).
    async fn http(&self, uri: &str, options: &LoadOptions) -> Result<String>;

    /// Read the given file from the local file system.
    async fn file(&self, name: &str) -> Result<String>;
}

/// Loads content over HTTP(S) or from the local file system.
#[derive(Debug, Clone, Default)]
pub struct DefaultLoader {
    options: LoadOptions,
}

impl DefaultLoader {
    /// Constructor.
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }
}

#[async_trait(?Send)]
impl Loader for DefaultLoader {
    async fn load(&self, uri: &str) -> Result<String> {
        let sanitized = self.sanitize(uri, &self.options).await?;
        match sanitized.kind {
            UriKind::Http => self.http(&sanitized.href, &self.options).await,
            UriKind::File => self.file(&sanitized.href).await,
        }
    }

    async fn sanitize(&self, uri: &str, options: &LoadOptions) -> Result<Sanitized> {
        Ok(sanitize_uri(uri, options)?)
    }

    async fn http(&self, uri: &str, _options: &LoadOptions) -> Result<String> {
        trace!("Fetching {}", uri);
        let response = reqwest::get(uri)
            .await
            .map_err(Error::Http)?
            .error_for_status()
            .map_err(Error::Http)?;
        Ok(response.text().await.map_err(Error::Http)?)
    }

    async fn file(&self, name: &str) -> Result<String> {
        trace!("Reading {}", name);
        Ok(tokio::fs::read_to_string(name)
            .await
            .map_err(|e| Error::Io(name.to_string(), e))?)
    }
}

fn sanitize_uri(uri: &str, options: &LoadOptions) -> Result<Sanitized, Error> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(Error::UnsupportedUri(uri.to_string()));
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return Ok(Sanitized {
            href: uri.to_string(),
            kind: UriKind::Http,
        });
    }
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(Sanitized {
            href: path.to_string(),
            kind: UriKind::File,
        });
    }
    if uri.contains("://") {
        return Err(Error::UnsupportedUri(uri.to_string()));
    }
    match &options.base_url {
        Some(base) if !uri.starts_with('/') => {
            let joined = format!(
                "{}/{}",
                base.trim_end_matches('/'),
                uri.trim_start_matches("./")
            );
            sanitize_uri(&joined, &LoadOptions::default())
        }
        _ => Ok(Sanitized {
            href: uri.to_string(),
            kind: UriKind::File,
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn with_base(base: &str) -> LoadOptions {
        LoadOptions {
            base_url: Some(base.to_string()),
        }
    }

    #[test]
    fn classifies_uris() {
        let none = LoadOptions::default();
        assert_eq!(
            sanitize_uri("https://example.com/a.json", &none).unwrap().kind,
            UriKind::Http
        );
        assert_eq!(
            sanitize_uri("file:///tmp/a.json", &none).unwrap(),
            Sanitized {
                href: "/tmp/a.json".to_string(),
                kind: UriKind::File
            }
        );
        assert_eq!(
            sanitize_uri("data/a.json", &none).unwrap().kind,
            UriKind::File
        );
        assert!(sanitize_uri("ftp://example.com/a.json", &none).is_err());
        assert!(sanitize_uri("  ", &none).is_err());
    }

    #[test]
    fn joins_relative_uris_onto_base() {
        let sanitized = sanitize_uri("./data/a.json", &with_base("https://example.com/")).unwrap();
        assert_eq!(sanitized.href, "https://example.com/data/a.json");
        assert_eq!(sanitized.kind, UriKind::Http);

        let sanitized = sanitize_uri("a.json", &with_base("/srv/charts")).unwrap();
        assert_eq!(sanitized.href, "/srv/charts/a.json");
        assert_eq!(sanitized.kind, UriKind::File);

        let sanitized = sanitize_uri("/abs/a.json", &with_base("/srv/charts")).unwrap();
        assert_eq!(sanitized.href, "/abs/a.json");
    }

    #[tokio::test]
    async fn loads_relative_files_from_base() {
        let dir = std::env::temp_dir();
        let path = dir.join("vista-loader-base-test.json");
        std::fs::write(&path, "[]").unwrap();
        let loader = DefaultLoader::new(with_base(dir.to_str().unwrap()));
        let content = loader.load("./vista-loader-base-test.json").await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(content, "[]");
    }

    #[tokio::test]
    async fn loads_local_files() {
        let path = std::env::temp_dir().join("vista-loader-test.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        let loader = DefaultLoader::default();
        let content = loader.load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(content, "[1, 2, 3]");
        std::fs::remove_file(&path).unwrap();

        let err = loader.load(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Io(_, _))));
    }
}
