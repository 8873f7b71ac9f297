//! Remote storage locations and the object-store client.
//!
//! Storage locations arrive as *templated* URLs: the configuration carries
//! a `{sas_token}` placeholder that is substituted at startup with the
//! short-lived access token resolved from the credential provider. The
//! token lives in the URL's query string, so joining a document's relative
//! path onto a location must extend the path while leaving the query
//! untouched — [`StorageLocation::join`] does exactly that, percent-encoding
//! each path segment on the way in.
//!
//! The [`ObjectStore`] trait is the crate's whole knowledge of the remote
//! store: fetch a URL to a local path, upload a local file to a URL. The
//! production implementation speaks plain HTTP; uploads set the
//! `x-ms-blob-type` header blob stores require for single-shot PUTs.

use crate::error::Corpus2MdError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Placeholder substituted into templated location URLs at startup.
pub const TOKEN_PLACEHOLDER: &str = "{sas_token}";

/// A location URL as configured: possibly still carrying the token
/// placeholder. Resolve it before use.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// The raw templated string, for forwarding into a task environment.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute the access token and parse the result. A template
    /// without a placeholder resolves unchanged.
    pub fn resolve(&self, token: &str) -> Result<StorageLocation, Corpus2MdError> {
        StorageLocation::parse(&self.0.replace(TOKEN_PLACEHOLDER, token))
    }
}

/// A validated, resolved storage base URL.
#[derive(Debug, Clone)]
pub struct StorageLocation {
    url: Url,
}

impl StorageLocation {
    /// Parse and validate a resolved location. Only absolute HTTP(S) URLs
    /// that can serve as a path base are accepted.
    pub fn parse(location: &str) -> Result<Self, Corpus2MdError> {
        let url = Url::parse(location).map_err(|e| Corpus2MdError::InvalidLocation {
            location: redact(location),
            detail: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Corpus2MdError::InvalidLocation {
                location: redact(location),
                detail: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Join a relative document path onto this location.
    ///
    /// Each `/`-separated segment is pushed through the URL's path
    /// segments, which percent-encodes characters unsafe in a path; the
    /// query string (where the access token lives) is preserved.
    pub fn join(&self, relative: &str) -> Result<Url, Corpus2MdError> {
        let mut url = self.url.clone();
        {
            let mut segments =
                url.path_segments_mut()
                    .map_err(|_| Corpus2MdError::InvalidLocation {
                        location: redact(self.url.as_str()),
                        detail: "URL cannot be a path base".into(),
                    })?;
            segments.pop_if_empty();
            for part in relative.split('/').filter(|p| !p.is_empty()) {
                segments.push(part);
            }
        }
        Ok(url)
    }
}

/// Strip the query string before a URL reaches an error message or log
/// line; that is where the access token lives.
pub fn redact(location: &str) -> String {
    match location.split_once('?') {
        Some((base, _)) => base.to_string(),
        None => location.to_string(),
    }
}

// ── Object store ─────────────────────────────────────────────────────────

/// Failure talking to the object store; mapped into the per-document or
/// fatal taxonomy by the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request could not be sent or the response body not read.
    #[error("request to '{url}' failed: {reason}")]
    Request { url: String, reason: String },

    /// The store answered with a non-success status.
    #[error("'{url}' answered HTTP {status}")]
    Status { url: String, status: u16 },

    /// Local file I/O around the transfer failed.
    #[error("local I/O for '{path}' failed: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fetch-by-URL, upload-by-URL. The only operations the pipeline needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `url` and write the body to `dest`.
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<(), StoreError>;

    /// Upload the file at `local` to `url`.
    async fn upload(&self, local: &Path, url: &Url) -> Result<(), StoreError>;
}

/// HTTP object store over a shared [`reqwest::Client`].
pub struct HttpObjectStore {
    client: reqwest::Client,
}

impl HttpObjectStore {
    /// Build a store whose transfers time out after `timeout_secs`.
    pub fn new(timeout_secs: u64) -> Result<Self, Corpus2MdError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Corpus2MdError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<(), StoreError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| StoreError::Request {
                url: redact(url.as_str()),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(StoreError::Status {
                url: redact(url.as_str()),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| StoreError::Request {
            url: redact(url.as_str()),
            reason: e.to_string(),
        })?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| StoreError::Io {
                path: dest.to_path_buf(),
                source: e,
            })?;

        debug!("fetched {} ({} bytes)", redact(url.as_str()), bytes.len());
        Ok(())
    }

    async fn upload(&self, local: &Path, url: &Url) -> Result<(), StoreError> {
        let bytes = tokio::fs::read(local).await.map_err(|e| StoreError::Io {
            path: local.to_path_buf(),
            source: e,
        })?;

        let response = self
            .client
            .put(url.clone())
            .header("x-ms-blob-type", "BlockBlob")
            .body(bytes)
            .send()
            .await
            .map_err(|e| StoreError::Request {
                url: redact(url.as_str()),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(StoreError::Status {
                url: redact(url.as_str()),
                status: response.status().as_u16(),
            });
        }

        debug!("uploaded {}", redact(url.as_str()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_without_placeholder_resolves_unchanged() {
        let t = UrlTemplate::new("https://acct.blob.example.net/corpus");
        let loc = t.resolve("sig=abc").unwrap();
        assert_eq!(loc.url().as_str(), "https://acct.blob.example.net/corpus");
    }

    #[test]
    fn template_substitutes_token_into_query() {
        let t = UrlTemplate::new("https://acct.blob.example.net/corpus?{sas_token}");
        let loc = t.resolve("sv=2024&sig=abc%2F1").unwrap();
        assert_eq!(loc.url().query(), Some("sv=2024&sig=abc%2F1"));
    }

    #[test]
    fn join_encodes_segments_and_preserves_query() {
        let loc = StorageLocation::parse("https://h.example.net/container?sig=s").unwrap();
        let joined = loc.join("A/B/[10.1002] sample.pdf").unwrap();
        assert_eq!(joined.query(), Some("sig=s"));
        assert!(joined.path().starts_with("/container/A/B/"));
        // The space must be encoded; the query must not be re-encoded.
        assert!(joined.path().contains("%20"));
        assert!(!joined.as_str().contains(' '));
    }

    #[test]
    fn join_ignores_empty_segments() {
        let loc = StorageLocation::parse("https://h.example.net/base/").unwrap();
        let joined = loc.join("/A//doc.pdf").unwrap();
        assert_eq!(joined.path(), "/base/A/doc.pdf");
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        assert!(StorageLocation::parse("ftp://h.example.net/x").is_err());
        assert!(StorageLocation::parse("not a url").is_err());
    }

    #[test]
    fn redact_strips_query() {
        assert_eq!(
            redact("https://h.example.net/c/doc.pdf?sig=secret"),
            "https://h.example.net/c/doc.pdf"
        );
        assert_eq!(redact("https://h.example.net/c"), "https://h.example.net/c");
    }
}
