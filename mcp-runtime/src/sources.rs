//! Loading OpenAPI documents from files or http(s) URLs.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use toolgate_core::error::ConvertError;
use toolgate_core::openapi::{self, Conversion};
use url::Url;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read OpenAPI document '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to fetch OpenAPI document from {url}: {source}")]
    Fetch {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("OpenAPI document at {url} returned HTTP {status}")]
    Status { url: Url, status: u16 },
    #[error("OpenAPI document '{location}' could not be converted: {source}")]
    Convert {
        location: String,
        #[source]
        source: ConvertError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    File(PathBuf),
    Url(Url),
}

impl SourceLocation {
    /// Absolute http(s) URLs are fetched; anything else is a file path.
    pub fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Url(url),
            _ => Self::File(PathBuf::from(raw)),
        }
    }

    pub async fn read(&self, client: &reqwest::Client) -> Result<String, SourceError> {
        match self {
            Self::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|source| SourceError::Io {
                    path: path.clone(),
                    source,
                }),
            Self::Url(url) => {
                let fetch = |source| SourceError::Fetch {
                    url: url.clone(),
                    source,
                };
                let response = client.get(url.clone()).send().await.map_err(fetch)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(SourceError::Status {
                        url: url.clone(),
                        status: status.as_u16(),
                    });
                }
                response.text().await.map_err(fetch)
            }
        }
    }

    /// Scheme and authority of a URL source, e.g. `https://api.example.com`.
    pub fn origin(&self) -> Option<String> {
        match self {
            Self::Url(url) => Some(url.origin().ascii_serialization()),
            Self::File(_) => None,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub location: SourceLocation,
    pub conversion: Conversion,
}

impl LoadedSource {
    /// Base address for the converted tools: the document's own server URL
    /// (resolved against a URL source when relative), else the source origin.
    pub fn base_address(&self) -> Option<String> {
        if let Some(declared) = &self.conversion.base_address {
            if Url::parse(declared).is_ok() {
                return Some(declared.clone());
            }
            if let SourceLocation::Url(url) = &self.location {
                if let Ok(joined) = url.join(declared) {
                    return Some(joined.to_string());
                }
            }
        }
        self.location.origin()
    }
}

pub async fn load(
    location: SourceLocation,
    client: &reqwest::Client,
) -> Result<LoadedSource, SourceError> {
    tracing::info!(source = %location, "Loading OpenAPI document");
    let text = location.read(client).await?;
    let conversion = openapi::convert(&text).map_err(|source| SourceError::Convert {
        location: location.to_string(),
        source,
    })?;
    tracing::info!(
        source = %location,
        tools = conversion.tools.len(),
        warnings = conversion.warnings.len(),
        "Created tool mappings from OpenAPI document"
    );
    Ok(LoadedSource {
        location,
        conversion,
    })
}
