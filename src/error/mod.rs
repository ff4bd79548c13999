//! Error types for registry resolution and module download

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GetterError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GetterError {
    /// The tfr:// source is missing its version, or carries more than one
    #[error("tfr getter URL is malformed: {reason}")]
    MalformedRegistryUrl { reason: String },
    /// The service discovery document could not be used
    #[error("Error identifying module registry API location: {reason}")]
    ServiceDiscovery { reason: String },
    /// Non-2xx response from a registry endpoint
    #[error("Failed to fetch url {url}: status code {status_code}")]
    RegistryApi { url: String, status_code: u16 },
    /// No usable download location, or the staged subdir is missing
    #[error("Error downloading module from {source_url}: {details}")]
    ModuleDownload { source_url: String, details: String },
    /// Network or connection failures
    #[error("Transport error: {0}")]
    Transport(String),
    /// Errors surfaced by the content fetch engine
    #[error("Fetch error: {0}")]
    Fetch(String),
    /// File IO errors
    #[error("IO error: {0}")]
    Io(String),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
    /// Feature not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

impl GetterError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        GetterError::MalformedRegistryUrl {
            reason: reason.into(),
        }
    }

    pub fn module_download(source_url: impl Into<String>, details: impl Into<String>) -> Self {
        GetterError::ModuleDownload {
            source_url: source_url.into(),
            details: details.into(),
        }
    }
}

impl From<std::io::Error> for GetterError {
    fn from(err: std::io::Error) -> Self {
        GetterError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for GetterError {
    fn from(err: reqwest::Error) -> Self {
        GetterError::Transport(err.to_string())
    }
}

impl From<url::ParseError> for GetterError {
    fn from(err: url::ParseError) -> Self {
        GetterError::MalformedRegistryUrl {
            reason: err.to_string(),
        }
    }
}

impl From<walkdir::Error> for GetterError {
    fn from(err: walkdir::Error) -> Self {
        GetterError::Io(err.to_string())
    }
}

impl From<glob::PatternError> for GetterError {
    fn from(err: glob::PatternError) -> Self {
        GetterError::Fetch(format!("invalid subdir pattern: {}", err))
    }
}
