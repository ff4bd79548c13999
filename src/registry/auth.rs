//! Host-scoped credentials for registry requests
//!
//! Credentials are looked up per request host. When a host has a credential
//! object, it authenticates the outgoing request itself; otherwise the client
//! falls back to the `TG_TF_REGISTRY_TOKEN` bearer token.

use crate::error::{GetterError, Result};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const TOKEN_ENV_PREFIX: &str = "TF_TOKEN_";
const CREDENTIALS_FILE_NAME: &str = "credentials.tfrc.json";

/// A credential object that can authenticate an outgoing request
pub trait HostCredentials: Send + Sync {
    fn prepare_request(&self, request: &mut reqwest::Request);
}

/// Source of host-scoped credentials
pub trait CredentialStore: Send + Sync {
    fn credentials_for_host(&self, host: &str) -> Option<Box<dyn HostCredentials>>;
}

/// Bearer token credentials
#[derive(Debug, Clone)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl HostCredentials for BearerToken {
    fn prepare_request(&self, request: &mut reqwest::Request) {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.token)) {
            request.headers_mut().insert(AUTHORIZATION, value);
        }
    }
}

/// Store that never has credentials
#[derive(Debug, Clone, Default)]
pub struct NoCredentials;

impl CredentialStore for NoCredentials {
    fn credentials_for_host(&self, _host: &str) -> Option<Box<dyn HostCredentials>> {
        None
    }
}

/// In-memory host to token map
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    tokens: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, host: &str, token: impl Into<String>) -> Self {
        self.insert(host, token);
        self
    }

    pub fn insert(&mut self, host: &str, token: impl Into<String>) {
        self.tokens.insert(host.to_ascii_lowercase(), token.into());
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl CredentialStore for StaticCredentials {
    fn credentials_for_host(&self, host: &str) -> Option<Box<dyn HostCredentials>> {
        self.tokens
            .get(&host.to_ascii_lowercase())
            .map(|token| Box::new(BearerToken::new(token.clone())) as Box<dyn HostCredentials>)
    }
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    credentials: HashMap<String, CredentialsEntry>,
}

#[derive(Debug, Deserialize)]
struct CredentialsEntry {
    token: String,
}

/// Credentials from the Terraform CLI credentials file and `TF_TOKEN_*` variables
#[derive(Debug, Clone, Default)]
pub struct CliConfigCredentials {
    inner: StaticCredentials,
}

impl CliConfigCredentials {
    /// Load credentials from `path` (or the default credentials file) and the
    /// process environment. A missing file yields an empty store.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = path.map(Path::to_path_buf).or_else(default_credentials_file);
        let mut store = match file_path {
            Some(p) if p.exists() => Self::from_file(&p)?,
            _ => Self::default(),
        };

        store.merge_env_tokens(
            std::env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        );
        Ok(store)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GetterError::Config(format!(
                "Failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content).map_err(|e| {
            GetterError::Config(format!(
                "Failed to parse credentials file {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        let parsed: CredentialsFile = serde_json::from_str(content)?;
        let mut inner = StaticCredentials::new();
        for (host, entry) in parsed.credentials {
            inner.insert(&host, entry.token);
        }
        Ok(Self { inner })
    }

    /// Apply `TF_TOKEN_<host>` variables on top of file credentials.
    pub fn merge_env_tokens<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if value.is_empty() {
                continue;
            }
            if let Some(host) = name.strip_prefix(TOKEN_ENV_PREFIX).and_then(host_from_env_suffix) {
                self.inner.insert(&host, value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl CredentialStore for CliConfigCredentials {
    fn credentials_for_host(&self, host: &str) -> Option<Box<dyn HostCredentials>> {
        self.inner.credentials_for_host(host)
    }
}

fn default_credentials_file() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".terraform.d").join(CREDENTIALS_FILE_NAME))
}

/// `app_terraform_io` -> `app.terraform.io`, `my__registry_io` -> `my-registry.io`
fn host_from_env_suffix(suffix: &str) -> Option<String> {
    if suffix.is_empty() {
        return None;
    }
    Some(suffix.replace("__", "-").replace('_', "."))
}
