//! Content fetch engine seam and its default implementation
//!
//! The registry getter only resolves where a module lives. Moving the bytes is
//! delegated to a [`FetchEngine`]. [`DefaultFetcher`] handles tar/tar.gz archives
//! over HTTP(S) and local directories; anything else is reported as unsupported.

use crate::common::copy::copy_dir_recursive;
use crate::error::{GetterError, Result};
use crate::getter::source;
use crate::logging::Logger;
use crate::registry::auth::NoCredentials;
use crate::registry::client::RegistryHttpClient;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// What a fetch is expected to produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientMode {
    #[default]
    Dir,
    File,
    Any,
}

/// Client-level options passed through to every fetch
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub mode: ClientMode,
    pub timeout: Option<Duration>,
}

#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Download `source` recursively into `dst`
    async fn fetch(&self, dst: &Path, source: &str, options: &FetchOptions) -> Result<()>;

    fn split_source_and_subdir(&self, raw: &str) -> (String, String) {
        source::split_source_and_subdir(raw)
    }

    fn resolve_glob_subdir(&self, root: &Path, pattern: &str) -> Result<PathBuf> {
        source::resolve_glob_subdir(root, pattern)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Tar,
    TarGz,
}

impl ArchiveFormat {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "tar" => Some(ArchiveFormat::Tar),
            "tar.gz" | "tgz" => Some(ArchiveFormat::TarGz),
            _ => None,
        }
    }

    fn from_path(path: &str) -> Option<Self> {
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if path.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }
}

/// `git::https://...` -> (Some("git"), "https://...")
fn split_forced_getter(src: &str) -> (Option<&str>, &str) {
    if let Some(idx) = src.find("::") {
        let prefix = &src[..idx];
        if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return (Some(prefix), &src[idx + 2..]);
        }
    }
    (None, src)
}

fn unsupported(source: &str) -> GetterError {
    GetterError::Fetch(format!(
        "unsupported source {}: only tar archives over http(s) and local directories can be fetched",
        source
    ))
}

/// Fetches archives and local directories.
///
/// Archive hosts are named by the registry response, so archive downloads go
/// out without registry credentials or the fallback token.
#[derive(Clone)]
pub struct DefaultFetcher {
    http: RegistryHttpClient,
    logger: Logger,
}

impl DefaultFetcher {
    pub fn new(logger: &Logger) -> Result<Self> {
        Self::with_timeout(logger, None)
    }

    pub fn with_timeout(logger: &Logger, timeout: Option<Duration>) -> Result<Self> {
        let http = RegistryHttpClient::builder()
            .with_credentials(Arc::new(NoCredentials))
            .with_fallback_token(None)
            .with_timeout(timeout)
            .with_logger(logger.clone())
            .build()?;
        Ok(Self {
            http,
            logger: logger.clone(),
        })
    }

    async fn fetch_archive(&self, dst: &Path, mut url: Url, options: &FetchOptions) -> Result<()> {
        let mut archive = None;
        let mut checksum = None;
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter_map(|(key, value)| {
                if key == "archive" {
                    archive = Some(value.into_owned());
                    None
                } else if key == "checksum" {
                    checksum = Some(value.into_owned());
                    None
                } else {
                    Some((key.into_owned(), value.into_owned()))
                }
            })
            .collect();

        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }

        let format = match archive.as_deref() {
            Some(name) => ArchiveFormat::from_name(name)
                .ok_or_else(|| GetterError::Fetch(format!("unsupported archive format: {}", name)))?,
            None => ArchiveFormat::from_path(url.path()).ok_or_else(|| unsupported(url.as_str()))?,
        };

        self.logger.detail(&format!("Downloading archive {}", url));
        let (body, _) = match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.http.get(&url))
                .await
                .map_err(|_| GetterError::Transport(format!("GET {} timed out after {:?}", url, timeout)))??,
            None => self.http.get(&url).await?,
        };

        if let Some(checksum) = checksum {
            verify_checksum(&checksum, &body)?;
        }

        self.logger.detail(&format!(
            "Unpacking {} into {}",
            self.logger.format_size(body.len() as u64),
            dst.display()
        ));

        // Unpacked inline: nothing may write into dst once this future is dropped.
        unpack_archive(format, &body, dst)
    }
}

#[async_trait]
impl FetchEngine for DefaultFetcher {
    async fn fetch(&self, dst: &Path, source: &str, options: &FetchOptions) -> Result<()> {
        let (forced, rest) = split_forced_getter(source);
        if let Some(getter) = forced {
            if !matches!(getter, "http" | "https" | "file") {
                return Err(unsupported(source));
            }
        }

        if forced.is_none() && rest.starts_with('/') {
            return copy_local(Path::new(rest), dst);
        }

        let url = Url::parse(rest).map_err(|e| GetterError::Fetch(format!("invalid source {}: {}", source, e)))?;
        match url.scheme() {
            "http" | "https" => self.fetch_archive(dst, url, options).await,
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| GetterError::Fetch(format!("invalid file source {}", source)))?;
                copy_local(&path, dst)
            }
            _ => Err(unsupported(source)),
        }
    }
}

fn copy_local(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(GetterError::Fetch(format!(
            "source directory {} does not exist",
            src.display()
        )));
    }
    copy_dir_recursive(src, dst)
}

fn verify_checksum(checksum: &str, body: &[u8]) -> Result<()> {
    let (kind, expected) = checksum
        .split_once(':')
        .ok_or_else(|| GetterError::Fetch(format!("invalid checksum {}", checksum)))?;
    if kind != "sha256" {
        return Err(GetterError::Fetch(format!("unsupported checksum type {}", kind)));
    }

    let actual = hex::encode(Sha256::digest(body));
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(GetterError::Fetch(format!(
            "checksum mismatch: expected sha256:{}, got sha256:{}",
            expected, actual
        )));
    }
    Ok(())
}

fn unpack_archive(format: ArchiveFormat, body: &[u8], dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    let result = match format {
        ArchiveFormat::Tar => tar::Archive::new(body).unpack(dst),
        ArchiveFormat::TarGz => tar::Archive::new(GzDecoder::new(body)).unpack(dst),
    };
    result.map_err(|e| GetterError::Fetch(format!("failed to unpack archive: {}", e)))
}
