//! Subdirectory materialization through a staging directory

use crate::common::copy::copy_folder_contents_with_filter;
use crate::error::{GetterError, Result};
use crate::getter::fetch::{FetchEngine, FetchOptions};
use crate::logging::Logger;
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = ".tgmanifest";
const STAGING_PREFIX: &str = "tfr-getter";
const OWNER_WRITE_GLOBAL_READ_EXECUTE: u32 = 0o755;

/// A uniquely named temporary directory, removed when dropped.
///
/// [`StagingDir::path`] points at a child that does not exist yet, so the
/// fetch engine can create it.
pub struct StagingDir {
    root: PathBuf,
    path: PathBuf,
    logger: Logger,
}

impl StagingDir {
    pub fn new(logger: &Logger) -> Result<Self> {
        Self::new_in(&std::env::temp_dir(), logger)
    }

    pub fn new_in(parent: &Path, logger: &Logger) -> Result<Self> {
        let root = parent.join(format!("{}-{}", STAGING_PREFIX, uuid::Uuid::new_v4()));
        fs::create_dir_all(&root).map_err(|e| {
            GetterError::Io(format!("Failed to create staging directory {}: {}", root.display(), e))
        })?;

        Ok(Self {
            path: root.join("staged"),
            root,
            logger: logger.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                self.logger.warning(&format!(
                    "Error removing temporary directory {}: {}",
                    self.root.display(),
                    e
                ));
            }
        }
    }
}

fn recreate_destination(dst: &Path) -> Result<()> {
    if dst.is_file() {
        fs::remove_file(dst)?;
    }
    match fs::remove_dir_all(dst) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    fs::create_dir_all(dst)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dst, fs::Permissions::from_mode(OWNER_WRITE_GLOBAL_READ_EXECUTE))?;
    }
    Ok(())
}

/// Download `source_url` into a staging directory, then replace `dst` with the
/// contents of `subdir` from the staged tree. The staging directory is gone
/// when this returns, whatever the outcome.
pub async fn materialize_subdir(
    engine: &dyn FetchEngine,
    options: &FetchOptions,
    logger: &Logger,
    dst: &Path,
    source_url: &str,
    subdir: &str,
) -> Result<()> {
    let staging = StagingDir::new(logger)?;
    logger.detail(&format!(
        "Staging {} in {} to extract {}",
        source_url,
        staging.path().display(),
        subdir
    ));

    engine.fetch(staging.path(), source_url, options).await?;

    let source_path = engine.resolve_glob_subdir(staging.path(), subdir)?;

    let metadata = fs::metadata(&source_path).map_err(|e| {
        let details = format!("could not stat download path {} (error: {})", source_path.display(), e);
        GetterError::module_download(source_url, details)
    })?;
    if !metadata.is_dir() {
        let details = format!("download path {} is not a directory", source_path.display());
        return Err(GetterError::module_download(source_url, details));
    }

    recreate_destination(dst)?;

    let result = copy_folder_contents_with_filter(logger, &source_path, dst, MANIFEST_FILE_NAME, |_| true);

    let manifest_path = dst.join(MANIFEST_FILE_NAME);
    if let Err(e) = fs::remove_file(&manifest_path) {
        logger.warning(&format!("Error removing manifest {}: {}", manifest_path.display(), e));
    }

    result
}
