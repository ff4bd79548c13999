//! Directory copy helpers
//!
//! [`copy_folder_contents_with_filter`] records every path it creates in a
//! manifest file inside the destination, so a later copy into the same
//! destination can clean up what an earlier one left behind.

use crate::error::{GetterError, Result};
use crate::logging::Logger;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    path: PathBuf,
    is_dir: bool,
}

/// Line-delimited JSON record of the paths written by one copy
pub struct FileManifest {
    path: PathBuf,
    entries: HashSet<PathBuf>,
    file: Option<File>,
}

impl FileManifest {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            path: dir.join(name),
            entries: HashSet::new(),
            file: None,
        }
    }

    /// Remove everything a previous manifest recorded, then the manifest itself
    pub fn clean(&self, logger: &Logger) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: ManifestEntry = serde_json::from_str(&line).map_err(|e| {
                GetterError::Io(format!("corrupt manifest {}: {}", self.path.display(), e))
            })?;

            let removed = if entry.is_dir {
                fs::remove_dir_all(&entry.path)
            } else {
                fs::remove_file(&entry.path)
            };
            if let Err(e) = removed {
                if e.kind() != std::io::ErrorKind::NotFound {
                    logger.warning(&format!("Error removing {}: {}", entry.path.display(), e));
                }
            }
        }

        fs::remove_file(&self.path)?;
        Ok(())
    }

    pub fn create(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.file = Some(file);
        self.entries.clear();
        Ok(())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains(path)
    }

    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        self.add(path, false)
    }

    pub fn add_directory(&mut self, path: &Path) -> Result<()> {
        self.add(path, true)
    }

    fn add(&mut self, path: &Path, is_dir: bool) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| GetterError::Io(format!("manifest {} is not open", self.path.display())))?;

        let entry = ManifestEntry {
            path: path.to_path_buf(),
            is_dir,
        };
        let line = serde_json::to_string(&entry)
            .map_err(|e| GetterError::Io(format!("failed to encode manifest entry: {}", e)))?;
        writeln!(file, "{}", line)?;
        self.entries.insert(entry.path);
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

fn is_git_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() == ".git"
}

fn copy_entry(entry: &DirEntry, target: &Path) -> Result<()> {
    if entry.file_type().is_dir() {
        fs::create_dir_all(target)?;
    } else {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), target).map_err(|e| {
            GetterError::Io(format!(
                "Failed to copy {} to {}: {}",
                entry.path().display(),
                target.display(),
                e
            ))
        })?;
    }
    Ok(())
}

fn relative_target(source: &Path, dst: &Path, entry: &DirEntry) -> Result<PathBuf> {
    let rel = entry
        .path()
        .strip_prefix(source)
        .map_err(|e| GetterError::Io(format!("{}: {}", entry.path().display(), e)))?;
    Ok(dst.join(rel))
}

/// Recursively copy `src` into `dst`, creating `dst` if needed
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1).follow_links(true) {
        let entry = entry?;
        let target = relative_target(src, dst, &entry)?;
        copy_entry(&entry, &target)?;
    }
    Ok(())
}

/// Copy the contents of `source` into `dst`, tracking what was written in the
/// manifest `dst/manifest_name`. Entries rejected by `filter`, `.git`
/// directories and the manifest itself are skipped, as are paths the manifest
/// already lists.
pub fn copy_folder_contents_with_filter<F>(
    logger: &Logger,
    source: &Path,
    dst: &Path,
    manifest_name: &str,
    filter: F,
) -> Result<()>
where
    F: Fn(&Path) -> bool,
{
    fs::create_dir_all(dst)?;

    let mut manifest = FileManifest::new(dst, manifest_name);
    manifest.clean(logger)?;
    manifest.create()?;

    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_git_dir(e) && e.file_name() != manifest_name && filter(e.path()));

    let mut copied = 0usize;
    for entry in walker {
        let entry = entry?;
        let target = relative_target(source, dst, &entry)?;
        if manifest.contains(&target) {
            continue;
        }

        copy_entry(&entry, &target)?;
        if entry.file_type().is_dir() {
            manifest.add_directory(&target)?;
        } else {
            manifest.add_file(&target)?;
            copied += 1;
        }
    }

    manifest.close()?;
    logger.detail(&format!(
        "Copied {} files from {} to {}",
        copied,
        source.display(),
        dst.display()
    ));
    Ok(())
}
