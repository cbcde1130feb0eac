//! Filesystem storage
//!
//! The registry list is every `*.txt` file directly in the registry directory,
//! the redirect table every `*.txt` file in its `redirects/` subdirectory. Files
//! are read in name order. Package records live under `<package_db>/packages/`
//! and are found recursively, so their identity comes from their content rather
//! than their path. Every write goes to a temporary file in the destination
//! directory and is then renamed over the target.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::identity::RepositoryIdentity;
use crate::model::{Package, RegistryList};
use crate::redirect::RedirectTable;
use crate::storage::{PACKAGES_DIR, REDIRECTS_DIR, Storage, TEXT_EXTENSION, package_record_path};

pub struct FsStorage {
    registry_dir: PathBuf,
    package_db_dir: PathBuf,
}

impl FsStorage {
    pub fn new(registry_dir: impl Into<PathBuf>, package_db_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry_dir: registry_dir.into(),
            package_db_dir: package_db_dir.into(),
        }
    }

    fn redirects_dir(&self) -> PathBuf {
        self.registry_dir.join(REDIRECTS_DIR)
    }

    fn packages_root(&self) -> PathBuf {
        self.package_db_dir.join(PACKAGES_DIR)
    }

    /// `(file name, contents)` of every text file directly in `dir`, by name.
    /// A missing directory has no files.
    fn read_text_files(dir: &Path) -> Result<Vec<(String, String)>, StorageError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(dir, e))?.path();
            if !path.is_file() || !path.extension().is_some_and(|ext| ext == TEXT_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                warn!("Skipping non UTF-8 file name {}", path.display());
                continue;
            };
            let text = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
            files.push((name.to_string(), text));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    fn write_text_files(dir: &Path, files: Vec<(String, String)>) -> Result<(), StorageError> {
        files
            .iter()
            .try_for_each(|(name, contents)| Self::write_atomic(&dir.join(name), contents))
    }

    fn write_atomic(path: &Path, contents: &str) -> Result<(), StorageError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| io_error(parent, e))?;
        tmp.write_all(contents.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| io_error(path, e))?;
        tmp.persist(path).map_err(|e| io_error(path, e.error))?;

        debug!("Wrote {}", path.display());
        Ok(())
    }

    /// Remove empty directories from `dir` up to (but excluding) `root`
    fn prune_empty_dirs(dir: &Path, root: &Path) {
        let mut current = Some(dir);
        while let Some(dir) = current {
            if dir == root || !dir.starts_with(root) {
                break;
            }
            let is_empty = fs::read_dir(dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                break;
            }
            if let Err(e) = fs::remove_dir(dir) {
                warn!("Failed to remove empty directory {}: {}", dir.display(), e);
                break;
            }
            current = dir.parent();
        }
    }

    fn collect_records(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), StorageError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error(dir, e)),
        };

        for entry in entries {
            let path = entry.map_err(|e| io_error(dir, e))?.path();
            if path.is_dir() {
                Self::collect_records(&path, out)?;
            } else if path.extension().is_some_and(|ext| ext == "json") {
                out.push(path);
            }
        }
        Ok(())
    }
}

fn io_error(path: &Path, source: io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl Storage for FsStorage {
    fn read_registry_list(&self) -> Result<RegistryList, StorageError> {
        let files = Self::read_text_files(&self.registry_dir)?;
        RegistryList::parse_files(files.iter().map(|(name, text)| (name.as_str(), text.as_str())))
            .map_err(|e| e.in_dir(&self.registry_dir))
    }

    fn write_registry_list(&self, list: &RegistryList) -> Result<(), StorageError> {
        Self::write_text_files(&self.registry_dir, list.render_files())
    }

    fn read_redirects(&self) -> Result<RedirectTable, StorageError> {
        let dir = self.redirects_dir();
        let files = Self::read_text_files(&dir)?;
        RedirectTable::parse_files(files.iter().map(|(name, text)| (name.as_str(), text.as_str())))
            .map_err(|e| e.in_dir(&dir))
    }

    fn write_redirects(&self, table: &RedirectTable) -> Result<(), StorageError> {
        Self::write_text_files(&self.redirects_dir(), table.render_files())
    }

    fn read_packages(&self) -> Result<Vec<Package>, StorageError> {
        let mut paths = Vec::new();
        Self::collect_records(&self.packages_root(), &mut paths)?;
        paths.sort();

        paths
            .iter()
            .map(|path| {
                let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
                Package::from_json(&bytes, &path.display().to_string())
            })
            .collect()
    }

    fn write_package(&self, package: &Package) -> Result<(), StorageError> {
        let path = self
            .package_db_dir
            .join(package_record_path(&package.identity));
        Self::write_atomic(&path, &package.to_json()?)
    }

    fn delete_package(&self, identity: &RepositoryIdentity) -> Result<(), StorageError> {
        let path = self.package_db_dir.join(package_record_path(identity));
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error(&path, e)),
        }

        if let Some(parent) = path.parent() {
            Self::prune_empty_dirs(parent, &self.packages_root());
        }
        Ok(())
    }
}
