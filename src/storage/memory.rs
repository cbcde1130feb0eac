//! In-memory storage
//!
//! Artifacts are kept as the exact text [`super::FsStorage`] would write, keyed by
//! their path relative to the registry or package database directory, so tests
//! can compare snapshots byte for byte. Registry list files are the top-level
//! `*.txt` keys and redirect files the `redirects/*.txt` keys.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::StorageError;
use crate::identity::RepositoryIdentity;
use crate::model::{Package, RegistryList};
use crate::redirect::RedirectTable;
use crate::storage::{
    PACKAGES_DIR, REDIRECTS_DIR, REDIRECTS_FILE, REGISTRY_LIST_FILE, Storage, TEXT_EXTENSION,
    package_record_path,
};

#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the primary registry list file from raw text
    pub fn with_registry_list(self, text: &str) -> Self {
        self.with_file(REGISTRY_LIST_FILE, text)
    }

    /// Seed the primary redirect file from raw text
    pub fn with_redirects(self, text: &str) -> Self {
        self.with_file(&redirect_key(REDIRECTS_FILE), text)
    }

    /// Seed any artifact by its relative path
    pub fn with_file(self, key: &str, text: &str) -> Self {
        self.files().insert(key.to_string(), text.to_string());
        self
    }

    pub fn with_package(self, package: &Package) -> Result<Self, StorageError> {
        self.write_package(package)?;
        Ok(self)
    }

    /// Copy of every stored artifact
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.files().clone()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `(file name, contents)` of the text files directly under `prefix`, by name
    fn text_files(&self, prefix: &str) -> Vec<(String, String)> {
        let suffix = format!(".{}", TEXT_EXTENSION);
        self.files()
            .iter()
            .filter_map(|(key, text)| {
                let name = key.strip_prefix(prefix)?;
                (!name.contains('/') && name.ends_with(&suffix))
                    .then(|| (name.to_string(), text.clone()))
            })
            .collect()
    }

    fn insert_all(&self, prefix: &str, files: Vec<(String, String)>) {
        let mut stored = self.files();
        for (name, contents) in files {
            stored.insert(format!("{}{}", prefix, name), contents);
        }
    }
}

fn redirect_key(name: &str) -> String {
    format!("{}/{}", REDIRECTS_DIR, name)
}

fn record_key(identity: &RepositoryIdentity) -> String {
    package_record_path(identity)
        .to_string_lossy()
        .replace('\\', "/")
}

impl Storage for MemoryStorage {
    fn read_registry_list(&self) -> Result<RegistryList, StorageError> {
        let files = self.text_files("");
        RegistryList::parse_files(files.iter().map(|(name, text)| (name.as_str(), text.as_str())))
    }

    fn write_registry_list(&self, list: &RegistryList) -> Result<(), StorageError> {
        self.insert_all("", list.render_files());
        Ok(())
    }

    fn read_redirects(&self) -> Result<RedirectTable, StorageError> {
        let files = self.text_files(&redirect_key(""));
        RedirectTable::parse_files(files.iter().map(|(name, text)| (name.as_str(), text.as_str())))
            .map_err(|e| e.in_dir(Path::new(REDIRECTS_DIR)))
    }

    fn write_redirects(&self, table: &RedirectTable) -> Result<(), StorageError> {
        self.insert_all(&redirect_key(""), table.render_files());
        Ok(())
    }

    fn read_packages(&self) -> Result<Vec<Package>, StorageError> {
        let prefix = format!("{}/", PACKAGES_DIR);
        self.files()
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, text)| Package::from_json(text.as_bytes(), key))
            .collect()
    }

    fn write_package(&self, package: &Package) -> Result<(), StorageError> {
        let json = package.to_json()?;
        self.files().insert(record_key(&package.identity), json);
        Ok(())
    }

    fn delete_package(&self, identity: &RepositoryIdentity) -> Result<(), StorageError> {
        self.files().remove(&record_key(identity));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_text_is_parsed_on_read() {
        let storage = MemoryStorage::new()
            .with_registry_list("# tracked\norg/a\n")
            .with_redirects("https://github.com/old/a -> https://github.com/org/a\n");

        let list = storage.read_registry_list().unwrap();
        let redirects = storage.read_redirects().unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(redirects.len(), 1);
    }

    #[test]
    fn list_and_redirects_span_multiple_files() {
        let storage = MemoryStorage::new()
            .with_registry_list("org/a\n")
            .with_file("maps.txt", "# maps\norg/b\n")
            .with_file("notes.md", "org/ignored\n")
            .with_redirects("old/a -> org/a\n")
            .with_file("redirects/2023.txt", "old/b -> org/b\n");

        let list = storage.read_registry_list().unwrap();
        let entries: Vec<String> = list.iter().map(|i| i.index_entry()).collect();
        assert_eq!(entries, vec!["org/b", "org/a"]);
        assert_eq!(storage.read_redirects().unwrap().len(), 2);

        let before = storage.snapshot();
        storage.write_registry_list(&list).unwrap();
        storage.write_redirects(&storage.read_redirects().unwrap()).unwrap();
        assert_eq!(storage.snapshot(), before);
    }

    #[test]
    fn reads_do_not_touch_snapshot() {
        let storage = MemoryStorage::new().with_registry_list("# tracked\norg/a\n");
        let before = storage.snapshot();

        storage.read_registry_list().unwrap();
        storage.read_packages().unwrap();

        assert_eq!(storage.snapshot(), before);
    }

    #[test]
    fn write_then_delete_package_removes_record() {
        let storage = MemoryStorage::new();
        let identity = RepositoryIdentity::github("org", "a");
        let package = Package::new(identity.clone(), vec![]);

        storage.write_package(&package).unwrap();
        assert_eq!(storage.read_packages().unwrap(), vec![package]);

        storage.delete_package(&identity).unwrap();
        assert!(storage.read_packages().unwrap().is_empty());
    }
}
