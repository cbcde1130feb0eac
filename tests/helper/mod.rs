//! Shared fixtures for catalog integration tests

#![allow(dead_code)]

mod hosting;

use std::sync::Arc;

use serde_json::{Value, json};

use mod_registry::storage::MemoryStorage;
use mod_registry::{Catalog, Config, RepositoryIdentity};

pub use hosting::FakeHosting;

pub fn id(s: &str) -> RepositoryIdentity {
    RepositoryIdentity::parse(s).unwrap()
}

/// A valid `mod.json` declaring `dependencies` as `(repo_url, constraint)` pairs
pub fn manifest(name: &str, dependencies: &[(&str, &str)]) -> Value {
    let dependencies: Vec<Value> = dependencies
        .iter()
        .map(|(repo_url, version)| json!({ "repo_url": repo_url, "version": version }))
        .collect();
    json!({
        "name": name,
        "description": format!("{} test mod", name),
        "author": "tester",
        "type": "Shared",
        "tags": ["Mutator"],
        "dependencies": dependencies,
    })
}

/// Catalog over in-memory storage with fast retries
pub fn create_test_catalog(storage: Arc<MemoryStorage>, hosting: Arc<FakeHosting>) -> Catalog {
    let mut config = Config::default();
    config.fetch.retry_base_delay_ms = 1;
    config.fetch.max_concurrent_fetches = 2;
    Catalog::with_hosting(storage, hosting, &config)
}
