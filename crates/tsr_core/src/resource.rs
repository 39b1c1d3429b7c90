//! Byte access keyed by logical resource name.
//!
//! Images referenced by a level are fetched through a `ResourceSource`, so
//! the same loader works against a directory on disk or an in-memory bundle.
//! `exists` is what decides between a textured tileset and the untextured
//! debug fallback.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub trait ResourceSource {
    fn exists(&self, name: &str) -> bool;
    fn read(&self, name: &str) -> Result<Vec<u8>, String>;
}

/// Resolves names relative to a root directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ResourceSource for DirectorySource {
    fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_file()
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, String> {
        let path = self.resolve(name);
        fs::read(&path).map_err(|e| format!("Failed to read resource {}: {e}", path.display()))
    }
}

/// Resources held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entries: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(name.into(), bytes);
    }
}

impl ResourceSource for MemorySource {
    fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, String> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| format!("Resource '{name}' not found"))
    }
}
