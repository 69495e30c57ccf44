//! Throwaway project roots for tool and registry tests

use lspr_foundation::path_to_uri;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A project root under a temp dir, removed on drop
pub struct TestWorkspace {
    root: TempDir,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    pub fn new() -> Self {
        let root = tempfile::Builder::new()
            .prefix("lspr-ws-")
            .tempdir()
            .expect("temp workspace");
        Self { root }
    }

    /// Workspace whose root is found through its `package.json` marker
    pub fn node_project() -> Self {
        let workspace = Self::new();
        workspace.create_file("package.json", r#"{"name": "fixture", "private": true}"#);
        workspace
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn absolute_path(&self, rel: &str) -> PathBuf {
        self.path().join(rel)
    }

    /// `file://` URI of a workspace file, as a language server would send it
    pub fn uri(&self, rel: &str) -> String {
        path_to_uri(&self.absolute_path(rel))
    }

    /// Write a source file, creating missing directories
    pub fn create_file(&self, rel: &str, content: &str) {
        let path = self.absolute_path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture directories");
        }
        fs::write(&path, content).unwrap_or_else(|e| panic!("write {}: {}", path.display(), e));
    }

    pub fn read_file(&self, rel: &str) -> String {
        let path = self.absolute_path(rel);
        fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {}: {}", path.display(), e))
    }

    pub fn file_exists(&self, rel: &str) -> bool {
        self.absolute_path(rel).exists()
    }
}
