//! Workspace root discovery

use std::path::{Path, PathBuf};

/// Files whose presence marks a project root
const ROOT_MARKERS: &[&str] = &["package.json", ".git"];

/// Nearest ancestor of `file` containing a root marker.
///
/// Falls back to the file's own directory when no ancestor qualifies. The
/// result is always absolute so it can key a session.
pub fn find_workspace_root(file: &Path) -> PathBuf {
    let file = absolute(file);
    let start = file.parent().map(Path::to_path_buf).unwrap_or_else(|| file.clone());

    start
        .ancestors()
        .find(|dir| ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()))
        .map(Path::to_path_buf)
        .unwrap_or(start)
}

/// Resolve a possibly relative path against the current directory
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_package_json_marks_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::create_dir_all(dir.path().join("src/deep")).unwrap();

        let root = find_workspace_root(&dir.path().join("src/deep/file.ts"));
        assert_eq!(root, dir.path());
    }

    #[test]
    fn test_git_directory_marks_root() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();

        let root = find_workspace_root(&dir.path().join("pkg/main.go"));
        assert_eq!(root, dir.path());
    }

    #[test]
    fn test_nearest_marker_wins() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join("packages/app/src")).unwrap();
        fs::write(dir.path().join("packages/app/package.json"), "{}").unwrap();

        let root = find_workspace_root(&dir.path().join("packages/app/src/index.ts"));
        assert_eq!(root, dir.path().join("packages/app"));
    }

    #[test]
    fn test_relative_path_is_made_absolute() {
        let root = find_workspace_root(Path::new("some/relative/file.py"));
        assert!(root.is_absolute());
    }
}
