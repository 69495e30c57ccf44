//! Conversion between filesystem paths and `file://` URIs

use crate::error::{LsprError, LsprResult};
use std::path::{Path, PathBuf};
use url::Url;

/// Convert a path into a `file://` URI. Relative paths are resolved against
/// the current directory first.
pub fn path_to_uri(path: &Path) -> String {
    if let Ok(url) = Url::from_file_path(path) {
        return url.into();
    }

    let absolute = std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf());
    match Url::from_file_path(&absolute) {
        Ok(url) => url.into(),
        Err(()) => format!("file://{}", absolute.display()),
    }
}

/// Convert a `file://` URI back into a filesystem path
pub fn uri_to_path(uri: &str) -> LsprResult<PathBuf> {
    let url = Url::parse(uri)
        .map_err(|e| LsprError::invalid_request(format!("Invalid URI '{}': {}", uri, e)))?;

    if url.scheme() != "file" {
        return Err(LsprError::invalid_request(format!(
            "Unsupported URI scheme: {}",
            uri
        )));
    }

    url.to_file_path()
        .map_err(|()| LsprError::invalid_request(format!("URI is not a local file path: {}", uri)))
}
