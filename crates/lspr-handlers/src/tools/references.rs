//! Finding references across a workspace

use super::{default_language, open_document, parse_args, zero_based};
use super::{ToolContext, ToolHandler};
use crate::workspace::absolute;
use async_trait::async_trait;
use lspr_foundation::model::mcp::{McpToolResult, ToolCall};
use lspr_foundation::{uri_to_path, LsprError, LsprResult};
use lspr_lsp::{Language, LspSession};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Directories never scanned for source files
const EXCLUDED_DIRS: &[&str] = &["node_modules", "dist", ".git", "target"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindReferencesArgs {
    file: String,
    line: u32,
    #[serde(default)]
    character: u32,
    #[serde(default = "default_language")]
    language: String,
}

/// One reference, reported with a 1-based line and 0-based character
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceLocation {
    pub file: String,
    pub line: u32,
    pub character: u32,
}

/// `find_references`
pub struct ReferencesHandler;

#[async_trait]
impl ToolHandler for ReferencesHandler {
    fn tool_names(&self) -> &[&str] {
        &["find_references"]
    }

    async fn handle_tool_call(
        &self,
        context: &ToolContext,
        tool_call: &ToolCall,
    ) -> LsprResult<McpToolResult> {
        async { find_references(context, parse_args(tool_call)?).await }
            .await
            .map_err(|e| e.context("Failed to find references"))
    }
}

async fn find_references(
    context: &ToolContext,
    args: FindReferencesArgs,
) -> LsprResult<McpToolResult> {
    let file = absolute(Path::new(&args.file));
    let line = zero_based(args.line, "line")?;
    let session = context.session_for(&args.language, &file).await?;

    // Servers only report references in files they know about.
    let opened = open_workspace_files(&session).await?;
    let (uri, _) = open_document(&session, &file).await?;
    debug!(opened, "Synced workspace files before reference search");

    let response = session
        .request(
            "textDocument/references",
            json!({
                "textDocument": { "uri": uri },
                "position": { "line": line, "character": args.character },
                "context": { "includeDeclaration": true },
            }),
        )
        .await?;

    let references = parse_locations(&response);
    info!(
        file = %file.display(),
        count = references.len(),
        "Found references"
    );

    let listing: Vec<String> = references
        .iter()
        .map(|r| format!("{}:{}:{}", r.file, r.line, r.character))
        .collect();
    let text = format!(
        "Found {} references:\n{}",
        references.len(),
        listing.join("\n")
    );

    Ok(McpToolResult::text(text)
        .with_field("count", json!(references.len()))
        .with_field("references", serde_json::to_value(&references)?))
}

/// Convert a `Location[]` response into reference entries
pub fn parse_locations(response: &Value) -> Vec<ReferenceLocation> {
    let Some(locations) = response.as_array() else {
        return Vec::new();
    };

    locations
        .iter()
        .filter_map(|location| {
            let uri = location.get("uri")?.as_str()?;
            let start = location.get("range")?.get("start")?;
            let file = match uri_to_path(uri) {
                Ok(path) => path.display().to_string(),
                Err(_) => uri.to_string(),
            };
            Some(ReferenceLocation {
                file,
                line: start.get("line")?.as_u64()? as u32 + 1,
                character: start.get("character")?.as_u64()? as u32,
            })
        })
        .collect()
}

/// Sync every source file of the session's language under its root
async fn open_workspace_files(session: &LspSession) -> LsprResult<usize> {
    let language = session.key().language;
    let root = session.root().to_path_buf();
    let files = tokio::task::spawn_blocking(move || collect_source_files(&root, language))
        .await
        .map_err(|e| LsprError::runtime(format!("File scan failed: {}", e)))?;

    let mut opened = 0;
    for path in files {
        match open_document(session, &path).await {
            Ok(_) => opened += 1,
            Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable file"),
        }
    }
    Ok(opened)
}

/// Source files for `language` under `root`, skipping build and VCS directories
pub fn collect_source_files(root: &Path, language: Language) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for pattern in language.file_globs() {
        let full = root.join(&pattern);
        let Ok(entries) = glob::glob(&full.to_string_lossy()) else {
            continue;
        };
        files.extend(
            entries
                .flatten()
                .filter(|path| path.is_file() && !is_excluded(root, path)),
        );
    }
    files.sort();
    files.dedup();
    files
}

fn is_excluded(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|component| match component {
            Component::Normal(name) => EXCLUDED_DIRS.iter().any(|dir| name == *dir),
            _ => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_locations_become_one_based_lines() {
        let response = json!([
            {"uri": "file:///ws/a.ts", "range": {"start": {"line": 0, "character": 4}, "end": {"line": 0, "character": 7}}},
            {"uri": "file:///ws/b.ts", "range": {"start": {"line": 9, "character": 0}, "end": {"line": 9, "character": 3}}}
        ]);
        let references = parse_locations(&response);
        assert_eq!(
            references,
            vec![
                ReferenceLocation { file: "/ws/a.ts".into(), line: 1, character: 4 },
                ReferenceLocation { file: "/ws/b.ts".into(), line: 10, character: 0 },
            ]
        );
    }

    #[test]
    fn test_null_response_has_no_references() {
        assert!(parse_locations(&Value::Null).is_empty());
    }

    #[test]
    fn test_source_scan_skips_excluded_directories() {
        let dir = tempdir().unwrap();
        for file in [
            "src/a.ts",
            "src/view.tsx",
            "src/readme.md",
            "node_modules/lib/index.ts",
            "dist/out.ts",
            "target/gen.ts",
        ] {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }

        let files = collect_source_files(dir.path(), Language::TypeScript);
        assert_eq!(
            files,
            vec![dir.path().join("src/a.ts"), dir.path().join("src/view.tsx")]
        );
    }
}
