//! Applying LSP `WorkspaceEdit`s to the filesystem
//!
//! Handles both the `changes` map and the `documentChanges` array (text
//! document edits plus create/rename/delete operations). Positions are
//! UTF-16 code units, as LSP specifies.

use lsp_types::TextEdit;
use lspr_foundation::{uri_to_path, LsprError, LsprResult};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What applying a workspace edit touched
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AppliedEdit {
    /// Files whose text was edited
    pub changed_files: BTreeSet<PathBuf>,
    /// Number of create/rename/delete operations performed
    pub file_operations: usize,
}

impl AppliedEdit {
    pub fn files_changed(&self) -> usize {
        self.changed_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changed_files.is_empty() && self.file_operations == 0
    }
}

/// Apply a `WorkspaceEdit` value. `documentChanges` wins when both forms are
/// present.
pub async fn apply_workspace_edit(edit: &Value) -> LsprResult<AppliedEdit> {
    let mut applied = AppliedEdit::default();

    if let Some(document_changes) = edit.get("documentChanges").and_then(Value::as_array) {
        for change in document_changes {
            apply_document_change(change, &mut applied).await?;
        }
        return Ok(applied);
    }

    if let Some(changes) = edit.get("changes").and_then(Value::as_object) {
        for (uri, edits) in changes {
            let path = uri_to_path(uri)?;
            let edits = parse_text_edits(edits)
                .map_err(|e| LsprError::invalid_request(format!("Invalid edits for {}: {}", uri, e)))?;
            apply_text_edits(&path, &edits).await?;
            applied.changed_files.insert(path);
        }
        return Ok(applied);
    }

    debug!("Workspace edit contained no changes");
    Ok(applied)
}

async fn apply_document_change(change: &Value, applied: &mut AppliedEdit) -> LsprResult<()> {
    match change.get("kind").and_then(Value::as_str) {
        Some("create") => {
            let path = path_field(change, "uri")?;
            let overwrite = option_flag(change, "overwrite");
            let ignore_if_exists = option_flag(change, "ignoreIfExists");
            if path.exists() && (ignore_if_exists || !overwrite) {
                debug!(path = %path.display(), "Create skipped, file exists");
                return Ok(());
            }
            info!(path = %path.display(), "Creating file from workspace edit");
            ensure_parent(&path).await?;
            tokio::fs::write(&path, "")
                .await
                .map_err(|e| LsprError::io_at(&path, e))?;
            applied.file_operations += 1;
        }
        Some("rename") => {
            let old_path = path_field(change, "oldUri")?;
            let new_path = path_field(change, "newUri")?;
            if new_path.exists()
                && (option_flag(change, "ignoreIfExists") || !option_flag(change, "overwrite"))
            {
                debug!(path = %new_path.display(), "Rename skipped, target exists");
                return Ok(());
            }
            info!(
                from = %old_path.display(),
                to = %new_path.display(),
                "Renaming file from workspace edit"
            );
            ensure_parent(&new_path).await?;
            tokio::fs::rename(&old_path, &new_path)
                .await
                .map_err(|e| LsprError::io_at(&old_path, e))?;
            applied.file_operations += 1;
        }
        Some("delete") => {
            let path = path_field(change, "uri")?;
            if !path.exists() {
                if option_flag(change, "ignoreIfNotExists") {
                    return Ok(());
                }
                return Err(LsprError::not_found(path.display().to_string()));
            }
            info!(path = %path.display(), "Deleting file from workspace edit");
            let result = if path.is_dir() {
                if option_flag(change, "recursive") {
                    tokio::fs::remove_dir_all(&path).await
                } else {
                    tokio::fs::remove_dir(&path).await
                }
            } else {
                tokio::fs::remove_file(&path).await
            };
            result.map_err(|e| LsprError::io_at(&path, e))?;
            applied.changed_files.remove(&path);
            applied.file_operations += 1;
        }
        Some(other) => {
            warn!(kind = %other, "Unknown resource operation in workspace edit");
        }
        None => {
            let document = change.get("textDocument").ok_or_else(|| {
                LsprError::invalid_request("Document change has neither 'kind' nor 'textDocument'")
            })?;
            let path = path_field(document, "uri")?;
            let edits = change
                .get("edits")
                .ok_or_else(|| LsprError::invalid_request("Missing 'edits' in TextDocumentEdit"))
                .and_then(|edits| {
                    parse_text_edits(edits).map_err(|e| {
                        LsprError::invalid_request(format!(
                            "Invalid edits for {}: {}",
                            path.display(),
                            e
                        ))
                    })
                })?;
            apply_text_edits(&path, &edits).await?;
            applied.changed_files.insert(path);
        }
    }
    Ok(())
}

/// Apply text edits to a file on disk. A missing file is treated as empty.
pub async fn apply_text_edits(path: &Path, edits: &[TextEdit]) -> LsprResult<()> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            ensure_parent(path).await?;
            String::new()
        }
        Err(e) => return Err(LsprError::io_at(path, e)),
    };

    let updated = apply_edits_to_text(&content, edits);
    debug!(path = %path.display(), edits = edits.len(), "Applying text edits");
    tokio::fs::write(path, updated)
        .await
        .map_err(|e| LsprError::io_at(path, e))
}

/// Apply text edits to an in-memory document.
///
/// Offsets are computed against the original text and edits are applied
/// back to front. Edits sharing a start position keep their array order.
pub fn apply_edits_to_text(text: &str, edits: &[TextEdit]) -> String {
    let mut spans: Vec<(usize, usize, usize, &str)> = edits
        .iter()
        .enumerate()
        .map(|(index, edit)| {
            let start = position_to_offset(text, edit.range.start.line, edit.range.start.character);
            let end = position_to_offset(text, edit.range.end.line, edit.range.end.character);
            (start, end.max(start), index, edit.new_text.as_str())
        })
        .collect();
    spans.sort_by_key(|&(start, _, index, _)| Reverse((start, index)));

    let mut result = text.to_string();
    for (start, end, _, new_text) in spans {
        result.replace_range(start..end, new_text);
    }
    result
}

/// Byte offset of an LSP position (`character` counted in UTF-16 units).
///
/// Positions past the end of a line clamp to the line end; lines past the end
/// of the document clamp to the document end.
pub fn position_to_offset(text: &str, line: u32, character: u32) -> usize {
    let mut line_start = 0;
    for _ in 0..line {
        match text[line_start..].find('\n') {
            Some(newline) => line_start += newline + 1,
            None => return text.len(),
        }
    }

    let mut line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |newline| line_start + newline);
    if text[line_start..line_end].ends_with('\r') {
        line_end -= 1;
    }

    let mut units = 0u32;
    for (offset, ch) in text[line_start..line_end].char_indices() {
        if units >= character {
            return line_start + offset;
        }
        units += ch.len_utf16() as u32;
    }
    line_end
}

fn parse_text_edits(value: &Value) -> Result<Vec<TextEdit>, serde_json::Error> {
    serde_json::from_value(value.clone())
}

fn path_field(value: &Value, field: &str) -> LsprResult<PathBuf> {
    let uri = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| LsprError::invalid_request(format!("Missing '{}' in workspace edit", field)))?;
    uri_to_path(uri)
}

fn option_flag(change: &Value, flag: &str) -> bool {
    change
        .get("options")
        .and_then(|options| options.get(flag))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

async fn ensure_parent(path: &Path) -> LsprResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LsprError::io_at(parent, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lspr_foundation::path_to_uri;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    fn edit(start: (u32, u32), end: (u32, u32), text: &str) -> TextEdit {
        serde_json::from_value(json!({
            "range": {
                "start": {"line": start.0, "character": start.1},
                "end": {"line": end.0, "character": end.1}
            },
            "newText": text
        }))
        .unwrap()
    }

    #[test]
    fn test_position_counts_utf16_units() {
        let text = "let s = \"🌍\"; foo\nbar";
        // The emoji is one char, four bytes and two UTF-16 units.
        let offset = position_to_offset(text, 0, 14);
        assert_eq!(&text[offset..offset + 3], "foo");
    }

    #[test]
    fn test_position_clamps() {
        let text = "ab\r\ncd";
        assert_eq!(position_to_offset(text, 0, 99), 2);
        assert_eq!(position_to_offset(text, 1, 1), 5);
        assert_eq!(position_to_offset(text, 7, 0), text.len());
    }

    #[test]
    fn test_edits_apply_back_to_front() {
        let text = "const oldName = 1;\nconsole.log(oldName);\n";
        let edits = vec![
            edit((0, 6), (0, 13), "newName"),
            edit((1, 12), (1, 19), "newName"),
        ];
        assert_eq!(
            apply_edits_to_text(text, &edits),
            "const newName = 1;\nconsole.log(newName);\n"
        );
    }

    #[test]
    fn test_inserts_at_same_position_keep_order() {
        let edits = vec![edit((0, 0), (0, 0), "a"), edit((0, 0), (0, 0), "b")];
        assert_eq!(apply_edits_to_text("x", &edits), "abx");
    }

    #[test]
    fn test_multiline_replacement() {
        let text = "line1\nline2\nline3\n";
        let edits = vec![edit((0, 2), (2, 2), "X")];
        assert_eq!(apply_edits_to_text(text, &edits), "liXne3\n");
    }

    #[tokio::test]
    async fn test_changes_map_is_applied() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.ts");
        let b = dir.path().join("b.ts");
        std::fs::write(&a, "foo();\n").unwrap();
        std::fs::write(&b, "import { foo } from './a';\n").unwrap();

        let mut changes = serde_json::Map::new();
        changes.insert(
            path_to_uri(&a),
            json!([{"range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 3}}, "newText": "bar"}]),
        );
        changes.insert(
            path_to_uri(&b),
            json!([{"range": {"start": {"line": 0, "character": 9}, "end": {"line": 0, "character": 12}}, "newText": "bar"}]),
        );
        let workspace_edit = json!({ "changes": changes });

        let applied = apply_workspace_edit(&workspace_edit).await.unwrap();
        assert_eq!(applied.files_changed(), 2);
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "bar();\n");
        assert_eq!(
            std::fs::read_to_string(&b).unwrap(),
            "import { bar } from './a';\n"
        );
    }

    #[tokio::test]
    async fn test_document_changes_with_resource_operations() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("old.ts");
        let new = dir.path().join("nested/new.ts");
        let created = dir.path().join("created.ts");
        let doomed = dir.path().join("doomed.ts");
        std::fs::write(&old, "export const x = 1;\n").unwrap();
        std::fs::write(&doomed, "").unwrap();

        let workspace_edit = json!({
            "documentChanges": [
                {"kind": "rename", "oldUri": path_to_uri(&old), "newUri": path_to_uri(&new)},
                {
                    "textDocument": {"uri": path_to_uri(&new), "version": 1},
                    "edits": [{"range": {"start": {"line": 0, "character": 13}, "end": {"line": 0, "character": 14}}, "newText": "y"}]
                },
                {"kind": "create", "uri": path_to_uri(&created)},
                {"kind": "delete", "uri": path_to_uri(&doomed)}
            ]
        });

        let applied = apply_workspace_edit(&workspace_edit).await.unwrap();
        assert_eq!(applied.file_operations, 3);
        assert_eq!(applied.files_changed(), 1);
        assert!(!old.exists());
        assert_eq!(std::fs::read_to_string(&new).unwrap(), "export const y = 1;\n");
        assert!(created.exists());
        assert!(!doomed.exists());
    }

    #[tokio::test]
    async fn test_create_does_not_clobber_existing_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("keep.ts");
        std::fs::write(&file, "content").unwrap();

        let workspace_edit = json!({
            "documentChanges": [{"kind": "create", "uri": path_to_uri(&file)}]
        });
        let applied = apply_workspace_edit(&workspace_edit).await.unwrap();

        assert!(applied.is_empty());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "content");
    }

    #[tokio::test]
    async fn test_empty_edit_touches_nothing() {
        let applied = apply_workspace_edit(&json!({})).await.unwrap();
        assert!(applied.is_empty());
    }
}
