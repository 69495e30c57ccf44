//! Renaming symbols and files

use super::{default_language, open_document, parse_args, refresh_documents, zero_based};
use super::{ToolContext, ToolHandler};
use crate::edits::{apply_workspace_edit, AppliedEdit};
use crate::workspace::absolute;
use async_trait::async_trait;
use lspr_foundation::model::mcp::{McpToolResult, ToolCall};
use lspr_foundation::{path_to_uri, LsprError, LsprResult};
use lspr_lsp::LspSession;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameSymbolArgs {
    file: String,
    line: u32,
    #[serde(default)]
    character: u32,
    new_name: String,
    #[serde(default = "default_language")]
    language: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameFileArgs {
    old_path: String,
    new_path: String,
    #[serde(default = "default_language")]
    language: String,
}

/// `rename_symbol` and `rename_file`
pub struct RenameHandler;

#[async_trait]
impl ToolHandler for RenameHandler {
    fn tool_names(&self) -> &[&str] {
        &["rename_symbol", "rename_file"]
    }

    async fn handle_tool_call(
        &self,
        context: &ToolContext,
        tool_call: &ToolCall,
    ) -> LsprResult<McpToolResult> {
        match tool_call.name.as_str() {
            "rename_symbol" => async { rename_symbol(context, parse_args(tool_call)?).await }
                .await
                .map_err(|e| e.context("Failed to rename symbol")),
            "rename_file" => async { rename_file(context, parse_args(tool_call)?).await }
                .await
                .map_err(|e| e.context("Failed to rename")),
            other => Err(LsprError::not_supported(format!("Unknown rename tool: {}", other))),
        }
    }
}

async fn rename_symbol(context: &ToolContext, args: RenameSymbolArgs) -> LsprResult<McpToolResult> {
    let file = absolute(Path::new(&args.file));
    let line = zero_based(args.line, "line")?;
    let session = context.session_for(&args.language, &file).await?;
    let (uri, _) = open_document(&session, &file).await?;

    let edit = session
        .request(
            "textDocument/rename",
            json!({
                "textDocument": { "uri": uri },
                "position": { "line": line, "character": args.character },
                "newName": args.new_name,
            }),
        )
        .await?;

    if edit.is_null() {
        return Err(LsprError::lsp("No workspace edit returned from LSP server"));
    }

    let applied = apply_workspace_edit(&edit).await?;
    refresh_documents(&session, &applied.changed_files).await;

    info!(
        file = %file.display(),
        new_name = %args.new_name,
        files_changed = applied.files_changed(),
        "Renamed symbol"
    );
    Ok(McpToolResult::text(format!(
        "Successfully renamed symbol to '{}' across {} files",
        args.new_name,
        applied.files_changed()
    )))
}

async fn rename_file(context: &ToolContext, args: RenameFileArgs) -> LsprResult<McpToolResult> {
    let old_path = absolute(Path::new(&args.old_path));
    let new_path = absolute(Path::new(&args.new_path));

    let metadata = tokio::fs::metadata(&old_path)
        .await
        .map_err(|e| LsprError::io_at(&old_path, e))?;
    let is_dir = metadata.is_dir();

    // Import updates must land before the move: their edits address the
    // files at their current locations.
    let prepared = match prepare_rename(context, &args.language, &old_path, &new_path, is_dir).await {
        Ok(prepared) => Some(prepared),
        Err(e) => {
            warn!(
                from = %old_path.display(),
                to = %new_path.display(),
                error = %e,
                "LSP rename unavailable, renaming without import updates"
            );
            None
        }
    };

    if let Some(parent) = new_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LsprError::io_at(parent, e))?;
    }
    tokio::fs::rename(&old_path, &new_path)
        .await
        .map_err(|e| LsprError::io_at(&old_path, e))?;
    info!(from = %old_path.display(), to = %new_path.display(), "Renamed on disk");

    let updated_files = match &prepared {
        Some((session, applied)) => {
            finish_rename(session, &old_path, &new_path, is_dir).await;
            applied.files_changed()
        }
        None => 0,
    };

    let message = if is_dir {
        format!(
            "Successfully renamed directory from {} to {}. Found {} files that may need import updates.",
            args.old_path, args.new_path, updated_files
        )
    } else if prepared.is_some() {
        format!(
            "Successfully renamed file from {} to {}",
            args.old_path, args.new_path
        )
    } else {
        format!(
            "File renamed from {} to {} (LSP rename not available, imports may need manual updates)",
            args.old_path, args.new_path
        )
    };
    Ok(McpToolResult::text(message))
}

/// Ask the server which edits the rename implies and apply them
async fn prepare_rename(
    context: &ToolContext,
    language: &str,
    old_path: &Path,
    new_path: &Path,
    is_dir: bool,
) -> LsprResult<(Arc<LspSession>, AppliedEdit)> {
    let session = context.session_for(language, old_path).await?;
    if !is_dir {
        open_document(&session, old_path).await?;
    }

    let edit = session
        .request(
            "workspace/willRenameFiles",
            json!({ "files": [file_rename(old_path, new_path)] }),
        )
        .await?;

    let applied = if edit.is_null() {
        AppliedEdit::default()
    } else {
        apply_workspace_edit(&edit).await?
    };
    refresh_documents(&session, &applied.changed_files).await;
    Ok((session, applied))
}

/// Tell the server the rename happened and retire the old document
async fn finish_rename(session: &LspSession, old_path: &Path, new_path: &Path, is_dir: bool) {
    if let Err(e) = session
        .notify(
            "workspace/didRenameFiles",
            json!({ "files": [file_rename(old_path, new_path)] }),
        )
        .await
    {
        warn!(error = %e, "Failed to send workspace/didRenameFiles");
    }

    if is_dir {
        return;
    }
    let old_uri = path_to_uri(old_path);
    if session.is_document_open(&old_uri) {
        if let Err(e) = session.close_document(&old_uri).await {
            warn!(uri = %old_uri, error = %e, "Failed to close renamed document");
        }
    }
    if let Err(e) = open_document(session, new_path).await {
        warn!(path = %new_path.display(), error = %e, "Failed to open renamed document");
    }
}

fn file_rename(old_path: &Path, new_path: &Path) -> serde_json::Value {
    json!({
        "oldUri": path_to_uri(old_path),
        "newUri": path_to_uri(new_path),
    })
}
