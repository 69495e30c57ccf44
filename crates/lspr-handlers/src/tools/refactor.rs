//! Moving and extracting functions

use super::{default_language, open_document, parse_args, refresh_documents, zero_based};
use super::{ToolContext, ToolHandler};
use crate::edits::apply_workspace_edit;
use crate::function_text::{extract_function_from_content, remove_function_from_content};
use crate::workspace::absolute;
use async_trait::async_trait;
use lspr_foundation::model::mcp::{McpToolResult, ToolCall};
use lspr_foundation::{path_to_uri, LsprError, LsprResult};
use lspr_lsp::LspSession;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info, warn};

const EXTRACT_FUNCTION_KIND: &str = "refactor.extract.function";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveFunctionArgs {
    source_file: String,
    target_file: String,
    function_name: String,
    line: u32,
    #[serde(default = "default_language")]
    language: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractFunctionArgs {
    file: String,
    start_line: u32,
    #[serde(default)]
    start_character: u32,
    end_line: u32,
    #[serde(default)]
    end_character: u32,
    function_name: String,
    #[serde(default = "default_language")]
    language: String,
}

/// `move_function` and `extract_function`
pub struct RefactorHandler;

#[async_trait]
impl ToolHandler for RefactorHandler {
    fn tool_names(&self) -> &[&str] {
        &["move_function", "extract_function"]
    }

    async fn handle_tool_call(
        &self,
        context: &ToolContext,
        tool_call: &ToolCall,
    ) -> LsprResult<McpToolResult> {
        match tool_call.name.as_str() {
            "move_function" => async { move_function(context, parse_args(tool_call)?).await }
                .await
                .map_err(|e| e.context("Failed to move function")),
            "extract_function" => {
                async { extract_function(context, parse_args(tool_call)?).await }
                    .await
                    .map_err(|e| e.context("Failed to extract function"))
            }
            other => Err(LsprError::not_supported(format!(
                "Unknown refactoring tool: {}",
                other
            ))),
        }
    }
}

async fn move_function(context: &ToolContext, args: MoveFunctionArgs) -> LsprResult<McpToolResult> {
    let source = absolute(Path::new(&args.source_file));
    let target = absolute(Path::new(&args.target_file));
    let session = context.session_for(&args.language, &source).await?;

    let (_, source_text) = open_document(&session, &source).await?;
    let target_text = match tokio::fs::read_to_string(&target).await {
        Ok(text) => {
            open_document(&session, &target).await?;
            text
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(LsprError::io_at(&target, e)),
    };

    let function_text = extract_function_from_content(&source_text, &args.function_name, args.line)
        .ok_or_else(|| {
            LsprError::runtime(format!(
                "Function {} not found at line {}",
                args.function_name, args.line
            ))
        })?;

    let new_source = remove_function_from_content(&source_text, &args.function_name, args.line);
    let new_target = if target_text.is_empty() {
        function_text
    } else {
        format!("{}\n\n{}", target_text, function_text)
    };

    tokio::fs::write(&source, new_source)
        .await
        .map_err(|e| LsprError::io_at(&source, e))?;
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LsprError::io_at(parent, e))?;
    }
    tokio::fs::write(&target, new_target)
        .await
        .map_err(|e| LsprError::io_at(&target, e))?;

    refresh_documents(&session, [&source, &target]).await;
    if !session.is_document_open(&path_to_uri(&target)) {
        open_document(&session, &target).await?;
    }

    info!(
        function = %args.function_name,
        from = %source.display(),
        to = %target.display(),
        "Moved function"
    );
    Ok(McpToolResult::text(format!(
        "Successfully moved function '{}' from {} to {}",
        args.function_name, args.source_file, args.target_file
    )))
}

async fn extract_function(
    context: &ToolContext,
    args: ExtractFunctionArgs,
) -> LsprResult<McpToolResult> {
    let file = absolute(Path::new(&args.file));
    let start_line = zero_based(args.start_line, "startLine")?;
    let end_line = zero_based(args.end_line, "endLine")?;
    let session = context.session_for(&args.language, &file).await?;
    let (uri, _) = open_document(&session, &file).await?;

    let actions = session
        .request(
            "textDocument/codeAction",
            json!({
                "textDocument": { "uri": uri },
                "range": {
                    "start": { "line": start_line, "character": args.start_character },
                    "end": { "line": end_line, "character": args.end_character },
                },
                "context": { "diagnostics": [], "only": [EXTRACT_FUNCTION_KIND] },
            }),
        )
        .await?;

    let Some(action) = first_code_action(&actions) else {
        return Ok(McpToolResult::text(format!(
            "No extract function refactoring available for the selected range in {}. \
             This could be because the range does not contain extractable code or the \
             language server doesn't support this refactoring.",
            args.file
        )));
    };

    let Some(edit) = workspace_edit_for(&session, action).await else {
        return Ok(McpToolResult::text(
            "Extract function code action does not contain workspace edit. \
             The language server may not be configured properly for refactoring operations.",
        ));
    };

    let applied = apply_workspace_edit(&edit).await?;
    refresh_documents(&session, &applied.changed_files).await;

    // The server picks the new function's name; `functionName` is advisory.
    let title = action.get("title").and_then(serde_json::Value::as_str).unwrap_or_default();
    debug!(
        requested_name = %args.function_name,
        title,
        "Applied extract function action"
    );
    info!(
        file = %file.display(),
        start_line = args.start_line,
        end_line = args.end_line,
        files_changed = applied.files_changed(),
        "Extracted function"
    );
    Ok(McpToolResult::text(format!(
        "Successfully extracted function from lines {}-{} in {}",
        args.start_line, args.end_line, args.file
    )))
}

/// First `CodeAction` in a `(Command | CodeAction)[]` response. Bare commands
/// carry a string `command` field and no edit, so they are skipped.
fn first_code_action(actions: &Value) -> Option<&Value> {
    actions
        .as_array()?
        .iter()
        .find(|action| !action.get("command").is_some_and(Value::is_string))
}

/// The action's edit, resolving the action lazily when the server deferred it
async fn workspace_edit_for(session: &LspSession, action: &Value) -> Option<Value> {
    if let Some(edit) = action.get("edit").filter(|edit| !edit.is_null()) {
        return Some(edit.clone());
    }

    match session.request("codeAction/resolve", action.clone()).await {
        Ok(resolved) => resolved.get("edit").filter(|edit| !edit.is_null()).cloned(),
        Err(e) => {
            warn!(error = %e, "codeAction/resolve failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_commands_are_skipped() {
        let actions = json!([
            {"title": "Run", "command": "editor.run"},
            {"title": "Extract to function", "kind": "refactor.extract.function", "edit": {}}
        ]);
        let action = first_code_action(&actions).unwrap();
        assert_eq!(action["title"], "Extract to function");
    }

    #[test]
    fn test_code_action_with_command_object_is_kept() {
        let actions = json!([
            {"title": "Extract", "command": {"title": "follow-up", "command": "x"}}
        ]);
        assert!(first_code_action(&actions).is_some());
    }

    #[test]
    fn test_no_actions() {
        assert!(first_code_action(&Value::Null).is_none());
        assert!(first_code_action(&json!([])).is_none());
    }
}
