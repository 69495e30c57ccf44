//! Tool handlers, grouped by the kind of refactoring they perform

use crate::workspace::find_workspace_root;
use async_trait::async_trait;
use lspr_foundation::model::mcp::{McpToolResult, ToolCall};
use lspr_foundation::{path_to_uri, LsprError, LsprResult};
use lspr_lsp::{LspSession, SessionRegistry};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub mod references;
pub mod refactor;
pub mod rename;

pub use references::ReferencesHandler;
pub use refactor::RefactorHandler;
pub use rename::RenameHandler;

/// A handler responsible for one or more MCP tools
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Names of the tools this handler answers
    fn tool_names(&self) -> &[&str];

    async fn handle_tool_call(
        &self,
        context: &ToolContext,
        tool_call: &ToolCall,
    ) -> LsprResult<McpToolResult>;
}

/// Shared state handed to every tool call
#[derive(Clone)]
pub struct ToolContext {
    pub sessions: Arc<SessionRegistry>,
}

impl ToolContext {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    /// Session serving `language` for the workspace that contains `file`
    pub async fn session_for(&self, language: &str, file: &Path) -> LsprResult<Arc<LspSession>> {
        let root = find_workspace_root(file);
        debug!(language, root = %root.display(), "Resolving LSP session");
        Ok(self.sessions.get_or_create(language, &root, None).await?)
    }
}

pub(crate) fn default_language() -> String {
    "typescript".to_string()
}

/// Deserialize the tool's arguments into its typed parameter struct
pub(crate) fn parse_args<T: DeserializeOwned>(tool_call: &ToolCall) -> LsprResult<T> {
    let arguments = tool_call
        .arguments
        .clone()
        .unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(arguments).map_err(|e| {
        LsprError::invalid_request(format!("Invalid arguments for {}: {}", tool_call.name, e))
    })
}

/// Convert a 1-based line number from tool arguments into an LSP line
pub(crate) fn zero_based(line: u32, parameter: &str) -> LsprResult<u32> {
    line.checked_sub(1)
        .ok_or_else(|| LsprError::invalid_parameter(parameter, format!("{} must be at least 1", parameter)))
}

/// Read `path` and make sure the server holds its current text. Returns the
/// document URI and the text sent.
pub(crate) async fn open_document(session: &LspSession, path: &Path) -> LsprResult<(String, String)> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LsprError::io_at(path, e))?;
    let uri = path_to_uri(path);
    session
        .sync_document(&uri, session.key().language.language_id(), &text)
        .await?;
    Ok((uri, text))
}

/// Push the on-disk text of files changed behind the server's back. Only
/// documents the server already has open are refreshed.
pub(crate) async fn refresh_documents<'a>(
    session: &LspSession,
    paths: impl IntoIterator<Item = &'a PathBuf>,
) {
    for path in paths {
        let uri = path_to_uri(path);
        if !session.is_document_open(&uri) {
            continue;
        }
        let result = match tokio::fs::read_to_string(path).await {
            Ok(text) => session
                .sync_document(&uri, session.key().language.language_id(), &text)
                .await
                .map_err(LsprError::from),
            Err(e) => Err(LsprError::io_at(path, e)),
        };
        if let Err(e) = result {
            debug!(uri = %uri, error = %e, "Could not refresh document after edit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        file: String,
        new_name: String,
        #[serde(default = "default_language")]
        language: String,
    }

    fn call(arguments: Option<Value>) -> ToolCall {
        ToolCall {
            name: "rename_symbol".to_string(),
            arguments,
        }
    }

    #[test]
    fn test_parse_args_applies_defaults() {
        let args: Args =
            parse_args(&call(Some(json!({"file": "a.ts", "newName": "b"})))).unwrap();
        assert_eq!(args.file, "a.ts");
        assert_eq!(args.new_name, "b");
        assert_eq!(args.language, "typescript");
    }

    #[test]
    fn test_parse_args_reports_missing_fields() {
        let err = parse_args::<Args>(&call(None)).unwrap_err();
        assert!(err.to_string().contains("Invalid arguments for rename_symbol"));
    }

    #[test]
    fn test_lines_are_one_based() {
        assert_eq!(zero_based(1, "line").unwrap(), 0);
        assert!(zero_based(0, "line").is_err());
    }
}
