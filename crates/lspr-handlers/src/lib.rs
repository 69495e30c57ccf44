//! MCP refactoring tools backed by language servers
//!
//! Each tool resolves the workspace of its file, borrows the matching LSP
//! session from the [`lspr_lsp::SessionRegistry`], keeps the server's view of
//! the documents current and applies the edits it returns.

pub mod edits;
pub mod function_text;
pub mod tool_definitions;
pub mod tool_registry;
pub mod tools;
pub mod workspace;

pub use edits::{apply_workspace_edit, AppliedEdit};
pub use tool_definitions::get_all_tool_definitions;
pub use tool_registry::ToolRegistry;
pub use tools::{ToolContext, ToolHandler};
pub use workspace::find_workspace_root;
