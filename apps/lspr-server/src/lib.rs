//! lspr server: MCP refactoring tools over stdio, backed by language servers

pub mod cli;
pub mod dispatcher;

pub use dispatcher::RefactorDispatcher;
