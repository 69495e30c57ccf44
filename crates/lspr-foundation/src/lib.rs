//! Foundation layer for lspr
//!
//! Shared error type, the MCP wire model spoken with the host, and helpers
//! for converting between filesystem paths and `file://` URIs.

pub mod error;
pub mod model;
pub mod uri;

pub use error::{LsprError, LsprResult};
pub use uri::{path_to_uri, uri_to_path};
