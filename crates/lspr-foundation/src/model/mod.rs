//! Wire models

pub mod mcp;
