//! LSP transport and session layer
//!
//! Speaks the Language Server Protocol to external servers over stdio:
//! Content-Length framing, request/response correlation, per-workspace
//! session caching and orderly shutdown.

pub mod correlator;
pub mod documents;
pub mod error;
pub mod framing;
pub mod launch;
pub mod lifecycle;
pub mod message;
pub mod registry;
pub mod session;

pub use correlator::{RequestCorrelator, RequestFailure};
pub use error::{FramingError, LspError, LspResult};
pub use framing::FrameBuffer;
pub use launch::{Language, LaunchSpec, LaunchTable, ServerVariant};
pub use lifecycle::{shutdown_session, ShutdownPolicy};
pub use message::{IncomingMessage, ResponseError, ResponseOutcome};
pub use registry::{ProcessSessionFactory, SessionFactory, SessionRegistry};
pub use session::{LspSession, SessionKey, SessionOptions, SessionState};
