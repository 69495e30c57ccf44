//! Test support utilities for lspr integration tests

pub mod fake_server;
pub mod workspace;

pub use fake_server::{FakeConnection, FakeLanguageServer, FakeReply, FakeSessionFactory};
pub use workspace::TestWorkspace;

use lspr_lsp::{SessionOptions, ShutdownPolicy};
use std::time::Duration;

/// Session options with short deadlines so failing tests fail fast
pub fn fast_options() -> SessionOptions {
    SessionOptions {
        request_timeout: Duration::from_secs(5),
        init_timeout: Duration::from_secs(5),
        spawn_grace: Duration::from_millis(100),
        shutdown: ShutdownPolicy {
            request_timeout: Duration::from_millis(500),
            exit_grace: Duration::from_millis(200),
            kill_timeout: Duration::from_secs(2),
        },
    }
}
