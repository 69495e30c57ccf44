//! Registry of live sessions keyed by (language, variant, workspace root)

use crate::error::LspResult;
use crate::launch::{LaunchSpec, LaunchTable};
use crate::lifecycle::shutdown_session;
use crate::session::{LspSession, SessionKey, SessionOptions};
use async_trait::async_trait;
use futures::future::join_all;
use lspr_config::LspSettings;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

/// Creates sessions for the registry
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        key: &SessionKey,
        spec: &LaunchSpec,
        options: &SessionOptions,
    ) -> LspResult<Arc<LspSession>>;
}

/// Spawns a real language server process per session
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSessionFactory;

#[async_trait]
impl SessionFactory for ProcessSessionFactory {
    async fn create(
        &self,
        key: &SessionKey,
        spec: &LaunchSpec,
        options: &SessionOptions,
    ) -> LspResult<Arc<LspSession>> {
        LspSession::spawn(key.clone(), spec, options.clone()).await
    }
}

/// Slot for one key. Concurrent first users wait on the same cell, so a
/// server is started at most once per key.
type SessionSlot = Arc<OnceCell<Arc<LspSession>>>;

/// Owns every session. At most one live session exists per key.
pub struct SessionRegistry {
    launch_table: LaunchTable,
    options: SessionOptions,
    factory: Arc<dyn SessionFactory>,
    sessions: Mutex<HashMap<SessionKey, SessionSlot>>,
}

impl SessionRegistry {
    /// Registry that spawns real server processes
    pub fn new(launch_table: LaunchTable, options: SessionOptions) -> Self {
        Self::with_factory(launch_table, options, Arc::new(ProcessSessionFactory))
    }

    pub fn with_factory(
        launch_table: LaunchTable,
        options: SessionOptions,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            launch_table,
            options,
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Registry built from configuration: built-in table plus overrides
    pub fn from_settings(settings: &LspSettings) -> LspResult<Self> {
        let launch_table = LaunchTable::builtin().with_overrides(&settings.servers)?;
        Ok(Self::new(launch_table, SessionOptions::from(settings)))
    }

    pub fn launch_table(&self) -> &LaunchTable {
        &self.launch_table
    }

    /// Return the ready session for (language, variant, root), starting one
    /// if none is live.
    ///
    /// Unsupported languages fail before anything is started. A failed start
    /// leaves nothing cached, so the next call tries again.
    pub async fn get_or_create(
        &self,
        language: &str,
        root: &Path,
        variant: Option<&str>,
    ) -> LspResult<Arc<LspSession>> {
        let resolved = self.launch_table.resolve(language, variant)?;
        let key = SessionKey::new(resolved.language, resolved.variant, root);

        let slot = {
            let mut sessions = self.sessions.lock().await;

            let stale = sessions
                .get(&key)
                .and_then(|slot| slot.get())
                .filter(|session| session.is_terminated())
                .cloned();
            if let Some(stale) = stale {
                info!(session = %key, "Replacing terminated LSP session");
                sessions.remove(&key);
                let policy = self.options.shutdown;
                // Reap the dead process off the caller's path.
                tokio::spawn(async move { shutdown_session(&stale, &policy).await });
            }

            sessions
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = slot
            .get_or_try_init(|| async {
                info!(
                    session = %key,
                    command = %resolved.spec.command,
                    "Starting LSP session"
                );
                self.factory
                    .create(&key, &resolved.spec, &self.options)
                    .await
            })
            .await
            .cloned();

        match result {
            Ok(session) => Ok(session),
            Err(e) => {
                let mut sessions = self.sessions.lock().await;
                // Other callers holding the slot retry the start on this same
                // cell, so it must stay reachable until the last of them fails.
                let abandoned = sessions.get(&key).is_some_and(|current| {
                    Arc::ptr_eq(current, &slot)
                        && !current.initialized()
                        && Arc::strong_count(&slot) == 2
                });
                if abandoned {
                    sessions.remove(&key);
                }
                drop(slot);
                drop(sessions);
                debug!(session = %key, error = %e, "LSP session could not be started");
                Err(e)
            }
        }
    }

    /// Shut down every session and empty the registry.
    ///
    /// The registry is drained before any shutdown starts, so a second call
    /// finds nothing to do. Sessions are shut down concurrently.
    pub async fn cleanup(&self) {
        let drained: Vec<SessionSlot> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, slot)| slot).collect()
        };

        let live: Vec<Arc<LspSession>> = drained
            .iter()
            .filter_map(|slot| slot.get().cloned())
            .collect();

        if live.is_empty() {
            debug!("No LSP sessions to clean up");
            return;
        }

        info!(count = live.len(), "Shutting down LSP sessions");
        let policy = self.options.shutdown;
        join_all(live.iter().map(|session| shutdown_session(session, &policy))).await;
        info!("All LSP sessions shut down");
    }

    /// Number of cached sessions, including ones still starting
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<SessionKey> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    pub async fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.lock().await.contains_key(key)
    }
}
