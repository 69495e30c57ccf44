//! A language server session: one process (or stream pair), its I/O tasks
//! and its request correlator

use crate::correlator::{RequestCorrelator, RequestFailure};
use crate::documents::OpenDocuments;
use crate::error::{LspError, LspResult};
use crate::framing::{self, FrameBuffer};
use crate::launch::{Language, LaunchSpec, ServerVariant};
use crate::lifecycle::{self, ShutdownPolicy};
use crate::message::{
    IncomingMessage, JsonRpcNotification, JsonRpcReply, JsonRpcRequest, ResponseError,
};
use lsp_types::ServerCapabilities;
use lspr_config::LspSettings;
use lspr_foundation::path_to_uri;
use serde_json::{json, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

/// Buffer size for the outbound message channel
const CHANNEL_BUFFER_SIZE: usize = 1000;
/// Bytes requested per read from the server's stdout
const READ_CHUNK_SIZE: usize = 8192;
/// Name reported in `clientInfo`
const CLIENT_NAME: &str = "lsp-refactor-server";

/// Lifecycle of a session. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Spawning,
    Handshaking,
    Ready,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Spawning => "spawning",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting down",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Identity of a session in the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub language: Language,
    pub variant: ServerVariant,
    pub root: PathBuf,
}

impl SessionKey {
    pub fn new(language: Language, variant: ServerVariant, root: impl Into<PathBuf>) -> Self {
        Self {
            language,
            variant,
            root: root.into(),
        }
    }

    pub fn root_uri(&self) -> String {
        path_to_uri(&self.root)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.language,
            self.variant,
            self.root.display()
        )
    }
}

/// Timeouts applied to a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub request_timeout: Duration,
    pub init_timeout: Duration,
    pub spawn_grace: Duration,
    pub shutdown: ShutdownPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&LspSettings::default())
    }
}

impl From<&LspSettings> for SessionOptions {
    fn from(settings: &LspSettings) -> Self {
        Self {
            request_timeout: settings.request_timeout(),
            init_timeout: settings.init_timeout(),
            spawn_grace: settings.spawn_grace(),
            shutdown: ShutdownPolicy::from(settings),
        }
    }
}

/// Bytes queued for the writer task
#[derive(Debug)]
struct Outbound {
    bytes: Vec<u8>,
    /// Set for requests so a failed write can reject the right caller
    request_id: Option<i64>,
}

/// A live connection to one language server
pub struct LspSession {
    key: SessionKey,
    server_name: String,
    options: SessionOptions,
    outbound: mpsc::Sender<Outbound>,
    correlator: Arc<RequestCorrelator>,
    state: Arc<watch::Sender<SessionState>>,
    /// `None` for attached sessions and once the process has been reaped
    process: Mutex<Option<Child>>,
    pid: Option<u32>,
    capabilities: OnceLock<ServerCapabilities>,
    pub(crate) documents: OpenDocuments,
}

impl fmt::Debug for LspSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LspSession")
            .field("key", &self.key)
            .field("server", &self.server_name)
            .field("state", &self.state())
            .field("pid", &self.pid)
            .finish()
    }
}

impl LspSession {
    /// Start the server described by `spec` in the session root and run the
    /// `initialize` handshake.
    pub async fn spawn(
        key: SessionKey,
        spec: &LaunchSpec,
        options: SessionOptions,
    ) -> LspResult<Arc<Self>> {
        if !key.root.is_dir() {
            return Err(LspError::SpawnFailed {
                server: spec.server_name.clone(),
                message: format!("workspace root {} is not a directory", key.root.display()),
            });
        }

        debug!(
            command = %spec.command,
            args = ?spec.args,
            root_dir = %key.root.display(),
            "Attempting to spawn LSP server"
        );

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .current_dir(&key.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so shutdown can kill the server's descendants too
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            error!(
                command = %spec.command,
                args = ?spec.args,
                error = %e,
                "Failed to spawn LSP server"
            );
            if e.kind() == std::io::ErrorKind::NotFound {
                LspError::ServerNotFound {
                    server: spec.server_name.clone(),
                    install_hint: spec.install_hint.clone(),
                }
            } else {
                LspError::SpawnFailed {
                    server: spec.server_name.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        debug!(
            command = %spec.command,
            pid = child.id(),
            "LSP server process spawned"
        );

        tokio::time::sleep(options.spawn_grace).await;
        if let Some(status) = child.try_wait()? {
            warn!(
                command = %spec.command,
                exit_status = %status,
                "LSP server exited immediately after startup"
            );
            return Err(LspError::ServerExited {
                server: spec.server_name.clone(),
                status: status.to_string(),
            });
        }

        let missing = |stream: &str| LspError::SpawnFailed {
            server: spec.server_name.clone(),
            message: format!("{} was not captured", stream),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        tokio::spawn(drain_stderr(stderr, spec.server_name.clone()));

        let session = Self::start(
            key,
            spec.server_name.clone(),
            stdout,
            stdin,
            Some(child),
            options,
        );

        if let Err(e) = session.handshake().await {
            lifecycle::force_terminate(&session).await;
            return Err(e);
        }

        Ok(session)
    }

    /// Run a session over an existing stream pair instead of a child process
    pub async fn attach<R, W>(
        key: SessionKey,
        reader: R,
        writer: W,
        options: SessionOptions,
    ) -> LspResult<Arc<Self>>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let server_name = format!("{} language server", key.language);
        let session = Self::start(key, server_name, reader, writer, None, options);

        if let Err(e) = session.handshake().await {
            lifecycle::force_terminate(&session).await;
            return Err(e);
        }

        Ok(session)
    }

    fn start<R, W>(
        key: SessionKey,
        server_name: String,
        reader: R,
        writer: W,
        child: Option<Child>,
        options: SessionOptions,
    ) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let correlator = Arc::new(RequestCorrelator::new());
        let (state, _) = watch::channel(SessionState::Spawning);
        let state = Arc::new(state);

        tokio::spawn(write_loop(
            writer,
            outbound_rx,
            correlator.clone(),
            state.clone(),
            server_name.clone(),
        ));

        // The reader owns the output stream; no second reader can attach.
        tokio::spawn(read_loop(
            reader,
            ReaderContext {
                correlator: correlator.clone(),
                outbound: outbound.clone(),
                state: state.clone(),
                root: key.root.clone(),
                server_name: server_name.clone(),
            },
        ));

        let pid = child.as_ref().and_then(Child::id);

        Arc::new(Self {
            key,
            server_name,
            options,
            outbound,
            correlator,
            state,
            process: Mutex::new(child),
            pid,
            capabilities: OnceLock::new(),
            documents: OpenDocuments::default(),
        })
    }

    async fn handshake(&self) -> LspResult<()> {
        transition(&self.state, SessionState::Handshaking);

        self.initialize()
            .await
            .map_err(|e| LspError::HandshakeFailed {
                server: self.server_name.clone(),
                message: e.to_string(),
            })?;

        info!(session = %self.key, pid = self.pid, "LSP session ready");
        Ok(())
    }

    async fn initialize(&self) -> LspResult<()> {
        let result = self
            .send_request("initialize", self.initialize_params(), self.options.init_timeout)
            .await?;

        if let Some(capabilities) = result.get("capabilities") {
            match serde_json::from_value::<ServerCapabilities>(capabilities.clone()) {
                Ok(capabilities) => {
                    let _ = self.capabilities.set(capabilities);
                }
                Err(e) => debug!(error = %e, "Could not parse server capabilities"),
            }
        }

        self.send_notification("initialized", json!({})).await?;

        if !transition(&self.state, SessionState::Ready) {
            return Err(LspError::ProcessExited);
        }
        Ok(())
    }

    fn initialize_params(&self) -> Value {
        let root_uri = self.key.root_uri();
        json!({
            "processId": std::process::id(),
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "rootUri": root_uri,
            "workspaceFolders": [{
                "uri": root_uri,
                "name": folder_name(&self.key.root)
            }],
            "capabilities": {
                "textDocument": {
                    "synchronization": {
                        "dynamicRegistration": false,
                        "didSave": false
                    },
                    "rename": { "dynamicRegistration": false, "prepareSupport": false },
                    "references": { "dynamicRegistration": false },
                    "codeAction": {
                        "dynamicRegistration": false,
                        "codeActionLiteralSupport": {
                            "codeActionKind": {
                                "valueSet": [
                                    "refactor",
                                    "refactor.extract",
                                    "refactor.extract.function",
                                    "refactor.move"
                                ]
                            }
                        },
                        "resolveSupport": { "properties": ["edit"] }
                    }
                },
                "workspace": {
                    "workspaceEdit": {
                        "documentChanges": true,
                        "resourceOperations": ["create", "rename", "delete"]
                    },
                    "workspaceFolders": true,
                    "configuration": true,
                    "fileOperations": {
                        "willRename": true,
                        "didRename": true
                    }
                }
            }
        })
    }

    /// Send a request and wait for its result. Only accepted once the
    /// handshake has completed.
    pub async fn request(&self, method: &str, params: Value) -> LspResult<Value> {
        self.ensure_ready()?;
        self.send_request(method, params, self.options.request_timeout)
            .await
    }

    /// Send a notification. Only accepted once the handshake has completed.
    pub async fn notify(&self, method: &str, params: Value) -> LspResult<()> {
        self.ensure_ready()?;
        self.send_notification(method, params).await
    }

    fn ensure_ready(&self) -> LspResult<()> {
        match self.state() {
            SessionState::Ready => Ok(()),
            state => Err(LspError::NotReady { state }),
        }
    }

    pub(crate) async fn send_request(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> LspResult<Value> {
        let pending = self.correlator.register();
        let id = pending.id();

        let bytes = match framing::encode(&JsonRpcRequest::new(id, method, params)) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.correlator.cancel(id);
                return Err(e.into());
            }
        };

        debug!(lsp_method = %method, lsp_request_id = id, "Sending LSP request");

        let message = Outbound {
            bytes,
            request_id: Some(id),
        };
        if self.outbound.send(message).await.is_err() {
            self.correlator.cancel(id);
            return Err(LspError::ChannelClosed);
        }

        let start_time = Instant::now();
        match timeout(deadline, pending.into_receiver()).await {
            Ok(Ok(Ok(result))) => {
                debug!(
                    lsp_method = %method,
                    lsp_request_id = id,
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    "Received LSP response"
                );
                Ok(result)
            }
            Ok(Ok(Err(failure))) => {
                debug!(
                    lsp_method = %method,
                    lsp_request_id = id,
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    failure = ?failure,
                    "LSP request failed"
                );
                Err(failure.into_error())
            }
            Ok(Err(_)) => Err(LspError::ChannelClosed),
            Err(_) => {
                self.correlator.cancel(id);
                warn!(
                    lsp_method = %method,
                    lsp_request_id = id,
                    timeout_ms = deadline.as_millis() as u64,
                    "LSP request timeout"
                );
                Err(LspError::Timeout {
                    method: method.to_string(),
                    timeout_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    pub(crate) async fn send_notification(&self, method: &str, params: Value) -> LspResult<()> {
        let bytes = framing::encode(&JsonRpcNotification::new(method, params))?;
        self.outbound
            .send(Outbound {
                bytes,
                request_id: None,
            })
            .await
            .map_err(|_| LspError::ChannelClosed)?;
        debug!(lsp_method = %method, "Sent LSP notification");
        Ok(())
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn root(&self) -> &Path {
        &self.key.root
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == SessionState::Terminated
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Resolve once the session reaches `Terminated`
    pub async fn wait_terminated(&self) {
        let mut receiver = self.state.subscribe();
        let _ = receiver
            .wait_for(|state| *state == SessionState::Terminated)
            .await;
    }

    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Capabilities announced in the `initialize` result
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.capabilities.get()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub(crate) fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Move to `ShuttingDown`. Returns `false` if the session already terminated.
    pub(crate) fn begin_shutdown(&self) -> bool {
        transition(&self.state, SessionState::ShuttingDown);
        self.state() == SessionState::ShuttingDown
    }

    /// Final transition: reject everything still pending
    pub(crate) fn mark_terminated(&self) {
        transition(&self.state, SessionState::Terminated);
        let rejected = self.correlator.fail_all(RequestFailure::ProcessExited);
        if rejected > 0 {
            debug!(session = %self.key, rejected, "Rejected pending LSP requests on shutdown");
        }
    }

    pub(crate) async fn take_process(&self) -> Option<Child> {
        self.process.lock().await.take()
    }
}

impl Drop for LspSession {
    fn drop(&mut self) {
        if let Some(child) = self.process.get_mut().as_mut() {
            warn!(
                session = %self.key,
                pid = self.pid,
                "LspSession dropped without shutdown, killing server process"
            );
            if let Err(e) = child.start_kill() {
                debug!(pid = self.pid, error = %e, "Failed to kill LSP server process on drop");
            }
        }
    }
}

/// Move the state forward. Returns whether the state changed.
fn transition(state: &watch::Sender<SessionState>, next: SessionState) -> bool {
    state.send_if_modified(|current| {
        if next > *current {
            trace!(from = %current, to = %next, "LSP session state change");
            *current = next;
            true
        } else {
            false
        }
    })
}

/// Ids are allocated as integers; some servers echo them back as strings.
fn response_id(id: &Value) -> Option<i64> {
    id.as_i64()
        .or_else(|| id.as_str().and_then(|text| text.parse().ok()))
}

fn folder_name(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Outbound>,
    correlator: Arc<RequestCorrelator>,
    state: Arc<watch::Sender<SessionState>>,
    server_name: String,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        let result = async {
            writer.write_all(&message.bytes).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            error!(
                error_category = "lsp_communication",
                server = %server_name,
                error = %e,
                "Failed to write to LSP server"
            );
            // Nothing queued behind this message can reach the server either.
            transition(&state, SessionState::Terminated);
            let rejected = correlator.fail_all(RequestFailure::WriteFailed(e.to_string()));
            debug!(
                server = %server_name,
                request_id = ?message.request_id,
                rejected,
                "Rejected pending LSP requests after write failure"
            );
            break;
        }
    }
    trace!(server = %server_name, "LSP writer task ended");
}

struct ReaderContext {
    correlator: Arc<RequestCorrelator>,
    outbound: mpsc::Sender<Outbound>,
    state: Arc<watch::Sender<SessionState>>,
    root: PathBuf,
    server_name: String,
}

async fn read_loop<R>(mut reader: R, ctx: ReaderContext)
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!(server = %ctx.server_name, "LSP server stdout closed");
                break;
            }
            Ok(n) => {
                frames.extend(&chunk[..n]);
                while let Some(frame) = frames.next_frame() {
                    match frame {
                        Ok(message) => ctx.dispatch(message).await,
                        Err(e) => warn!(
                            error_category = "lsp_communication",
                            server = %ctx.server_name,
                            error = %e,
                            "Discarding malformed LSP frame"
                        ),
                    }
                }
            }
            Err(e) => {
                error!(
                    error_category = "lsp_communication",
                    server = %ctx.server_name,
                    error = %e,
                    "Failed to read from LSP server"
                );
                break;
            }
        }
    }

    transition(&ctx.state, SessionState::Terminated);
    let rejected = ctx.correlator.fail_all(RequestFailure::ProcessExited);
    if rejected > 0 {
        warn!(
            server = %ctx.server_name,
            rejected,
            "LSP server went away with requests outstanding"
        );
    }
}

impl ReaderContext {
    async fn dispatch(&self, message: Value) {
        match IncomingMessage::classify(message) {
            Ok(IncomingMessage::Response { id, outcome }) => match response_id(&id) {
                Some(id) => {
                    self.correlator.resolve(id, outcome);
                }
                None => debug!(id = %id, "Ignoring response with non-numeric id"),
            },
            Ok(IncomingMessage::Request { id, method, params }) => {
                let reply = self.reply_to(id, &method, &params);
                match framing::encode(&reply) {
                    Ok(bytes) => {
                        let message = Outbound {
                            bytes,
                            request_id: None,
                        };
                        if self.outbound.send(message).await.is_err() {
                            debug!(lsp_method = %method, "Writer closed before reply could be sent");
                        }
                    }
                    Err(e) => error!(lsp_method = %method, error = %e, "Failed to encode reply"),
                }
            }
            Ok(IncomingMessage::Notification { method, params }) => match method.as_str() {
                "window/logMessage" | "window/showMessage" => {
                    let text = params
                        .get("message")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default();
                    debug!(server = %self.server_name, message = %text, "LSP server message")
                }
                _ => trace!(lsp_method = %method, "Ignoring LSP notification"),
            },
            Err(e) => warn!(
                error_category = "lsp_communication",
                error = %e,
                "Unrecognized message from LSP server"
            ),
        }
    }

    /// Answer a server-initiated request
    fn reply_to(&self, id: Value, method: &str, params: &Value) -> JsonRpcReply {
        debug!(lsp_method = %method, "Handling server request");
        match method {
            "workspace/configuration" => {
                let items = params
                    .get("items")
                    .and_then(Value::as_array)
                    .map(Vec::len)
                    .unwrap_or(0);
                JsonRpcReply::success(id, Value::Array(vec![Value::Null; items]))
            }
            "client/registerCapability"
            | "client/unregisterCapability"
            | "window/workDoneProgress/create" => JsonRpcReply::success(id, Value::Null),
            "workspace/workspaceFolders" => JsonRpcReply::success(
                id,
                json!([{
                    "uri": path_to_uri(&self.root),
                    "name": folder_name(&self.root)
                }]),
            ),
            _ => {
                warn!(lsp_method = %method, "Received unsupported server request");
                JsonRpcReply::failure(id, ResponseError::method_not_found(method))
            }
        }
    }
}

async fn drain_stderr(stderr: ChildStderr, server_name: String) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let lower = trimmed.to_ascii_lowercase();
                if lower.contains("error") || lower.contains("panic") || lower.contains("fatal") {
                    warn!(server = %server_name, stderr = %trimmed, "LSP stderr");
                } else {
                    debug!(server = %server_name, stderr = %trimmed, "LSP stderr");
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(server = %server_name, error = %e, "Stopped reading LSP stderr");
                break;
            }
        }
    }
}
