//! A scripted in-memory language server for session and tool tests

use async_trait::async_trait;
use lspr_lsp::framing;
use lspr_lsp::{
    FrameBuffer, LaunchSpec, LspError, LspResult, LspSession, SessionFactory, SessionKey,
    SessionOptions,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};

/// What the fake server answers to a request
#[derive(Debug, Clone)]
pub enum FakeReply {
    Result(Value),
    Error { code: i64, message: String },
    /// Never answer (for timeout tests)
    Silent,
}

type Handler = Arc<dyn Fn(&Value) -> FakeReply + Send + Sync>;

/// Scripted language server. Unscripted requests are answered with `null`;
/// `initialize` and `shutdown` have sensible defaults.
#[derive(Clone, Default)]
pub struct FakeLanguageServer {
    handlers: Arc<Mutex<HashMap<String, Handler>>>,
    log: Arc<Mutex<Vec<Value>>>,
}

impl FakeLanguageServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` with the reply computed from the request params
    pub fn on_request<F>(self, method: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> FakeReply + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .insert(method.to_string(), Arc::new(handler));
        self
    }

    /// Answer `method` with a fixed result
    pub fn respond(self, method: &str, result: Value) -> Self {
        self.on_request(method, move |_| FakeReply::Result(result.clone()))
    }

    /// Every message the client has sent, in arrival order
    pub fn received(&self) -> Vec<Value> {
        self.log.lock().unwrap().clone()
    }

    /// Methods of every request or notification received, in order
    pub fn received_methods(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|m| m.get("method").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// Messages received for `method`
    pub fn received_for(&self, method: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|m| m.get("method").and_then(Value::as_str) == Some(method))
            .collect()
    }

    /// Start serving over a fresh duplex pipe and attach a session to it
    pub async fn connect(
        &self,
        key: SessionKey,
        options: SessionOptions,
    ) -> LspResult<(Arc<LspSession>, FakeConnection)> {
        let (client, server) = tokio::io::duplex(256 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let (inject_tx, inject_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        tokio::spawn(serve(
            self.clone(),
            server_read,
            server_write,
            inject_rx,
            close_rx,
        ));

        let broken = Arc::new(AtomicBool::new(false));
        let connection = FakeConnection {
            inject: inject_tx,
            close: Arc::new(Mutex::new(Some(close_tx))),
            broken: broken.clone(),
        };
        let client_write = BreakableWriter {
            inner: client_write,
            broken,
        };
        let session = LspSession::attach(key, client_read, client_write, options).await?;
        Ok((session, connection))
    }

    fn reply_for(&self, method: &str, params: &Value) -> FakeReply {
        let handler = self.handlers.lock().unwrap().get(method).cloned();
        match handler {
            Some(handler) => handler(params),
            None => match method {
                "initialize" => FakeReply::Result(json!({
                    "capabilities": {
                        "renameProvider": true,
                        "referencesProvider": true,
                        "codeActionProvider": true
                    },
                    "serverInfo": { "name": "fake-language-server" }
                })),
                _ => FakeReply::Result(Value::Null),
            },
        }
    }
}

/// Handle to one fake server connection. Dropping it closes the connection.
#[derive(Clone, Debug)]
pub struct FakeConnection {
    inject: mpsc::UnboundedSender<Value>,
    close: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    broken: Arc<AtomicBool>,
}

impl FakeConnection {
    /// Send a raw message from the server to the client
    pub fn send(&self, message: Value) {
        let _ = self.inject.send(message);
    }

    /// Simulate the server process dying
    pub fn close(&self) {
        if let Some(close) = self.close.lock().unwrap().take() {
            let _ = close.send(());
        }
    }

    /// Fail every later client write, as if the server's stdin pipe broke
    pub fn break_writes(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

/// Client-side writer that starts failing once its connection is broken
struct BreakableWriter {
    inner: WriteHalf<DuplexStream>,
    broken: Arc<AtomicBool>,
}

impl BreakableWriter {
    fn check(&self) -> std::io::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe"))
        } else {
            Ok(())
        }
    }
}

impl AsyncWrite for BreakableWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if let Err(e) = self.check() {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        if let Err(e) = self.check() {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

async fn serve(
    server: FakeLanguageServer,
    mut reader: ReadHalf<DuplexStream>,
    mut writer: WriteHalf<DuplexStream>,
    mut inject: mpsc::UnboundedReceiver<Value>,
    mut close: oneshot::Receiver<()>,
) {
    let mut frames = FrameBuffer::new();
    let mut chunk = vec![0u8; 4096];

    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => {
                let n = match read {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                frames.extend(&chunk[..n]);
                while let Some(Ok(message)) = frames.next_frame() {
                    server.log.lock().unwrap().push(message.clone());

                    let method = message.get("method").and_then(Value::as_str).map(str::to_string);
                    let id = message.get("id").cloned();
                    match (method.as_deref(), id) {
                        (Some("exit"), None) => return,
                        (Some(method), Some(id)) => {
                            let params = message.get("params").cloned().unwrap_or(Value::Null);
                            let response = match server.reply_for(method, &params) {
                                FakeReply::Result(result) => {
                                    json!({"jsonrpc": "2.0", "id": id, "result": result})
                                }
                                FakeReply::Error { code, message } => json!({
                                    "jsonrpc": "2.0",
                                    "id": id,
                                    "error": {"code": code, "message": message}
                                }),
                                FakeReply::Silent => continue,
                            };
                            if write(&mut writer, &response).await.is_err() {
                                return;
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some(message) = inject.recv() => {
                if write(&mut writer, &message).await.is_err() {
                    return;
                }
            }
            _ = &mut close => return,
        }
    }
}

async fn write(writer: &mut WriteHalf<DuplexStream>, message: &Value) -> std::io::Result<()> {
    let bytes = framing::encode(message).expect("test message serializes");
    writer.write_all(&bytes).await?;
    writer.flush().await
}

/// Session factory backed by [`FakeLanguageServer`]
pub struct FakeSessionFactory {
    server: FakeLanguageServer,
    created: AtomicUsize,
    failures_remaining: AtomicUsize,
    delay: Duration,
    connections: Mutex<Vec<FakeConnection>>,
}

impl FakeSessionFactory {
    pub fn new(server: FakeLanguageServer) -> Self {
        Self {
            server,
            created: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
            delay: Duration::ZERO,
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Wait this long before each creation, widening race windows
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next `count` creations as if the executable were missing
    pub fn failing(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Number of creation attempts that reached the factory
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn server(&self) -> &FakeLanguageServer {
        &self.server
    }

    /// Connections opened so far, in creation order
    pub fn connections(&self) -> Vec<FakeConnection> {
        self.connections.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn create(
        &self,
        key: &SessionKey,
        spec: &LaunchSpec,
        options: &SessionOptions,
    ) -> LspResult<Arc<LspSession>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(LspError::ServerNotFound {
                server: spec.server_name.clone(),
                install_hint: spec.install_hint.clone(),
            });
        }

        let (session, connection) = self.server.connect(key.clone(), options.clone()).await?;
        self.connections.lock().unwrap().push(connection);
        Ok(session)
    }
}
