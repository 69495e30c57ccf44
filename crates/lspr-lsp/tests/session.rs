//! Session behavior against a scripted in-memory server

use lspr_lsp::{
    shutdown_session, Language, LspError, ServerVariant, SessionKey, SessionOptions, SessionState,
};
use lspr_test_support::{fast_options, FakeLanguageServer, FakeReply};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;

fn key() -> SessionKey {
    SessionKey::new(Language::TypeScript, ServerVariant::Default, "/ws/project")
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}

#[tokio::test]
async fn test_handshake_sends_initialize_then_initialized() {
    let server = FakeLanguageServer::new();
    let (session, _connection) = server.connect(key(), fast_options()).await.unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    session.request("test/barrier", Value::Null).await.unwrap();
    assert_eq!(
        server.received_methods(),
        vec!["initialize", "initialized", "test/barrier"]
    );

    let initialize = &server.received_for("initialize")[0];
    assert_eq!(initialize["id"], json!(1));
    assert_eq!(initialize["params"]["rootUri"], json!("file:///ws/project"));
    assert_eq!(
        initialize["params"]["workspaceFolders"][0]["uri"],
        json!("file:///ws/project")
    );
    assert_eq!(
        initialize["params"]["capabilities"]["workspace"]["workspaceEdit"]["documentChanges"],
        json!(true)
    );
    assert!(initialize["params"]["processId"].is_u64());

    let capabilities = session.server_capabilities().unwrap();
    assert!(capabilities.rename_provider.is_some());
}

#[tokio::test]
async fn test_handshake_failure_is_reported() {
    let server = FakeLanguageServer::new().on_request("initialize", |_| FakeReply::Error {
        code: -32603,
        message: "cannot index workspace".to_string(),
    });

    let err = server.connect(key(), fast_options()).await.unwrap_err();
    assert!(matches!(err, LspError::HandshakeFailed { .. }));
    assert!(err.to_string().contains("cannot index workspace"));
}

#[tokio::test]
async fn test_concurrent_requests_each_get_their_own_response() {
    let server = FakeLanguageServer::new()
        .on_request("test/echo", |params| FakeReply::Result(params.clone()));
    let (session, _connection) = server.connect(key(), fast_options()).await.unwrap();

    let requests = (0..10).map(|n| {
        let session = session.clone();
        async move { session.request("test/echo", json!({ "n": n })).await }
    });
    let results = futures::future::join_all(requests).await;

    for (n, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), json!({ "n": n }));
    }
    assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn test_request_ids_are_unique_and_increasing() {
    let server = FakeLanguageServer::new();
    let (session, _connection) = server.connect(key(), fast_options()).await.unwrap();

    session.request("test/a", Value::Null).await.unwrap();
    session.request("test/b", Value::Null).await.unwrap();

    let ids: Vec<i64> = server
        .received()
        .iter()
        .filter_map(|m| m.get("id").and_then(Value::as_i64))
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_null_result_is_success() {
    let server = FakeLanguageServer::new().respond("textDocument/rename", Value::Null);
    let (session, _connection) = server.connect(key(), fast_options()).await.unwrap();

    let result = session.request("textDocument/rename", json!({})).await.unwrap();
    assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn test_error_response_carries_server_message() {
    let server = FakeLanguageServer::new().on_request("textDocument/rename", |_| FakeReply::Error {
        code: -32803,
        message: "The element can't be renamed.".to_string(),
    });
    let (session, _connection) = server.connect(key(), fast_options()).await.unwrap();

    let err = session
        .request("textDocument/rename", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "The element can't be renamed.");
    assert!(matches!(err, LspError::Server { code: -32803, .. }));
}

#[tokio::test]
async fn test_out_of_order_responses_reach_their_requests() {
    let server = FakeLanguageServer::new().on_request("test/slow", |_| FakeReply::Silent);
    let (session, connection) = server.connect(key(), fast_options()).await.unwrap();

    let mut pending = Vec::new();
    for n in 0..3 {
        let session = session.clone();
        pending.push(tokio::spawn(async move {
            session.request("test/slow", json!({ "n": n })).await
        }));
        let expected = n + 1;
        wait_until(|| server.received_for("test/slow").len() == expected).await;
    }
    assert_eq!(session.pending_requests(), 3);

    let ids: Vec<Value> = server
        .received_for("test/slow")
        .iter()
        .map(|m| m["id"].clone())
        .collect();
    for index in [2, 0, 1] {
        connection.send(json!({
            "jsonrpc": "2.0",
            "id": ids[index],
            "result": { "answered": index }
        }));
    }

    for (index, request) in pending.into_iter().enumerate() {
        assert_eq!(request.await.unwrap().unwrap(), json!({ "answered": index }));
    }
    assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn test_error_without_code_rejects_request() {
    let server = FakeLanguageServer::new().on_request("test/slow", |_| FakeReply::Silent);
    let (session, connection) = server.connect(key(), fast_options()).await.unwrap();

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.request("test/slow", Value::Null).await })
    };
    wait_until(|| server.received_for("test/slow").len() == 1).await;
    let id = server.received_for("test/slow")[0]["id"].clone();

    connection.send(json!({"jsonrpc": "2.0", "id": id, "error": {"message": "boom"}}));

    let err = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("rejected before the request timeout")
        .unwrap()
        .unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert!(matches!(err, LspError::Server { code: 0, .. }));
    assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn test_timeout_evicts_pending_entry() {
    let server = FakeLanguageServer::new().on_request("test/slow", |_| FakeReply::Silent);
    let options = SessionOptions {
        request_timeout: Duration::from_millis(100),
        ..fast_options()
    };
    let (session, _connection) = server.connect(key(), options).await.unwrap();

    let err = session.request("test/slow", Value::Null).await.unwrap_err();
    assert!(matches!(
        err,
        LspError::Timeout { ref method, timeout_ms: 100 } if method == "test/slow"
    ));
    assert_eq!(session.pending_requests(), 0);

    // The session keeps working after a timeout.
    assert_eq!(session.request("test/fast", Value::Null).await.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_workspace_configuration_is_answered_with_nulls() {
    let server = FakeLanguageServer::new();
    let (_session, connection) = server.connect(key(), fast_options()).await.unwrap();

    connection.send(json!({
        "jsonrpc": "2.0",
        "id": "cfg-1",
        "method": "workspace/configuration",
        "params": { "items": [{ "section": "typescript" }, { "section": "javascript" }] }
    }));

    wait_until(|| server.received().iter().any(|m| m["id"] == json!("cfg-1"))).await;
    let reply = server
        .received()
        .into_iter()
        .find(|m| m["id"] == json!("cfg-1"))
        .unwrap();
    assert_eq!(reply["result"], json!([null, null]));
}

#[tokio::test]
async fn test_server_requests_get_acknowledged_or_rejected() {
    let server = FakeLanguageServer::new();
    let (_session, connection) = server.connect(key(), fast_options()).await.unwrap();

    connection.send(json!({"jsonrpc": "2.0", "id": 100, "method": "client/registerCapability", "params": {"registrations": []}}));
    connection.send(json!({"jsonrpc": "2.0", "id": 101, "method": "window/workDoneProgress/create", "params": {"token": "t"}}));
    connection.send(json!({"jsonrpc": "2.0", "id": 102, "method": "workspace/workspaceFolders"}));
    connection.send(json!({"jsonrpc": "2.0", "id": 103, "method": "custom/unknown"}));

    wait_until(|| server.received().iter().any(|m| m["id"] == json!(103))).await;
    let reply = |id: i64| {
        server
            .received()
            .into_iter()
            .find(|m| m["id"] == json!(id) && m.get("method").is_none())
            .unwrap()
    };

    assert_eq!(reply(100)["result"], Value::Null);
    assert_eq!(reply(101)["result"], Value::Null);
    assert_eq!(reply(102)["result"][0]["uri"], json!("file:///ws/project"));
    assert_eq!(reply(103)["error"]["code"], json!(-32601));
}

#[tokio::test]
async fn test_notifications_and_unknown_ids_are_ignored() {
    let server = FakeLanguageServer::new();
    let (session, connection) = server.connect(key(), fast_options()).await.unwrap();

    connection.send(json!({"jsonrpc": "2.0", "method": "window/logMessage", "params": {"type": 3, "message": "hello"}}));
    connection.send(json!({"jsonrpc": "2.0", "id": 999, "result": "stray"}));

    assert_eq!(session.request("test/ping", Value::Null).await.unwrap(), Value::Null);
    assert!(session.is_ready());
}

#[tokio::test]
async fn test_server_exit_rejects_pending_and_terminates() {
    let server = FakeLanguageServer::new().on_request("test/slow", |_| FakeReply::Silent);
    let (session, connection) = server.connect(key(), fast_options()).await.unwrap();

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.request("test/slow", Value::Null).await })
    };
    wait_until(|| session.pending_requests() == 1).await;

    connection.close();
    session.wait_terminated().await;

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, LspError::ProcessExited));
    assert_eq!(session.state(), SessionState::Terminated);

    let err = session.request("test/after", Value::Null).await.unwrap_err();
    assert!(matches!(
        err,
        LspError::NotReady {
            state: SessionState::Terminated
        }
    ));
}

#[tokio::test]
async fn test_write_failure_terminates_session() {
    let server = FakeLanguageServer::new();
    let (session, connection) = server.connect(key(), fast_options()).await.unwrap();
    assert!(session.is_ready());

    connection.break_writes();

    let err = session.request("test/a", Value::Null).await.unwrap_err();
    assert!(matches!(err, LspError::WriteFailed { .. }));
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(session.is_terminated());
    assert_eq!(session.pending_requests(), 0);

    let err = session.request("test/b", Value::Null).await.unwrap_err();
    assert!(matches!(
        err,
        LspError::NotReady {
            state: SessionState::Terminated
        }
    ));
}

#[tokio::test]
async fn test_document_sync_opens_once_then_changes() {
    let server = FakeLanguageServer::new();
    let (session, _connection) = server.connect(key(), fast_options()).await.unwrap();
    let uri = "file:///ws/project/src/index.ts";

    session.sync_document(uri, "typescript", "let a = 1;").await.unwrap();
    session.sync_document(uri, "typescript", "let a = 2;").await.unwrap();
    assert!(session.is_document_open(uri));
    assert_eq!(session.document_version(uri), Some(2));

    session.close_document(uri).await.unwrap();
    assert!(!session.is_document_open(uri));
    session.request("test/barrier", Value::Null).await.unwrap();

    let opens = server.received_for("textDocument/didOpen");
    let changes = server.received_for("textDocument/didChange");
    assert_eq!(opens.len(), 1);
    assert_eq!(opens[0]["params"]["textDocument"]["version"], json!(1));
    assert_eq!(opens[0]["params"]["textDocument"]["languageId"], json!("typescript"));
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["params"]["textDocument"]["version"], json!(2));
    assert_eq!(changes[0]["params"]["contentChanges"][0]["text"], json!("let a = 2;"));
    assert_eq!(server.received_for("textDocument/didClose").len(), 1);
}

#[tokio::test]
async fn test_graceful_shutdown_is_idempotent() {
    let server = FakeLanguageServer::new();
    let (session, _connection) = server.connect(key(), fast_options()).await.unwrap();
    let policy = fast_options().shutdown;

    shutdown_session(&session, &policy).await;
    assert_eq!(session.state(), SessionState::Terminated);
    wait_until(|| server.received_for("exit").len() == 1).await;

    shutdown_session(&session, &policy).await;

    assert_eq!(server.received_for("shutdown").len(), 1);
    assert_eq!(server.received_for("exit").len(), 1);
    let methods = server.received_methods();
    let shutdown_at = methods.iter().position(|m| m == "shutdown").unwrap();
    let exit_at = methods.iter().position(|m| m == "exit").unwrap();
    assert!(shutdown_at < exit_at);
}

#[tokio::test]
async fn test_shutdown_of_dead_session_does_not_hang() {
    let server = FakeLanguageServer::new();
    let (session, connection) = server.connect(key(), fast_options()).await.unwrap();

    connection.close();
    session.wait_terminated().await;

    tokio::time::timeout(
        Duration::from_secs(1),
        shutdown_session(&session, &fast_options().shutdown),
    )
    .await
    .expect("shutdown of a dead session returns promptly");
    assert!(server.received_for("shutdown").is_empty());
}
