//! MCP protocol behavior of the refactoring server

use lspr_foundation::model::mcp::{McpMessage, McpNotification, McpRequest};
use lspr_lsp::{LaunchTable, SessionRegistry};
use lspr_server::RefactorDispatcher;
use lspr_test_support::{fast_options, FakeLanguageServer, FakeSessionFactory, TestWorkspace};
use lspr_transport::{serve, McpDispatcher};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn dispatcher(server: FakeLanguageServer) -> (RefactorDispatcher, Arc<FakeSessionFactory>) {
    let factory = Arc::new(FakeSessionFactory::new(server));
    let sessions = SessionRegistry::with_factory(LaunchTable::builtin(), fast_options(), factory.clone());
    (RefactorDispatcher::new(Arc::new(sessions)), factory)
}

fn request(id: i64, method: &str, params: Option<Value>) -> McpMessage {
    McpMessage::Request(McpRequest {
        jsonrpc: "2.0".to_string(),
        id: json!(id),
        method: method.to_string(),
        params,
    })
}

/// Dispatch a request and return the response as JSON
async fn call(dispatcher: &RefactorDispatcher, id: i64, method: &str, params: Option<Value>) -> Value {
    let response = dispatcher
        .dispatch(request(id, method, params))
        .await
        .unwrap()
        .expect("requests are answered");
    serde_json::to_value(response).unwrap()
}

#[tokio::test]
async fn test_initialize_announces_tools_capability() {
    let (dispatcher, _) = dispatcher(FakeLanguageServer::new());

    let response = call(&dispatcher, 1, "initialize", Some(json!({"protocolVersion": "2024-11-05"}))).await;

    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(response["result"]["capabilities"], json!({"tools": {}}));
    assert_eq!(response["result"]["serverInfo"]["name"], "lsp-refactor-server");
}

#[tokio::test]
async fn test_tools_list_returns_five_tools() {
    let (dispatcher, _) = dispatcher(FakeLanguageServer::new());

    let response = call(&dispatcher, 2, "tools/list", None).await;

    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["rename_file", "move_function", "extract_function", "find_references", "rename_symbol"]
    );
    assert_eq!(
        response["result"]["tools"][4]["inputSchema"]["required"],
        json!(["file", "line", "newName"])
    );
}

#[tokio::test]
async fn test_tools_call_runs_tool() {
    let workspace = TestWorkspace::node_project();
    workspace.create_file("a.ts", "export const a = 1;\n");
    let server = FakeLanguageServer::new().respond(
        "textDocument/references",
        json!([{
            "uri": workspace.uri("a.ts"),
            "range": {"start": {"line": 0, "character": 13}, "end": {"line": 0, "character": 14}}
        }]),
    );
    let (dispatcher, factory) = dispatcher(server);

    let response = call(
        &dispatcher,
        3,
        "tools/call",
        Some(json!({
            "name": "find_references",
            "arguments": {"file": workspace.absolute_path("a.ts"), "line": 1, "character": 13}
        })),
    )
    .await;

    let result = &response["result"];
    assert_eq!(result["count"], 1);
    assert!(result.get("isError").is_none());
    assert_eq!(
        result["content"][0]["text"],
        format!("Found 1 references:\n{}:1:13", workspace.absolute_path("a.ts").display())
    );
    assert_eq!(factory.created(), 1);

    dispatcher.sessions().cleanup().await;
    assert!(dispatcher.sessions().is_empty().await);
}

#[tokio::test]
async fn test_tool_failure_is_an_error_result() {
    let (dispatcher, _) = dispatcher(FakeLanguageServer::new());

    let response = call(
        &dispatcher,
        4,
        "tools/call",
        Some(json!({"name": "find_references", "arguments": {"file": "/nowhere/x.rb", "line": 1, "language": "ruby"}})),
    )
    .await;

    assert_eq!(response["result"]["isError"], true);
    assert_eq!(
        response["result"]["content"][0]["text"],
        "Error: Failed to find references: Unsupported language: ruby"
    );
}

#[tokio::test]
async fn test_unknown_tool_is_an_error_result() {
    let (dispatcher, _) = dispatcher(FakeLanguageServer::new());

    let response = call(&dispatcher, 5, "tools/call", Some(json!({"name": "nope"}))).await;

    assert_eq!(response["result"]["isError"], true);
    assert!(response["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .starts_with("Error: Operation not supported: Unknown tool: 'nope'"));
}

#[tokio::test]
async fn test_protocol_errors() {
    let (dispatcher, _) = dispatcher(FakeLanguageServer::new());

    let response = call(&dispatcher, 6, "resources/list", None).await;
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["error"]["message"], "Method not found: resources/list");

    let response = call(&dispatcher, 7, "tools/call", None).await;
    assert_eq!(response["error"]["code"], -32602);

    let response = call(&dispatcher, 8, "tools/call", Some(json!({"arguments": {}}))).await;
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let (dispatcher, _) = dispatcher(FakeLanguageServer::new());

    let response = dispatcher
        .dispatch(McpMessage::Notification(McpNotification {
            jsonrpc: "2.0".to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
        }))
        .await
        .unwrap();

    assert!(response.is_none());
}

#[tokio::test]
async fn test_stdio_session() {
    let (dispatcher, _) = dispatcher(FakeLanguageServer::new());
    let (mut host_in, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, mut host_out) = tokio::io::duplex(256 * 1024);

    host_in
        .write_all(
            concat!(
                "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n",
                "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
                "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n",
            )
            .as_bytes(),
        )
        .await
        .unwrap();
    drop(host_in);

    serve(Arc::new(dispatcher), server_in, server_out).await.unwrap();

    let mut output = String::new();
    host_out.read_to_string(&mut output).await.unwrap();
    let mut responses: Vec<Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    responses.sort_by_key(|r| r["id"].as_i64());

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "lsp-refactor-server");
    assert_eq!(responses[1], json!({"jsonrpc": "2.0", "id": 2, "result": {}}));
}
