//! Agent channel tests against a real local socket

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::Span;

use farmctl::agent::{AgentChannel, AgentRequest, Options};
use farmctl::errors::AgentError;

use common::{dead_port, FakeAgentServer, FakeBridge};

fn channel(bridge: Arc<FakeBridge>) -> AgentChannel {
    AgentChannel::new(
        bridge,
        Options {
            timeout: Duration::from_millis(500),
            retry_backoff: Duration::from_millis(10),
            ..Default::default()
        },
        Span::none(),
    )
}

#[tokio::test]
async fn test_stale_binding_is_reforwarded_once() {
    let server = FakeAgentServer::start(|_| Some("OK".to_string())).await;
    let bridge = Arc::new(FakeBridge::new());
    bridge.forward_script.lock().unwrap().push_back(dead_port().await);
    *bridge.forward_port.lock().unwrap() = server.port;

    let agent = channel(bridge.clone());
    agent.ping("dev-1").await.unwrap();

    assert_eq!(bridge.forwards.load(Ordering::SeqCst), 2);
    let binding = agent.binding("dev-1").unwrap();
    assert_eq!(binding.local_port, server.port);
    assert!(binding.last_ok_ms.is_some());
    assert_eq!(server.requests(), vec![r#"{"cmd":"ping"}"#.to_string()]);
}

#[tokio::test]
async fn test_second_failure_is_surfaced() {
    let bridge = Arc::new(FakeBridge::new());
    *bridge.forward_port.lock().unwrap() = dead_port().await;

    let agent = channel(bridge.clone());
    let err = agent.ping("dev-1").await.unwrap_err();

    assert!(err.is_transport(), "{err}");
    assert_eq!(bridge.forwards.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_silent_agent_times_out_after_retry() {
    let server = FakeAgentServer::start(|_| None).await;
    let bridge = Arc::new(FakeBridge::new());
    *bridge.forward_port.lock().unwrap() = server.port;

    let agent = channel(bridge.clone());
    let result = agent
        .send("dev-1", &AgentRequest::Ping, Duration::from_millis(100))
        .await;

    assert!(matches!(result, Err(AgentError::Timeout(_))));
    assert_eq!(bridge.forwards.load(Ordering::SeqCst), 2);
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn test_err_reply_is_not_retried() {
    let server = FakeAgentServer::start(|_| Some("ERR field not editable".to_string())).await;
    let bridge = Arc::new(FakeBridge::new());
    *bridge.forward_port.lock().unwrap() = server.port;

    let agent = channel(bridge.clone());
    let err = agent.text("dev-1", "hello").await.unwrap_err();

    assert_eq!(err.to_string(), "ERR field not editable");
    assert!(err.is_focus_lost());
    assert_eq!(bridge.forwards.load(Ordering::SeqCst), 1);
    assert_eq!(
        server.requests(),
        vec![r#"{"cmd":"text","text":"hello"}"#.to_string()]
    );
}

#[tokio::test]
async fn test_other_reply_is_returned_verbatim() {
    let server = FakeAgentServer::start(|_| Some("pong v2".to_string())).await;
    let bridge = Arc::new(FakeBridge::new());
    *bridge.forward_port.lock().unwrap() = server.port;

    let agent = channel(bridge);
    let reply = agent
        .send("dev-1", &AgentRequest::Ping, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(reply, "pong v2");
}

#[tokio::test]
async fn test_clipboard_is_base64_decoded() {
    // "hello farm"
    let server = FakeAgentServer::start(|_| Some("OK:aGVsbG8gZmFybQ==".to_string())).await;
    let bridge = Arc::new(FakeBridge::new());
    *bridge.forward_port.lock().unwrap() = server.port;

    let agent = channel(bridge);
    assert_eq!(agent.clipboard("dev-1").await.unwrap(), "hello farm");
    assert_eq!(server.requests(), vec![r#"{"cmd":"getClipboard"}"#.to_string()]);
}

#[tokio::test]
async fn test_find_text_flag() {
    let server = FakeAgentServer::start(|request| {
        let found = request.contains("Login");
        Some(format!("OK {}", if found { 1 } else { 0 }))
    })
    .await;
    let bridge = Arc::new(FakeBridge::new());
    *bridge.forward_port.lock().unwrap() = server.port;

    let agent = channel(bridge.clone());
    assert!(agent.find_text("dev-1", "Login").await.unwrap());
    assert!(!agent.find_text("dev-1", "Logout").await.unwrap());

    // The binding is reused between exchanges
    assert_eq!(bridge.forwards.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_input_requests_on_the_wire() {
    let server = FakeAgentServer::start(|_| Some("OK".to_string())).await;
    let bridge = Arc::new(FakeBridge::new());
    *bridge.forward_port.lock().unwrap() = server.port;

    let agent = channel(bridge);
    agent.tap("dev-1", 540, 1200).await.unwrap();
    agent.swipe("dev-1", (10, 20), (30, 40), 250).await.unwrap();
    agent.key("dev-1", "back").await.unwrap();
    agent.text("dev-1", "hi").await.unwrap();

    assert_eq!(
        server.requests(),
        vec![
            r#"{"cmd":"tap","x":540,"y":1200}"#.to_string(),
            r#"{"cmd":"swipe","x1":10,"y1":20,"x2":30,"y2":40,"durationMs":250}"#.to_string(),
            r#"{"cmd":"key","key":"BACK"}"#.to_string(),
            r#"{"cmd":"text","text":"hi"}"#.to_string(),
        ]
    );
}
