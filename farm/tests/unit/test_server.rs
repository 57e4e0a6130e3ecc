//! Control API tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use farmctl::app::options::AppOptions;
use farmctl::app::state::AppState;
use farmctl::library::{Group, MemoryLibrary};
use farmctl::macros::{MacroDefinition, Step, StepAction};
use farmctl::registry::DeviceRegistry;
use farmctl::server::serve::router;
use farmctl::server::state::ServerState;

use common::FakeBridge;

struct Api {
    bridge: Arc<FakeBridge>,
    registry: Arc<DeviceRegistry>,
    router: Router,
}

impl Api {
    async fn new(ids: &[&str]) -> Self {
        let bridge = Arc::new(FakeBridge::online(ids));
        let library = Arc::new(MemoryLibrary::new());
        library.insert_group(Group::new("g1", ids.to_vec()));
        library.insert_macro(MacroDefinition::new(
            "home",
            vec![Step::new(StepAction::Key { key: "home".into() }, 0)],
        ));

        let mut options = AppOptions::default();
        options.fanout.stagger_base = Duration::ZERO;
        options.fanout.stagger_jitter = Duration::ZERO;
        // No agent listens in these tests; fail its checks quickly
        options.agent.retry_backoff = Duration::ZERO;
        options.agent.timeout = Duration::from_millis(100);

        let app_state = AppState::with_components(&options, bridge.clone(), library.clone(), library);
        let api = Self {
            bridge,
            registry: app_state.registry.clone(),
            router: router(Arc::new(ServerState::from_app(&app_state))),
        };
        api.registry.poll().await;
        api.drain().await;
        api
    }

    async fn drain(&self) {
        for device in self.registry.devices() {
            device.queue().enqueue(|| async { Ok(()) }).unwrap().await.unwrap();
        }
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

#[tokio::test]
async fn test_health() {
    let api = Api::new(&[]).await;

    let (status, body) = api.call("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "farmctl");
}

#[tokio::test]
async fn test_devices_listing() {
    let api = Api::new(&["dev-1", "dev-2"]).await;

    let (status, body) = api.call("GET", "/devices", None).await;
    assert_eq!(status, StatusCode::OK);
    let devices = body.as_array().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["id"], "dev-1");
}

#[tokio::test]
async fn test_tap_on_group() {
    let api = Api::new(&["dev-1"]).await;

    let (status, body) = api
        .call("POST", "/groups/g1/tap", Some(json!({ "x": 0.5, "y": 0.5 })))
        .await;
    api.drain().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["devices"], json!(["dev-1"]));
    assert_eq!(api.bridge.inputs("dev-1"), vec!["input tap 540 1200"]);
}

#[tokio::test]
async fn test_unknown_group_is_404() {
    let api = Api::new(&["dev-1"]).await;

    let (status, _) = api
        .call("POST", "/groups/nope/key", Some(json!({ "key": "home" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = api.call("POST", "/groups/nope/macros/home/play", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_requests_are_400() {
    let api = Api::new(&["dev-1"]).await;

    let (status, _) = api.call("POST", "/groups/g1/power/explode", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api
        .call("POST", "/groups/g1/swipe", Some(json!({ "x1": 0.5 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api
        .call("POST", "/groups/g1/swipe", Some(json!({ "direction": "sideways" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api.call("POST", "/groups/g1/tap", Some(json!({ "x": 0.5 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api
        .call("POST", "/groups/g1/tap", Some(json!({ "x": "left", "y": 0.5 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api.call("POST", "/groups/g1/key", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api.call("POST", "/groups/g1/key", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/groups/g1/macros/home/play")
        .body(Body::from("{ nope"))
        .unwrap();
    let response = api.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_play_macro_without_body() {
    let api = Api::new(&["dev-1", "dev-2"]).await;

    let (status, body) = api.call("POST", "/groups/g1/macros/home/play", None).await;
    api.drain().await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["runId"].as_u64().is_some());
    assert_eq!(body["started"], json!(["dev-1", "dev-2"]));
    assert_eq!(api.bridge.inputs("dev-2"), vec!["input keyevent KEYCODE_HOME"]);

    let (status, body) = api.call("GET", "/runs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_stop_without_runs() {
    let api = Api::new(&["dev-1"]).await;

    let (status, body) = api.call("POST", "/groups/g1/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], 0);

    let (status, body) = api.call("POST", "/devices/dev-1/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], false);
}
