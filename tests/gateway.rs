//! End-to-end tests against a live gateway.

mod common;

use std::time::Duration;

use axum::http::Method;
use devgate::config::GatewayConfig;
use devgate::{handler_fn, GatewayBuilder, HandlerSet};
use futures_util::{SinkExt, StreamExt};
use reqwest::{redirect::Policy, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use common::{closed_port, spawn_gateway, start_mock_backend, start_upstream, start_ws_echo};

fn config(root: &TempDir, upstream: String) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.interceptor.root = root.path().to_path_buf();
    config.proxy.target = upstream;
    config
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn relays_unmatched_requests_upstream() {
    let root = tempfile::tempdir().unwrap();
    let upstream = start_upstream().await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://{}", upstream)))).await;

    let response = client().get(gateway.url("/hello")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "hello from upstream");

    let entries = gateway.history.wait_for(1).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target.as_str(), "proxy");
    assert_eq!(entries[0].log, format!("/hello -> http://{}/hello", upstream));
}

#[tokio::test]
async fn relays_fixed_backend_response() {
    let root = tempfile::tempdir().unwrap();
    let backend = start_mock_backend("raw backend").await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://{}", backend)))).await;

    let response = client().get(gateway.url("/anything")).send().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "raw backend");
}

#[tokio::test]
async fn upstream_sees_its_own_host() {
    let root = tempfile::tempdir().unwrap();
    let upstream = start_upstream().await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://{}", upstream)))).await;

    let host = client().get(gateway.url("/host")).send().await.unwrap().text().await.unwrap();
    assert_eq!(host, upstream.to_string());
}

#[tokio::test]
async fn refused_upstream_is_503() {
    let root = tempfile::tempdir().unwrap();
    let port = closed_port().await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://127.0.0.1:{}", port)))).await;

    let response = client().get(gateway.url("/api/users")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["state"], "error");
    assert_eq!(gateway.history.statuses(), vec!["503"]);
}

#[tokio::test]
async fn upstream_redirects_point_back_at_the_gateway() {
    let root = tempfile::tempdir().unwrap();
    let upstream = start_upstream().await;
    // Trailing slash on the target must not matter.
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://{}/", upstream)))).await;

    let response = client().get(gateway.url("/old")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()["location"],
        format!("http://{}/new", gateway.addr).as_str()
    );

    let response = client().get(gateway.url("/away")).send().await.unwrap();
    assert_eq!(response.headers()["location"], "http://example.com/elsewhere");
}

#[tokio::test]
async fn json_override_is_wrapped() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("api")).unwrap();
    std::fs::write(root.path().join("api/users.json"), r#"[{"id":1}]"#).unwrap();
    let port = closed_port().await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://127.0.0.1:{}", port)))).await;

    let body: Value = client()
        .get(gateway.url("/api/users"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"state": "success", "data": [{"id": 1}]}));
}

#[tokio::test]
async fn module_override_dispatches_by_method() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("login.js"), "").unwrap();
    let port = closed_port().await;

    let builder = GatewayBuilder::new(config(&root, format!("http://127.0.0.1:{}", port))).module(
        "/login",
        HandlerSet::new()
            .on(
                Method::GET,
                handler_fn(|ex| {
                    ex.set_body("login form");
                    Ok(())
                }),
            )
            .all(handler_fn(|ex| {
                ex.set_json(&json!({"state": "success", "token": "abc"}));
                Ok(())
            })),
    );
    let gateway = spawn_gateway(builder).await;

    let text = client().get(gateway.url("/login")).send().await.unwrap().text().await.unwrap();
    assert_eq!(text, "login form");

    let body: Value = client()
        .post(gateway.url("/login"))
        .body("user=a")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["token"], "abc");

    let entries = gateway.history.entries.lock().unwrap();
    assert!(entries[0].log.ends_with("login.js[get]"));
    assert!(entries[1].log.ends_with("login.js[all]"));
}

#[tokio::test]
async fn static_files_and_html_overrides_are_served() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("app.css"), "body{}").unwrap();
    std::fs::write(root.path().join("about.html"), "<h1>about</h1>").unwrap();
    std::fs::write(root.path().join("index.html"), "<h1>home</h1>").unwrap();
    let port = closed_port().await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://127.0.0.1:{}", port)))).await;

    let response = client().get(gateway.url("/app.css")).send().await.unwrap();
    assert_eq!(response.headers()["content-type"], "text/css");
    assert_eq!(response.text().await.unwrap(), "body{}");

    let about = client().get(gateway.url("/about")).send().await.unwrap().text().await.unwrap();
    assert_eq!(about, "<h1>about</h1>");

    let home = client().get(gateway.url("/")).send().await.unwrap().text().await.unwrap();
    assert_eq!(home, "<h1>home</h1>");

    let targets: Vec<_> = gateway
        .history
        .entries
        .lock()
        .unwrap()
        .iter()
        .map(|t| t.target.as_str())
        .collect();
    assert_eq!(targets, vec!["static", "static", "static"]);
}

#[tokio::test]
async fn websocket_traffic_is_bridged() {
    let root = tempfile::tempdir().unwrap();
    let echo = start_ws_echo().await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://{}", echo)))).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/chat", gateway.addr))
        .await
        .unwrap();
    ws.send(Message::Text("ping over gateway".into())).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply.into_text().unwrap().as_str(), "ping over gateway");

    ws.close(None).await.unwrap();
    for _ in 0..50 {
        if gateway.history.ws_events().contains(&"CLS".to_string()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let events = gateway.history.ws_events();
    assert_eq!(events, vec!["OPN", "SND", "REC", "CLS"]);
}

#[tokio::test]
async fn relayed_stream_is_tracked_until_the_last_chunk() {
    let root = tempfile::tempdir().unwrap();
    let upstream = start_upstream().await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://{}", upstream)))).await;

    let text = client().get(gateway.url("/stream")).send().await.unwrap().text().await.unwrap();
    assert_eq!(text, "chunk0\nchunk1\nchunk2\n");

    let entries = gateway.history.wait_for(1).await;
    assert_eq!(gateway.history.statuses(), vec!["200"]);
    let span = entries[0].span().unwrap();
    assert!(span >= Duration::from_millis(250), "span was {span:?}");
}

#[tokio::test]
async fn client_leaving_mid_stream_is_recorded() {
    let root = tempfile::tempdir().unwrap();
    let upstream = start_upstream().await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://{}", upstream)))).await;

    let mut response = client().get(gateway.url("/stream")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = response.chunk().await.unwrap().unwrap();
    assert_eq!(&first[..], b"chunk0\n");
    assert!(gateway.history.entries.lock().unwrap().is_empty());
    drop(response);

    gateway.history.wait_for(1).await;
    assert_eq!(gateway.history.statuses(), vec!["499"]);
}

#[tokio::test]
async fn websocket_subprotocol_comes_from_the_upstream() {
    let root = tempfile::tempdir().unwrap();
    let echo = start_ws_echo().await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://{}", echo)))).await;

    let mut request = format!("ws://{}/chat", gateway.addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("sec-websocket-protocol", "a, b".parse().unwrap());
    let (mut ws, response) = tokio_tungstenite::connect_async(request).await.unwrap();
    assert_eq!(response.headers()["sec-websocket-protocol"], "b");

    ws.send(Message::Text("hi".into())).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply.into_text().unwrap().as_str(), "hi");
}

#[tokio::test]
async fn websocket_to_refused_upstream_fails_the_handshake() {
    let root = tempfile::tempdir().unwrap();
    let port = closed_port().await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://127.0.0.1:{}", port)))).await;

    let err = tokio_tungstenite::connect_async(format!("ws://{}/chat", gateway.addr))
        .await
        .unwrap_err();
    match err {
        WsError::Http(response) => assert_eq!(response.status(), 503),
        other => panic!("expected a rejected handshake, got {other:?}"),
    }

    gateway.history.wait_for(1).await;
    assert_eq!(gateway.history.statuses(), vec!["503"]);
    assert!(gateway.history.ws_events().is_empty());
}

#[tokio::test]
async fn shutdown_closes_open_websocket_sessions() {
    let root = tempfile::tempdir().unwrap();
    let echo = start_ws_echo().await;
    let gateway = spawn_gateway(GatewayBuilder::new(config(&root, format!("http://{}", echo)))).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/chat", gateway.addr))
        .await
        .unwrap();
    ws.send(Message::Text("before".into())).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    gateway.shutdown.trigger();

    let closing = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match closing {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
        other => panic!("expected a close frame, got {other:?}"),
    }

    for _ in 0..50 {
        if gateway.history.ws_events().last().map(String::as_str) == Some("CLS") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(gateway.history.ws_events(), vec!["OPN", "SND", "REC", "CLS"]);
}
