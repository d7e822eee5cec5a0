//! HTTP surface tests
//!
//! Requests are sent straight into the router with `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use knxweb_rust::http_transport;
use pretty_assertions::assert_eq;
use rstest::*;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

mod common;
use common::{write_event, TestBridge, GW_A};

const IDLE: Duration = Duration::from_secs(30);

async fn call(app: &Router, uri: &str) -> (StatusCode, Option<Value>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&body).unwrap())
    };
    (status, json)
}

async fn started(reachable: bool) -> (TestBridge, Router) {
    let unreachable: &[&str] = if reachable { &[] } else { &[GW_A] };
    let env = TestBridge::start(&[GW_A], unreachable, IDLE);
    if reachable {
        env.connected(GW_A).await;
    }
    let app = http_transport::router(env.bridge.clone(), false);
    (env, app)
}

#[tokio::test]
async fn test_root_and_status() {
    let (env, app) = started(true).await;

    let (status, body) = call(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["service"], "knxweb-rust");
    assert_eq!(body["points"], 4);

    let (status, body) = call(&app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["gateways"][0]["gateway"], GW_A);
    assert_eq!(body["gateways"][0]["state"], "connected");
    assert_eq!(body["messages"], 0);

    env.shutdown().await;
}

#[tokio::test]
async fn test_latest_is_empty_before_traffic() {
    let (env, app) = started(false).await;

    let (status, body) = call(&app, "/get/latest").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_none());

    let (status, body) = call(&app, "/get/all").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap(), serde_json::json!([]));

    env.shutdown().await;
}

#[tokio::test]
async fn test_get_views() {
    let (env, app) = started(true).await;
    env.receive(GW_A, write_event("2/5/8", vec![1])).await;
    env.receive(GW_A, write_event("2/5/7", vec![0, 0x0c, 0x33])).await;
    env.receive(GW_A, write_event("9/9/9", vec![0, 1, 2])).await;

    let (status, body) = call(&app, "/get/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["destination"], "9/9/9");

    let (_, body) = call(&app, "/get/all").await;
    let all = body.unwrap();
    let dests: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["destination"].as_str().unwrap())
        .collect();
    assert_eq!(dests, vec!["2/5/7", "2/5/8", "9/9/9"]);
    assert_eq!(all[0]["value"], "21.50 °C");
    assert_eq!(all[0]["name"], "myroom/temp");
    assert!(all[2].get("name").is_none());
    assert_eq!(all[2]["data"], serde_json::json!([0, 1, 2]));

    let (_, body) = call(&app, "/get/myroom").await;
    assert_eq!(body.unwrap().as_array().unwrap().len(), 2);

    let (status, body) = call(&app, "/get/all/myroom/temp").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap().as_array().unwrap().len(), 1);

    let (status, body) = call(&app, "/get/raw/myroom/temp").await;
    assert_eq!(status, StatusCode::OK);
    let raw = body.unwrap();
    assert_eq!(raw[0]["value"]["type"], "9.001");
    assert_eq!(raw[0]["value"]["unit"], "°C");
    assert!((raw[0]["value"]["value"].as_f64().unwrap() - 21.5).abs() < 1e-9);

    let (status, body) = call(&app, "/get/raw/9/9/9").await;
    assert_eq!(status, StatusCode::OK);
    let raw = body.unwrap();
    assert!(raw[0]["value"]["type"].is_null());
    assert_eq!(raw[0]["value"]["value"], serde_json::json!([0, 1, 2]));
    assert_eq!(raw[0]["value"]["text"], "[0 1 2]");

    env.shutdown().await;
}

#[tokio::test]
async fn test_unconfigured_address_served_raw() {
    let (env, app) = started(true).await;
    env.receive(GW_A, write_event("9/9/9", vec![0, 1, 2])).await;

    let (status, body) = call(&app, "/get/all").await;
    assert_eq!(status, StatusCode::OK);
    let all = body.unwrap();
    assert_eq!(all.as_array().unwrap().len(), 1);
    assert_eq!(all[0]["destination"], "9/9/9");
    assert!(all[0].get("name").is_none());
    assert!(all[0].get("value").is_none());

    let (status, body) = call(&app, "/get/raw/9/9/9").await;
    assert_eq!(status, StatusCode::OK);
    let raw = body.unwrap();
    assert_eq!(raw.as_array().unwrap().len(), 1);
    assert_eq!(raw[0]["destination"], "9/9/9");
    assert!(raw[0]["value"]["type"].is_null());
    assert_eq!(raw[0]["value"]["text"], "[0 1 2]");

    let (status, body) = call(&app, "/get/9/9/9").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()[0]["data"], serde_json::json!([0, 1, 2]));

    env.shutdown().await;
}

#[rstest]
#[case::unknown_name("/get/cellar", StatusCode::NOT_FOUND)]
#[case::unknown_history("/get/all/cellar", StatusCode::NOT_FOUND)]
#[case::unknown_raw("/get/raw/cellar", StatusCode::NOT_FOUND)]
#[case::no_traffic_by_name("/set/myroom/door/1", StatusCode::NOT_ACCEPTABLE)]
#[case::no_traffic_by_address("/set/2/5/7/21", StatusCode::NOT_ACCEPTABLE)]
#[case::ambiguous("/set/myroom/1", StatusCode::BAD_REQUEST)]
#[case::missing_value("/set/myroom", StatusCode::BAD_REQUEST)]
#[case::unknown_target("/set/cellar/1", StatusCode::NOT_FOUND)]
#[tokio::test]
async fn test_error_statuses(#[case] uri: &str, #[case] expected: StatusCode) {
    let (env, app) = started(false).await;

    let (status, body) = call(&app, uri).await;
    assert_eq!(status, expected, "{uri}");
    assert!(body.unwrap()["error"]["message"].is_string());

    env.shutdown().await;
}

#[tokio::test]
async fn test_set_writes_and_updates_cache() {
    let (env, app) = started(true).await;
    env.receive(GW_A, write_event("2/5/8", vec![0])).await;

    let (status, body) = call(&app, "/set/myroom/door/1").await;
    assert_eq!(status, StatusCode::OK);
    let receipt = body.unwrap();
    assert_eq!(receipt["gateway"], GW_A);
    assert_eq!(receipt["data"], serde_json::json!([1]));
    assert_eq!(receipt["value"]["text"], "Open");

    let (_, body) = call(&app, "/get/myroom/door").await;
    assert_eq!(body.unwrap()[0]["data"], serde_json::json!([1]));

    let (status, _) = call(&app, "/set/myroom/door/maybe").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    env.transport.fail_sends(true);
    let (status, _) = call(&app, "/set/myroom/door/0").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    env.shutdown().await;
}

#[tokio::test]
async fn test_cors_enabled() {
    let env = TestBridge::start(&[GW_A], &[GW_A], IDLE);
    let app = http_transport::router(env.bridge.clone(), true);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/get/all")
                .header(header::ORIGIN, "http://example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );

    env.shutdown().await;
}
