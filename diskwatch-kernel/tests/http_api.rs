use diskwatch_devkit::UsageEventBuilder;
use diskwatch_kernel::feed::FeedRegistry;
use diskwatch_kernel::health::HealthTracker;
use diskwatch_kernel::http::{build_router, AppState};
use diskwatch_kernel::preferences::{Preferences, PreferencesStore};
use diskwatch_kernel::views::ViewRegistry;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const API_KEY: &str = "test-key";

fn create_test_app() -> (Router, FeedRegistry) {
    let feed = FeedRegistry::new();
    let prefs = Arc::new(PreferencesStore::in_memory(Preferences::default()));
    let views = ViewRegistry::new(feed.clone(), prefs.thresholds());
    views.spawn_threshold_listener(prefs.subscribe());

    let app = build_router(AppState {
        feed: feed.clone(),
        views,
        prefs,
        health: HealthTracker::new(),
        api_key: Some(API_KEY.to_string()),
    });
    (app, feed)
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", API_KEY);
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&v).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_is_public_and_api_requires_key() {
    let (app, _feed) = create_test_app();

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/views").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/views")
                .header("x-api-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_view_renders_published_usage() {
    let (app, feed) = create_test_app();

    let resp = app.clone().oneshot(request("PUT", "/views/workbench", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = app.clone().oneshot(request("PUT", "/views/workbench", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(request("PUT", "/views/workbench/current", Some(json!({"node_id": "n1"}))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["current_node"], "n1");
    assert_eq!(feed.total_subscriptions(), 1);

    let event = UsageEventBuilder::disk_usage_v1("n1", 72.0, 2_000_000_000);
    let resp = app.clone().oneshot(request("POST", "/usage", Some(event))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["delivered"], 1);

    let resp = app.clone().oneshot(request("GET", "/views/workbench", None)).await.unwrap();
    let view = json_body(resp).await;
    assert_eq!(view["state"]["color_tier"], "warning");
    assert_eq!(view["state"]["percent_text"], "72%");
    assert_eq!(view["state"]["free_label"], "2.0 GB Free");
    assert_eq!(view["frame"]["visible"], true);
    assert_eq!(view["frame"]["label"], "2.0 GB Free");
    assert_eq!(view["frame"]["background"], "linear-gradient(90deg, warning 72%, info 72%)");
}

#[tokio::test]
async fn test_malformed_usage_is_rejected_and_render_kept() {
    let (app, _feed) = create_test_app();
    app.clone().oneshot(request("PUT", "/views/workbench", None)).await.unwrap();
    app.clone()
        .oneshot(request("PUT", "/views/workbench/current", Some(json!({"node_id": "n1"}))))
        .await
        .unwrap();
    app.clone()
        .oneshot(request("POST", "/usage", Some(UsageEventBuilder::disk_usage_v1("n1", 40.0, 20_000_000_000))))
        .await
        .unwrap();

    let bad = UsageEventBuilder::disk_usage_v1("n1", -5.0, 100);
    let resp = app.clone().oneshot(request("POST", "/usage", Some(bad))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = app.clone().oneshot(request("GET", "/views/workbench", None)).await.unwrap();
    let view = json_body(resp).await;
    assert_eq!(view["state"]["percent_text"], "40%");
    assert_eq!(view["state"]["color_tier"], "normal");

    let resp = app.clone().oneshot(request("GET", "/system/health", None)).await.unwrap();
    let health = json_body(resp).await;
    assert_eq!(health["events_received"], 2);
    assert_eq!(health["events_dropped"], 1);
}

#[tokio::test]
async fn test_unbinding_hides_indicator() {
    let (app, feed) = create_test_app();
    app.clone().oneshot(request("PUT", "/views/workbench", None)).await.unwrap();
    app.clone()
        .oneshot(request("PUT", "/views/workbench/selected", Some(json!({"node_id": "n2"}))))
        .await
        .unwrap();
    app.clone()
        .oneshot(request("POST", "/usage", Some(UsageEventBuilder::disk_usage_v1("n2", 10.0, 90_000_000_000))))
        .await
        .unwrap();

    let resp = app
        .clone()
        .oneshot(request("PUT", "/views/workbench/selected", Some(json!({"node_id": null}))))
        .await
        .unwrap();
    let view = json_body(resp).await;
    assert_eq!(view["frame"]["visible"], false);
    assert_eq!(view["selected_node"], Value::Null);
    assert_eq!(feed.total_subscriptions(), 0);

    let resp = app.clone().oneshot(request("DELETE", "/views/workbench", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = app.clone().oneshot(request("GET", "/views/workbench", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_threshold_change_recolors_views() {
    let (app, _feed) = create_test_app();
    app.clone().oneshot(request("PUT", "/views/workbench", None)).await.unwrap();
    app.clone()
        .oneshot(request("PUT", "/views/workbench/current", Some(json!({"node_id": "n1"}))))
        .await
        .unwrap();
    app.clone()
        .oneshot(request("POST", "/usage", Some(UsageEventBuilder::disk_usage_v1("n1", 72.0, 2_000_000_000))))
        .await
        .unwrap();

    let resp = app
        .clone()
        .oneshot(request("PUT", "/preferences", Some(json!({"low_disk_space_threshold_gb": -3.0}))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(request("PUT", "/preferences", Some(json!({"low_disk_space_threshold_gb": 1.0}))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let mut tier = Value::Null;
    for _ in 0..50 {
        let resp = app.clone().oneshot(request("GET", "/views/workbench", None)).await.unwrap();
        tier = json_body(resp).await["state"]["color_tier"].clone();
        if tier == "normal" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(tier, "normal");

    let resp = app.clone().oneshot(request("GET", "/preferences", None)).await.unwrap();
    assert_eq!(json_body(resp).await["low_disk_space_threshold_gb"], 1.0);
}
