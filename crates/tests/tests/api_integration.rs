use std::io::Cursor;

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use growwise_api::{build_app, ApiConfig};
use growwise_core::ResponderTables;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "growwise-test-boundary";

fn test_config(dir: &TempDir) -> ApiConfig {
    ApiConfig {
        market_cache: dir.path().join("market_prices.json"),
        ..ApiConfig::default()
    }
}

async fn app(dir: &TempDir) -> Router {
    build_app(test_config(dir)).await.expect("app should build")
}

async fn json_body(response: Response<Body>) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn upload(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/disease-detection")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn leaf_png(color: [u8; 3]) -> Vec<u8> {
    let leaf = image::RgbImage::from_pixel(16, 16, image::Rgb(color));
    let mut out = Cursor::new(Vec::new());
    leaf.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[tokio::test]
async fn health_reports_service_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(&dir).await.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "GrowWise API");
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["weather_configured"], false);
    assert!(body["metrics"]["requests_total"].is_u64());
}

#[tokio::test]
async fn request_id_is_generated_or_echoed() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    let generated = app.clone().oneshot(get("/api/voice-help")).await.unwrap();
    let id = generated
        .headers()
        .get("x-request-id")
        .expect("generated request id")
        .to_str()
        .unwrap();
    assert!(!id.is_empty());

    let supplied = Request::builder()
        .uri("/api/voice-help")
        .header("x-request-id", "field-trip-42")
        .body(Body::empty())
        .unwrap();
    let echoed = app.oneshot(supplied).await.unwrap();
    assert_eq!(echoed.headers().get("x-request-id").unwrap(), "field-trip-42");
}

#[tokio::test]
async fn index_lists_features() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(&dir).await.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["features"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn voice_query_classifies_and_answers() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(&dir)
        .await
        .oneshot(post_json(
            "/api/voice-query",
            json!({ "query": "  What is the weather forecast today  " }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["query"], "What is the weather forecast today");
    assert_eq!(body["data"]["category"], "weather");
    assert!(body["data"]["response"]
        .as_str()
        .unwrap()
        .contains("Weather tab"));
}

#[tokio::test]
async fn greeting_wins_over_keywords() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(&dir)
        .await
        .oneshot(post_json(
            "/api/voice-query",
            json!({ "query": "hello, what fertilizer do I need" }),
        ))
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(body["data"]["category"], "greeting");
}

#[tokio::test]
async fn blank_voice_query_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    for payload in [json!({ "query": "   " }), json!({})] {
        let response = app
            .clone()
            .oneshot(post_json("/api/voice-query", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Query is required");
    }
}

#[tokio::test]
async fn voice_help_returns_samples() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(&dir).await.oneshot(get("/api/voice-help")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["sample_queries"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn market_prices_filter_by_category() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    let all = json_body(app.clone().oneshot(get("/api/market-prices")).await.unwrap()).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 20);

    let fruit = json_body(
        app.oneshot(get("/api/market-prices?category=FRUIT"))
            .await
            .unwrap(),
    )
    .await;
    let fruit = fruit["data"].as_array().unwrap();
    assert_eq!(fruit.len(), 10);
    assert!(fruit.iter().all(|item| item["category"] == "Fruit"));

    assert!(dir.path().join("market_prices.json").exists());
}

#[tokio::test]
async fn weather_requires_location_and_key() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    let missing = app
        .clone()
        .oneshot(post_json("/api/weather", json!({})))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(missing).await["error"],
        "Either city name or coordinates are required"
    );

    let unconfigured = app
        .oneshot(post_json("/api/weather", json!({ "city": "Nashik" })))
        .await
        .unwrap();
    assert_eq!(unconfigured.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn disease_detection_assesses_green_leaf() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    let response = app
        .clone()
        .oneshot(upload("image", "leaf.png", &leaf_png([40, 180, 60])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["disease"], "healthy");
    assert_eq!(body["data"]["confidence"], 85.0);

    let stats = json_body(app.oneshot(get("/api/stats")).await.unwrap()).await;
    assert_eq!(stats["data"]["total_predictions"], 1);
    assert_eq!(stats["data"]["common_diseases"][0]["disease"], "healthy");
}

#[tokio::test]
async fn disease_detection_rejects_bad_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;
    let png = leaf_png([40, 180, 60]);

    let cases = [
        (upload("photo", "leaf.png", &png), "No image file provided"),
        (upload("image", "", &png), "No file selected"),
        (
            upload("image", "leaf.bmp", &png),
            "Invalid file type. Please upload PNG, JPG, JPEG, or GIF files.",
        ),
        (
            post_json("/api/disease-detection", json!({})),
            "No image file provided",
        ),
    ];

    for (request, message) in cases {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], message);
    }
}

#[tokio::test]
async fn history_lists_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    for query in ["soil price", "asdkjasd", "how do I stop aphid damage"] {
        let response = app
            .clone()
            .oneshot(post_json("/api/voice-query", json!({ "query": query })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let history = json_body(
        app.clone()
            .oneshot(get("/api/history/voice?limit=2"))
            .await
            .unwrap(),
    )
    .await;
    let records = history["data"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["query"], "how do I stop aphid damage");
    assert_eq!(records[1]["category"], "default");

    let unknown = app.oneshot(get("/api/history/crops")).await.unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rate_limit_returns_json_429() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(ApiConfig {
        rate_limit_max: 2,
        ..test_config(&dir)
    })
    .await
    .unwrap();

    for _ in 0..2 {
        let response = app.clone().oneshot(get("/api/voice-help")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let limited = app.clone().oneshot(get("/api/voice-help")).await.unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(limited).await["success"], false);

    let health = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn responder_tables_can_be_replaced_from_json() {
    let dir = tempfile::tempdir().unwrap();
    let mut tables = ResponderTables::builtin();
    tables
        .responses
        .insert("weather".to_string(), "Check the village board.".to_string());
    let tables_path = dir.path().join("responder.json");
    std::fs::write(&tables_path, serde_json::to_string(&tables).unwrap()).unwrap();

    let app = build_app(ApiConfig {
        responder_tables: Some(tables_path),
        ..test_config(&dir)
    })
    .await
    .unwrap();

    let body = json_body(
        app.oneshot(post_json("/api/voice-query", json!({ "query": "rain tomorrow?" })))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["data"]["response"], "Check the village board.");
}

#[tokio::test]
async fn invalid_responder_tables_fail_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut tables = ResponderTables::builtin();
    tables.keywords.remove("season");
    let tables_path = dir.path().join("responder.json");
    std::fs::write(&tables_path, serde_json::to_string(&tables).unwrap()).unwrap();

    let result = build_app(ApiConfig {
        responder_tables: Some(tables_path),
        ..test_config(&dir)
    })
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn sqlite_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let database_url = format!("sqlite://{}", dir.path().join("growwise.db").display());
    let config = ApiConfig {
        database_url: Some(database_url),
        ..test_config(&dir)
    };

    let first = build_app(config.clone()).await.unwrap();
    let response = first
        .oneshot(post_json(
            "/api/voice-query",
            json!({ "query": "compost for tomatoes" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let second = build_app(config).await.unwrap();
    let health = json_body(second.clone().oneshot(get("/health")).await.unwrap()).await;
    assert_eq!(health["storage"], "sqlite");

    let history = json_body(second.oneshot(get("/api/history/voice")).await.unwrap()).await;
    let records = history["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["category"], "fertilizer");
}
