//! Integration tests for the management API: health, config, stats, batch
//! control and artifact maintenance.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{TestConfig, TestFixture};

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert!(response.body["version"].is_string());
}

#[tokio::test]
async fn test_config_endpoint_redacts_admin_token() {
    let fixture = TestFixture::with_config(TestConfig {
        admin_token: Some("sekrit".to_string()),
        ..Default::default()
    })
    .await;

    let response = fixture.get("/api/v1/config").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["auth"]["admin_token_configured"], true);
    assert!(!response.body.to_string().contains("sekrit"));
    assert_eq!(response.body["conversion"]["enabled"], true);
}

#[tokio::test]
async fn test_stats_endpoint_initial_state() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/stats").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["conversions"], 0);
    assert_eq!(response.body["failures"], 0);
    assert_eq!(response.body["space_saved"], 0);
    assert_eq!(response.body["batch"]["status"], "idle");
}

#[tokio::test]
async fn test_batch_lifecycle_via_api() {
    let fixture = TestFixture::new().await;
    fixture.seed_file("a.jpg", 1024);
    fixture.seed_file("b.png", 1024);

    // Start: empty body runs a full enumeration.
    let started = fixture.post_empty("/api/v1/batch").await;
    assert_eq!(started.status, StatusCode::ACCEPTED);
    assert_eq!(started.body["status"], "running");
    assert_eq!(started.body["total"], 2);
    assert!(started.body["batch_id"].is_string());

    // Only one batch at a time.
    let conflict = fixture.post_empty("/api/v1/batch").await;
    assert_eq!(conflict.status, StatusCode::CONFLICT);

    let progress = fixture.get("/api/v1/batch/progress").await;
    assert_eq!(progress.status, StatusCode::OK);
    assert_eq!(progress.body["status"], "running");

    let cancelled = fixture.delete("/api/v1/batch").await;
    assert_eq!(cancelled.status, StatusCode::OK);
    assert_eq!(cancelled.body["status"], "cancelled");

    let repeat = fixture.delete("/api/v1/batch").await;
    assert_eq!(repeat.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_batch_start_with_empty_library_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_empty("/api/v1/batch").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_batch_options_limit_enumeration() {
    let fixture = TestFixture::new().await;
    for i in 0..5 {
        fixture.seed_file(&format!("img{}.jpg", i), 1024);
    }

    let response = fixture.post("/api/v1/batch", json!({ "limit": 2 })).await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["total"], 2);
}

#[tokio::test]
async fn test_batch_explicit_subjects() {
    let fixture = TestFixture::new().await;
    fixture.seed_file("a.jpg", 1024);
    fixture.seed_file("b.jpg", 1024);

    let response = fixture
        .post("/api/v1/batch", json!({ "subjects": ["a.jpg"] }))
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["total"], 1);
}

#[tokio::test]
async fn test_orphan_sweep_deletes_only_orphans() {
    let fixture = TestFixture::new().await;
    fixture.seed_file("cat.jpg", 1024);
    fixture.seed_file("cat.jpg.webp", 256);
    fixture.seed_file("gone.jpg.webp", 256);

    let response = fixture.delete("/api/v1/artifacts/orphans").await;
    assert_eq!(response.status, StatusCode::OK);

    let deleted = response.body["deleted"].as_array().unwrap();
    assert_eq!(deleted.len(), 1);
    assert!(deleted[0].as_str().unwrap().ends_with("gone.jpg.webp"));
    assert_eq!(response.body["freed_bytes"], 256);

    assert!(fixture.media_root.join("cat.jpg.webp").is_file());
    assert!(!fixture.media_root.join("gone.jpg.webp").exists());
}

#[tokio::test]
async fn test_orphan_sweep_requires_admin_when_token_configured() {
    let fixture = TestFixture::with_config(TestConfig {
        admin_token: Some("sekrit".to_string()),
        ..Default::default()
    })
    .await;
    fixture.seed_file("gone.jpg.webp", 256);

    let anonymous = fixture.delete("/api/v1/artifacts/orphans").await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert!(fixture.media_root.join("gone.jpg.webp").is_file());

    let admin = fixture
        .delete_with_headers(
            "/api/v1/artifacts/orphans",
            &[("Authorization", "Bearer sekrit")],
        )
        .await;
    assert_eq!(admin.status, StatusCode::OK);
    assert!(!fixture.media_root.join("gone.jpg.webp").exists());
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_counters() {
    let fixture = TestFixture::new().await;
    fixture.seed_file("cat.jpg", 4096);

    let _ = fixture
        .get_raw("/media/cat.jpg", &[("Accept", "image/webp")])
        .await;

    let response = fixture.get_raw("/metrics", &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    let text = String::from_utf8(response.body).unwrap();
    assert!(text.contains("optipress_http_requests_total"));
    assert!(text.contains("optipress_images_served_total"));
}
