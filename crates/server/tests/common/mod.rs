//! Common test utilities for driving the server in-process.
//!
//! The fixture wires the full router with a mock converter injected, so
//! tests exercise negotiation, conversion and the API without external
//! binaries.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use optipress_core::config::{
    AuthConfig, Config, ConversionConfig, ConversionMode, DatabaseConfig, MediaConfig,
    RateLimitConfig, ServerConfig,
};
use optipress_core::scheduler::SchedulerConfig;
use optipress_core::testing::MockConverter;
use optipress_core::{
    create_event_sink, ArtifactStore, BatchScheduler, ConverterConfig, ConverterFactory,
    ImageConverter, MediaLibrary, Optimizer, SqliteStateStore, StateStore,
};
use optipress_server::api::create_router;
use optipress_server::state::AppState;

/// Size of artifacts the mock converter writes.
pub const MOCK_ARTIFACT_SIZE: usize = 256;

/// Test fixture wiring the router with a [`MockConverter`].
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock converter - script failures, inspect recorded requests
    pub mock: Arc<MockConverter>,
    /// Root of the temporary media library
    pub media_root: PathBuf,
    _temp_dir: TempDir,
}

/// Response from a JSON API test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Response from a raw (media) test request
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Header value as a string, empty when absent.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// Configuration for the test fixture.
pub struct TestConfig {
    pub max_requests: u32,
    pub admin_token: Option<String>,
    pub mode: ConversionMode,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            // High enough that ordinary tests never trip the limiter.
            max_requests: 1000,
            admin_token: None,
            mode: ConversionMode::Auto,
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with defaults.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let media_root = temp_dir.path().join("media");
        std::fs::create_dir_all(&media_root).expect("Failed to create media root");

        let config = Config {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                path: temp_dir.path().join("test.db"),
            },
            media: MediaConfig {
                root: media_root.clone(),
            },
            conversion: ConversionConfig {
                mode: test_config.mode,
                ..Default::default()
            },
            converter: ConverterConfig::default(),
            batch: SchedulerConfig::default(),
            rate_limit: RateLimitConfig {
                max_requests: test_config.max_requests,
                window_secs: 60,
            },
            auth: AuthConfig {
                admin_token: test_config.admin_token,
            },
        };

        let store: Arc<dyn StateStore> =
            Arc::new(SqliteStateStore::in_memory().expect("Failed to create state store"));

        let mock = Arc::new(MockConverter::new().with_output_size(MOCK_ARTIFACT_SIZE as u64));
        let factory = Arc::new(ConverterFactory::from_candidates(vec![
            Arc::clone(&mock) as Arc<dyn ImageConverter>
        ]));
        let artifacts = ArtifactStore::new(&media_root, config.conversion.max_file_size);

        let (events, writer) = create_event_sink(100);
        tokio::spawn(writer.run());

        let optimizer = Arc::new(
            Optimizer::new(
                factory,
                artifacts,
                config.conversion.clone(),
                Arc::clone(&store),
            )
            .with_events(events.clone()),
        );
        let scheduler = Arc::new(
            BatchScheduler::new(
                config.batch.clone(),
                MediaLibrary::new(&media_root),
                Arc::clone(&optimizer),
                Arc::clone(&store),
            )
            .with_events(events.clone()),
        );

        let state = Arc::new(AppState::new(config, optimizer, scheduler, events));
        let router = create_router(state);

        Self {
            router,
            mock,
            media_root,
            _temp_dir: temp_dir,
        }
    }

    /// Write a file of the given size into the media library.
    pub fn seed_file(&self, name: &str, size: usize) -> PathBuf {
        let path = self.media_root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, vec![0xABu8; size]).expect("Failed to seed file");
        path
    }

    /// Send a GET request expecting a JSON body.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[]).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[]).await
    }

    /// Send a POST request with no body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None, &[]).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None, &[]).await
    }

    /// Send a DELETE request with extra headers.
    pub async fn delete_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.request("DELETE", path, None, headers).await
    }

    /// Send a GET request, keeping the response bytes and headers.
    pub async fn get_raw(&self, path: &str, headers: &[(&str, &str)]) -> RawResponse {
        let mut builder = Request::builder().method("GET").uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        RawResponse {
            status,
            headers,
            body,
        }
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json_body) = body {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
