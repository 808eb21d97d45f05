//! Test helpers: build AppState and router for integration tests.
//!
//! Run from workspace root: `cargo test -p tubely-api --test video_api_test`.
//! The repository is in memory and objects go to a temporary directory.

pub mod auth;

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use tempfile::TempDir;
use tubely_api::setup::routes;
use tubely_api::AppState;
use tubely_core::{BaseConfig, Config, IngestConfig, ServiceConfig, StorageBackend};
use tubely_db::test_helpers::MockVideoRepository;
use tubely_storage::{LocalStorage, Storage, UrlSigner};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-at-least-32-characters-long";
pub const TEST_ASSETS_BASE_URL: &str = "http://localhost:8091/assets";

/// Test application: server, in-memory repository, and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub videos: MockVideoRepository,
    pub state: Arc<AppState>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

fn test_config(temp_dir: &TempDir, ingest: IngestConfig) -> Config {
    Config(Box::new(ServiceConfig {
        base: BaseConfig {
            server_port: 0,
            db_max_connections: 1,
            db_timeout_seconds: 1,
            jwt_secret: TEST_JWT_SECRET.to_string(),
            environment: "test".to_string(),
        },
        database_url: "postgres://unused".to_string(),
        storage_backend: StorageBackend::Local,
        s3_bucket: None,
        s3_region: None,
        s3_endpoint: None,
        local_storage_path: Some(temp_dir.path().join("objects").display().to_string()),
        local_storage_base_url: Some(TEST_ASSETS_BASE_URL.to_string()),
        storage_signing_secret: Some("test-signing-secret".to_string()),
        ingest: IngestConfig {
            scratch_dir: Some(temp_dir.path().join("scratch")),
            signed_url_ttl: Duration::from_secs(300),
            allowed_content_types: vec!["video/mp4".to_string(), "video/quicktime".to_string()],
            ..ingest
        },
    }))
}

/// Setup test app with default ingest settings.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(IngestConfig::default()).await
}

/// Setup test app with an in-memory repository and local storage.
pub async fn setup_test_app_with(ingest: IngestConfig) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::create_dir_all(temp_dir.path().join("scratch")).expect("Failed to create scratch dir");
    let config = test_config(&temp_dir, ingest);

    let local = Arc::new(
        LocalStorage::new(
            temp_dir.path().join("objects"),
            TEST_ASSETS_BASE_URL.to_string(),
            UrlSigner::new(config.storage_signing_secret()),
        )
        .await
        .expect("Failed to create local storage"),
    );
    let storage: Arc<dyn Storage> = local.clone();

    let videos = MockVideoRepository::new();
    let state = Arc::new(AppState::new(
        config,
        Arc::new(videos.clone()),
        storage,
        Some(local),
    ));

    let app = routes::setup_routes(state.clone());
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        videos,
        state,
        _temp_dir: temp_dir,
    }
}

/// Strip the public base URL so the signed URL can be requested from the test server.
pub fn asset_path(signed_url: &str) -> String {
    signed_url
        .strip_prefix("http://localhost:8091")
        .expect("signed URL should use the test base URL")
        .to_string()
}

/// Files left in the scratch directory.
pub fn scratch_entries(app: &TestApp) -> usize {
    std::fs::read_dir(app._temp_dir.path().join("scratch"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}
