//! HTTP search API.
//!
//! Text and image search over the keyframe collection, collection stats,
//! keyframe images from the data root and, optionally, a static frontend.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::ClipframeError;
use crate::search::{ImageSearchRequest, SearchService, TextSearchRequest};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

/// Shared application state.
struct AppState {
    service: SearchService,
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    let service = SearchService::from_settings(&settings)?;
    let app = router(service, &settings);

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Search API listening on {}", addr);

    Output::header("Clipframe Search API");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Text search", "POST /api/v1/videos/search");
    Output::kv("Image search", "POST /api/v1/videos/search/image");
    Output::kv("Collection", "GET  /api/v1/collection");
    Output::kv("Keyframes", "GET  /keyframes/{jpg_path}");
    if let Some(dir) = settings.static_dir() {
        Output::kv("Frontend", &dir.display().to_string());
    }
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

/// Build the API router.
fn router(service: SearchService, settings: &Settings) -> Router {
    let state = Arc::new(AppState { service });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/v1/videos/search", post(search_text))
        .route("/api/v1/videos/search/image", post(search_image))
        .route("/api/v1/collection", get(collection))
        .nest_service("/keyframes", ServeDir::new(settings.data_root()));

    app = match settings.static_dir() {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app.route("/", get(root)),
    };

    app.layer(cors).with_state(state)
}

// === Response Types ===

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    timestamp: DateTime<Utc>,
}

fn error_response(e: ClipframeError) -> Response {
    let status = match &e {
        ClipframeError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ClipframeError::Encoder(_) | ClipframeError::Transient(_) | ClipframeError::Http(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status != StatusCode::UNPROCESSABLE_ENTITY {
        error!("Request failed: {}", e);
    }

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            timestamp: Utc::now(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "clipframe",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /health",
            "POST /api/v1/videos/search",
            "POST /api/v1/videos/search/image",
            "GET /api/v1/collection"
        ]
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, label, detail) = match state.service.store().health().await {
        Ok(()) => (StatusCode::OK, "healthy", None),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", Some(e.to_string())),
    };

    (
        status,
        Json(HealthResponse {
            status: label,
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
            detail,
        }),
    )
}

async fn search_text(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TextSearchRequest>,
) -> Response {
    match state.service.search_text(&req).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn search_image(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImageSearchRequest>,
) -> Response {
    match state.service.search_image(&req).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn collection(State(state): State<Arc<AppState>>) -> Response {
    match state.service.collection_info().await {
        Ok(info) => Json(info).into_response(),
        Err(ClipframeError::Config(message)) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: message,
                timestamp: Utc::now(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HnswSettings;
    use crate::search::test_support::FakeEncoder;
    use crate::vector_store::test_support::record;
    use crate::vector_store::{CollectionSpec, MemoryVectorStore, VectorStore};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::fs;

    async fn spawn(settings: &Settings) -> String {
        let store = Arc::new(MemoryVectorStore::new());
        store
            .create_collection(&CollectionSpec {
                name: "video_keyframes".to_string(),
                vector_size: 2,
                hnsw: HnswSettings::default(),
                default_segment_number: 2,
                memmap_threshold: 1000,
            })
            .await
            .unwrap();
        store
            .upsert(
                "video_keyframes",
                &[
                    record("L21_V001", 1, vec![1.0, 0.0], &["Car"]),
                    record("L21_V001", 2, vec![0.0, 1.0], &[]),
                ],
            )
            .await
            .unwrap();

        let encoder = FakeEncoder {
            texts: HashMap::from([("red car".to_string(), vec![1.0, 0.0])]),
            image: vec![0.0, 1.0],
        };
        let service = SearchService::new(store, Arc::new(encoder), "video_keyframes");
        let app = router(service, settings);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_text_search_endpoint() {
        let base = spawn(&Settings::default()).await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post(format!("{}/api/v1/videos/search", base))
            .json(&json!({"query_texts": ["red car"], "object_filters": ["Car"]}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["total_results"], 1);
        assert_eq!(body["results"][0]["original_id"], "L21_V001_001");
        assert_eq!(body["results"][0]["rank"], 1);
        assert_eq!(body["grouped_by_video"][0]["video_id"], "L21_V001");
    }

    #[tokio::test]
    async fn test_invalid_search_is_unprocessable() {
        let base = spawn(&Settings::default()).await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/v1/videos/search", base))
            .json(&json!({"query_texts": ["red car"], "limit": 0}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 422);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("limit"));
    }

    #[tokio::test]
    async fn test_huge_page_returns_empty_page() {
        let base = spawn(&Settings::default()).await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/v1/videos/search", base))
            .json(&json!({"query_texts": ["red car"], "page": u64::MAX}))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["total_results"], 2);
        assert_eq!(body["results"], json!([]));
    }

    #[tokio::test]
    async fn test_image_search_health_and_collection() {
        let base = spawn(&Settings::default()).await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post(format!("{}/api/v1/videos/search/image", base))
            .json(&json!({"image_base64": "aGVsbG8="}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["results"][0]["original_id"], "L21_V001_002");

        let health = client.get(format!("{}/health", base)).send().await.unwrap();
        assert!(health.status().is_success());

        let info: Value = client
            .get(format!("{}/api/v1/collection", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info["points_count"], 2);
        assert_eq!(info["vector_size"], 2);
    }

    #[tokio::test]
    async fn test_keyframes_are_served_from_data_root() {
        let dir = tempfile::tempdir().unwrap();
        let frame_dir = dir.path().join("Keyframes_L21/keyframes/L21_V001");
        fs::create_dir_all(&frame_dir).unwrap();
        fs::write(frame_dir.join("001.jpg"), b"jpeg bytes").unwrap();

        let mut settings = Settings::default();
        settings.dataset.data_root = dir.path().display().to_string();
        let base = spawn(&settings).await;

        let response = reqwest::get(format!(
            "{}/keyframes/Keyframes_L21/keyframes/L21_V001/001.jpg",
            base
        ))
        .await
        .unwrap();
        assert!(response.status().is_success());
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"jpeg bytes");

        let root: Value = reqwest::get(format!("{}/", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(root["name"], "clipframe");
    }
}
