//! Qdrant REST client.
//!
//! Only the handful of endpoints the loader and the search service need.
//! Failures are classified for the uploader: timeouts, connection errors,
//! 408, 429 and 5xx are transient; every other non-2xx status is permanent.

use super::{
    CollectionInfo, CollectionSpec, PayloadSchema, ScoredPoint, SearchFilter, SearchRequest,
    VectorStore,
};
use crate::config::StoreSettings;
use crate::error::{ClipframeError, Result};
use crate::joiner::{KeyframePayload, KeyframeRecord};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Qdrant-backed vector store.
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantStore {
    /// Create a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClipframeError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_settings(settings: &StoreSettings) -> Result<Self> {
        Self::new(
            &settings.url,
            settings.api_key.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Send a request and turn failures into transient or permanent errors.
    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

fn classify_transport(e: reqwest::Error) -> ClipframeError {
    if e.is_builder() {
        ClipframeError::Permanent(format!("invalid request: {}", e))
    } else {
        ClipframeError::Transient(e.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> ClipframeError {
    let message = format!("Qdrant returned HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ClipframeError::Transient(message)
    } else {
        ClipframeError::Permanent(message)
    }
}

#[derive(Serialize)]
struct PointBody<'a> {
    id: Uuid,
    vector: &'a [f32],
    payload: &'a KeyframePayload,
}

#[derive(Serialize)]
struct UpsertBody<'a> {
    points: Vec<PointBody<'a>>,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    score: f32,
    payload: Option<Value>,
}

fn filter_body(filter: &SearchFilter) -> Value {
    let mut must: Vec<Value> = filter
        .object_labels
        .iter()
        .map(|label| json!({"key": "object_labels", "match": {"value": label}}))
        .collect();
    if let Some(video_id) = &filter.video_id {
        must.push(json!({"key": "video_id", "match": {"value": video_id}}));
    }
    if let Some(batch) = &filter.batch {
        must.push(json!({"key": "batch", "match": {"value": batch}}));
    }
    json!({ "must": must })
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let response = self
            .request(Method::GET, &format!("/collections/{}", name))
            .send()
            .await
            .map_err(classify_transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: Value = response.json().await.map_err(classify_transport)?;
        let result = &body["result"];
        Ok(Some(CollectionInfo {
            name: name.to_string(),
            vector_size: result["config"]["params"]["vectors"]["size"]
                .as_u64()
                .map(|s| s as usize),
            points_count: result["points_count"].as_u64().unwrap_or(0),
            status: result["status"].as_str().unwrap_or("unknown").to_string(),
        }))
    }

    #[instrument(skip(self, spec), fields(collection = %spec.name))]
    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let body = json!({
            "vectors": {"size": spec.vector_size, "distance": "Cosine"},
            "hnsw_config": {"m": spec.hnsw.m, "ef_construct": spec.hnsw.ef_construct},
            "optimizers_config": {
                "default_segment_number": spec.default_segment_number,
                "memmap_threshold": spec.memmap_threshold
            }
        });
        self.send(
            self.request(Method::PUT, &format!("/collections/{}", spec.name))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema: PayloadSchema,
    ) -> Result<()> {
        debug!("Creating {:?} index on {}.{}", schema, collection, field);
        self.send(
            self.request(Method::PUT, &format!("/collections/{}/index?wait=true", collection))
                .json(&json!({"field_name": field, "field_schema": schema})),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert(&self, collection: &str, records: &[KeyframeRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let body = UpsertBody {
            points: records
                .iter()
                .map(|r| PointBody {
                    id: r.point_uuid(),
                    vector: &r.vector,
                    payload: &r.payload,
                })
                .collect(),
        };

        self.send(
            self.request(Method::PUT, &format!("/collections/{}/points?wait=true", collection))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<ScoredPoint>> {
        let mut body = json!({
            "vector": request.vector,
            "limit": request.limit,
            "with_payload": true,
        });
        if let Some(threshold) = request.score_threshold {
            body["score_threshold"] = json!(threshold);
        }
        if !request.filter.is_empty() {
            body["filter"] = filter_body(&request.filter);
        }

        let response: SearchResponse = self
            .send(
                self.request(
                    Method::POST,
                    &format!("/collections/{}/points/search", collection),
                )
                .json(&body),
            )
            .await?
            .json()
            .await
            .map_err(classify_transport)?;

        let mut points = Vec::with_capacity(response.result.len());
        for hit in response.result {
            let payload = match hit.payload.map(serde_json::from_value::<KeyframePayload>) {
                Some(Ok(payload)) => payload,
                Some(Err(e)) => {
                    warn!("Skipping hit with unexpected payload: {}", e);
                    continue;
                }
                None => {
                    warn!("Skipping hit without payload");
                    continue;
                }
            };
            points.push(ScoredPoint {
                id: payload.record_id(),
                score: hit.score,
                payload,
            });
        }
        Ok(points)
    }

    async fn health(&self) -> Result<()> {
        self.send(self.request(Method::GET, "/healthz")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HnswSettings;
    use crate::joiner::point_uuid;
    use crate::vector_store::test_support::record;
    use axum::{
        extract::{Path, State},
        http::StatusCode as AxumStatus,
        routing::{get, post, put},
        Json, Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeQdrant {
        failures_left: AtomicUsize,
        reject: bool,
        upserts: Mutex<Vec<Value>>,
        created: Mutex<Vec<Value>>,
    }

    async fn fake_upsert(
        State(state): State<Arc<FakeQdrant>>,
        Path(_name): Path<String>,
        Json(body): Json<Value>,
    ) -> (AxumStatus, Json<Value>) {
        if state.reject {
            return (
                AxumStatus::BAD_REQUEST,
                Json(json!({"status": {"error": "wrong vector size"}})),
            );
        }
        let left = state.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            state.failures_left.store(left - 1, Ordering::SeqCst);
            return (AxumStatus::SERVICE_UNAVAILABLE, Json(json!({})));
        }
        state.upserts.lock().unwrap().push(body);
        (
            AxumStatus::OK,
            Json(json!({"result": {"status": "completed"}, "status": "ok"})),
        )
    }

    async fn fake_collection(Path(name): Path<String>) -> (AxumStatus, Json<Value>) {
        if name != "video_keyframes" {
            return (AxumStatus::NOT_FOUND, Json(json!({"status": {"error": "not found"}})));
        }
        (
            AxumStatus::OK,
            Json(json!({
                "result": {
                    "status": "green",
                    "points_count": 42,
                    "config": {"params": {"vectors": {"size": 512, "distance": "Cosine"}}}
                }
            })),
        )
    }

    async fn fake_create(
        State(state): State<Arc<FakeQdrant>>,
        Path(_name): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        state.created.lock().unwrap().push(body);
        Json(json!({"result": true}))
    }

    async fn fake_search(Json(body): Json<Value>) -> Json<Value> {
        let payload = serde_json::to_value(
            &record("L21_V001", 7, vec![], &["Car"]).payload,
        )
        .unwrap();
        assert_eq!(body["filter"]["must"][0]["key"], "object_labels");
        Json(json!({
            "result": [
                {"id": Uuid::nil(), "version": 1, "score": 0.91, "payload": payload},
                {"id": Uuid::nil(), "version": 1, "score": 0.5, "payload": {"unexpected": true}}
            ]
        }))
    }

    async fn spawn(state: Arc<FakeQdrant>) -> QdrantStore {
        let app = Router::new()
            .route("/collections/{name}", get(fake_collection).put(fake_create))
            .route("/collections/{name}/points", put(fake_upsert))
            .route("/collections/{name}/points/search", post(fake_search))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        QdrantStore::new(&format!("http://{}", addr), None, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_sends_uuid_points() {
        let state = Arc::new(FakeQdrant::default());
        let store = spawn(state.clone()).await;

        let records = vec![
            record("L21_V001", 1, vec![0.1, 0.2], &["Car"]),
            record("L21_V001", 2, vec![0.3, 0.4], &[]),
        ];
        store.upsert("video_keyframes", &records).await.unwrap();

        let upserts = state.upserts.lock().unwrap();
        let points = upserts[0]["points"].as_array().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(
            points[0]["id"],
            json!(point_uuid("L21_V001_001").to_string())
        );
        assert_eq!(points[0]["payload"]["original_id"], "L21_V001_001");
        assert_eq!(points[1]["payload"]["original_id"], "L21_V001_002");
        assert_eq!(points[0]["payload"]["video_id"], "L21_V001");
        assert_eq!(points[1]["payload"]["has_objects"], false);
    }

    #[tokio::test]
    async fn test_server_errors_are_transient() {
        let state = Arc::new(FakeQdrant {
            failures_left: AtomicUsize::new(1),
            ..Default::default()
        });
        let store = spawn(state).await;
        let records = vec![record("L21_V001", 1, vec![0.1], &[])];

        let err = store.upsert("video_keyframes", &records).await.unwrap_err();
        assert!(err.is_transient());
        store.upsert("video_keyframes", &records).await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_request_is_permanent() {
        let state = Arc::new(FakeQdrant {
            reject: true,
            ..Default::default()
        });
        let store = spawn(state).await;

        let err = store
            .upsert("video_keyframes", &[record("L21_V001", 1, vec![0.1], &[])])
            .await
            .unwrap_err();
        assert!(matches!(err, ClipframeError::Permanent(_)));
        assert!(err.to_string().contains("HTTP 400"));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transient() {
        let store =
            QdrantStore::new("http://127.0.0.1:1", None, Duration::from_millis(500)).unwrap();
        let err = store
            .upsert("video_keyframes", &[record("L21_V001", 1, vec![0.1], &[])])
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_collection_info_and_create() {
        let state = Arc::new(FakeQdrant::default());
        let store = spawn(state.clone()).await;

        let info = store.collection_info("video_keyframes").await.unwrap().unwrap();
        assert_eq!(info.vector_size, Some(512));
        assert_eq!(info.points_count, 42);
        assert!(store.collection_info("other").await.unwrap().is_none());

        store
            .create_collection(&CollectionSpec {
                name: "other".to_string(),
                vector_size: 512,
                hnsw: HnswSettings::default(),
                default_segment_number: 16,
                memmap_threshold: 20_000,
            })
            .await
            .unwrap();
        let created = state.created.lock().unwrap();
        assert_eq!(created[0]["vectors"]["distance"], "Cosine");
        assert_eq!(created[0]["hnsw_config"]["ef_construct"], 200);
    }

    #[tokio::test]
    async fn test_search_skips_foreign_payloads() {
        let store = spawn(Arc::new(FakeQdrant::default())).await;
        let request = SearchRequest {
            vector: vec![0.0; 4],
            filter: SearchFilter {
                object_labels: vec!["Car".to_string()],
                ..Default::default()
            },
            limit: 10,
            score_threshold: None,
        };

        let hits = store.search("video_keyframes", &request).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "L21_V001_007");
        assert!((hits[0].score - 0.91).abs() < 1e-6);
    }
}
