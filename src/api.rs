//! HTTP surface of the remote store.
//!
//! This is the service `RemoteStore` talks to. Records live in a single JSON document on disk:
//!
//! - `GET /api/health` – Liveness probe.
//! - `GET /files` / `POST /files` – List or append file records.
//! - `DELETE /files/:id` – Remove a file record, 404 when the id is unknown.
//! - `GET /messages` / `POST /messages` – List or append transcript entries.
//!
//! Records are kept as opaque JSON objects in insertion order; only the `id` field is
//! inspected.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Largest request body accepted, sized for extracted spreadsheets.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

const DOCUMENT_NAME: &str = "db.json";

/// Failures while reading or writing the backing document.
#[derive(Debug, Error)]
pub enum DocumentStoreError {
    /// Filesystem access failed.
    #[error("Document I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The document could not be encoded.
    #[error("Document encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    files: Vec<Value>,
    #[serde(default)]
    messages: Vec<Value>,
}

/// JSON document holding the catalog and the transcript.
///
/// Every request reads the document from disk and every write rewrites it whole; the mutex
/// serializes those read-modify-write cycles.
pub struct JsonDocumentStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonDocumentStore {
    /// Open `<data_dir>/db.json`, creating the directory and an empty document if needed.
    pub async fn open(data_dir: &FsPath) -> Result<Self, DocumentStoreError> {
        tokio::fs::create_dir_all(data_dir).await?;
        let path = data_dir.join(DOCUMENT_NAME);
        let store = Self {
            path,
            lock: Mutex::new(()),
        };
        if !tokio::fs::try_exists(&store.path).await? {
            tracing::info!(path = %store.path.display(), "Initializing document store");
            store.write(&Document::default()).await?;
        }
        Ok(store)
    }

    /// Location of the backing document.
    pub fn path(&self) -> &FsPath {
        &self.path
    }

    async fn read(&self) -> Document {
        let loaded = match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(DocumentStoreError::from),
            Err(error) => Err(error.into()),
        };
        loaded.unwrap_or_else(|error| {
            tracing::error!(path = %self.path.display(), error = %error, "Unreadable document; treating as empty");
            Document::default()
        })
    }

    async fn write(&self, document: &Document) -> Result<(), DocumentStoreError> {
        let encoded = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&self.path, encoded).await?;
        Ok(())
    }
}

/// Build the router serving `store`.
pub fn create_router(store: Arc<JsonDocumentStore>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/files", get(list_files).post(add_file))
        .route("/files/:id", delete(delete_file))
        .route("/messages", get(list_messages).post(add_message))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(store)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "online", "storage": "persistent_db" }))
}

async fn list_files(State(store): State<Arc<JsonDocumentStore>>) -> Json<Vec<Value>> {
    let _guard = store.lock.lock().await;
    Json(store.read().await.files)
}

async fn add_file(
    State(store): State<Arc<JsonDocumentStore>>,
    Json(record): Json<Value>,
) -> Result<Response, AppError> {
    if !has_id(&record) {
        return Ok(bad_request("Invalid file data"));
    }
    let _guard = store.lock.lock().await;
    let mut document = store.read().await;
    document.files.push(record.clone());
    store.write(&document).await?;
    tracing::info!(name = record.get("name").and_then(serde_json::Value::as_str).unwrap_or_default(), "File added");
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

async fn delete_file(
    State(store): State<Arc<JsonDocumentStore>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let _guard = store.lock.lock().await;
    let mut document = store.read().await;
    let before = document.files.len();
    document
        .files
        .retain(|record| record.get("id").and_then(Value::as_str) != Some(id.as_str()));
    if document.files.len() == before {
        return Ok((StatusCode::NOT_FOUND, Json(json!({ "error": "File not found" }))).into_response());
    }
    store.write(&document).await?;
    tracing::info!(id = %id, "File deleted");
    Ok(Json(json!({ "success": true })).into_response())
}

async fn list_messages(State(store): State<Arc<JsonDocumentStore>>) -> Json<Vec<Value>> {
    let _guard = store.lock.lock().await;
    Json(store.read().await.messages)
}

async fn add_message(
    State(store): State<Arc<JsonDocumentStore>>,
    Json(record): Json<Value>,
) -> Result<Response, AppError> {
    if !has_id(&record) {
        return Ok(bad_request("Invalid message data"));
    }
    let _guard = store.lock.lock().await;
    let mut document = store.read().await;
    document.messages.push(record.clone());
    store.write(&document).await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

fn has_id(record: &Value) -> bool {
    match record.get("id") {
        Some(Value::String(id)) => !id.is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

struct AppError(DocumentStoreError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "Document write failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

impl From<DocumentStoreError> for AppError {
    fn from(inner: DocumentStoreError) -> Self {
        Self(inner)
    }
}
