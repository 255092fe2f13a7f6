//! Stub inference server
//!
//! Speaks the backend's wire contract without running a model: the upload
//! route accepts the multipart form, records what arrived, and answers with
//! either the person image re-encoded as a JPEG data URI or a configured
//! failure.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use bytes::Bytes;
use image::ImageFormat;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use tryon_common::backend::{
    FIELD_GUIDANCE_SCALE, FIELD_INFERENCE_STEPS, FIELD_REF_ACCELERATION, FIELD_SEED,
};
use tryon_common::SlotKind;

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// How the stub answers upload requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StubBehavior {
    Succeed {
        #[serde(default = "default_processing_time")]
        processing_time: f64,
        #[serde(default)]
        delay_ms: u64,
    },
    Fail {
        status: u16,
        #[serde(default)]
        detail: Option<String>,
        #[serde(default)]
        delay_ms: u64,
    },
}

fn default_processing_time() -> f64 {
    12.34
}

impl Default for StubBehavior {
    fn default() -> Self {
        StubBehavior::Succeed {
            processing_time: default_processing_time(),
            delay_ms: 0,
        }
    }
}

impl StubBehavior {
    fn delay(&self) -> Duration {
        match self {
            StubBehavior::Succeed { delay_ms, .. } | StubBehavior::Fail { delay_ms, .. } => {
                Duration::from_millis(*delay_ms)
            }
        }
    }
}

/// An image part as the stub received it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedImage {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: usize,
    pub sha256: String,
}

/// One upload request as the stub received it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceivedRequest {
    pub fields: BTreeMap<String, String>,
    pub images: BTreeMap<String, ReceivedImage>,
}

/// Shared stub state
#[derive(Debug, Default)]
pub struct StubState {
    behavior: RwLock<StubBehavior>,
    calls: AtomicUsize,
    last_request: Mutex<Option<ReceivedRequest>>,
}

impl StubState {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior: RwLock::new(behavior),
            ..Default::default()
        }
    }

    pub fn set_behavior(&self, behavior: StubBehavior) {
        *self.behavior.write() = behavior;
    }

    /// Forget calls and recorded requests
    pub fn clear(&self) {
        self.calls.store(0, Ordering::SeqCst);
        *self.last_request.lock() = None;
    }

    /// Upload requests received so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ReceivedRequest> {
        self.last_request.lock().clone()
    }
}

/// Build the stub router.
///
/// Routes are mounted both at the backend's own paths and under `/api`, the
/// prefix the web front end proxied through.
pub fn router(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
        .route("/try-on/upload", post(upload_handler))
        .route("/api/try-on/upload", post(upload_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "model_loaded": true
    }))
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "detail": message.into() }))).into_response()
}

async fn upload_handler(State(state): State<Arc<StubState>>, mut multipart: Multipart) -> Response {
    let call = state.calls.fetch_add(1, Ordering::SeqCst) + 1;

    let mut received = ReceivedRequest::default();
    let mut person: Option<Bytes> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return detail(StatusCode::BAD_REQUEST, format!("Invalid multipart body: {}", e)),
        };

        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => return detail(StatusCode::BAD_REQUEST, format!("Unreadable field {}: {}", name, e)),
        };

        if file_name.is_some() {
            received.images.insert(
                name.clone(),
                ReceivedImage {
                    file_name,
                    content_type,
                    bytes: data.len(),
                    sha256: hex::encode(Sha256::digest(&data)),
                },
            );
            if name == SlotKind::Person.form_field() {
                person = Some(data);
            }
        } else {
            received
                .fields
                .insert(name, String::from_utf8_lossy(&data).into_owned());
        }
    }

    let missing: Vec<&str> = [SlotKind::Person.form_field(), SlotKind::Garment.form_field()]
        .into_iter()
        .filter(|name| !received.images.contains_key(*name))
        .chain(
            [FIELD_GUIDANCE_SCALE, FIELD_INFERENCE_STEPS, FIELD_SEED, FIELD_REF_ACCELERATION]
                .into_iter()
                .filter(|name| !received.fields.contains_key(*name)),
        )
        .collect();

    debug!("Stub call {}: {:?}", call, received.fields);
    *state.last_request.lock() = Some(received);

    if !missing.is_empty() {
        // Same shape a schema-validating server uses: a list, not a string
        let errors: Vec<_> = missing
            .iter()
            .map(|name| serde_json::json!({ "loc": ["body", name], "msg": "field required" }))
            .collect();
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "detail": errors })),
        )
            .into_response();
    }

    let behavior = state.behavior.read().clone();
    let delay = behavior.delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    match behavior {
        StubBehavior::Succeed {
            processing_time, ..
        } => {
            let person = person.unwrap_or_default();
            match render_result(&person) {
                Ok(result_image) => {
                    info!("Stub call {} succeeded", call);
                    Json(serde_json::json!({
                        "result_image": result_image,
                        "processing_time": processing_time,
                    }))
                    .into_response()
                }
                Err(e) => detail(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error during virtual try-on: {}", e),
                ),
            }
        }
        StubBehavior::Fail { status, detail, .. } => {
            info!("Stub call {} failing with {}", call, status);
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = match detail {
                Some(d) => serde_json::json!({ "detail": d }),
                None => serde_json::json!({}),
            };
            (status, Json(body)).into_response()
        }
    }
}

/// Re-encode the person image as a JPEG data URI
pub fn render_result(person: &[u8]) -> Result<String, image::ImageError> {
    let img = image::load_from_memory(person)?.to_rgb8();
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(buf.into_inner());
    Ok(format!("data:image/jpeg;base64,{}", encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::FixtureImage;

    #[test]
    fn test_render_result_is_jpeg_data_uri() {
        let png = FixtureImage::solid([200, 30, 30]).render().unwrap();
        let uri = render_result(&png).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));

        let result = tryon_common::GenerationResult {
            result_image: uri,
            processing_time: 0.0,
        };
        let jpeg = result.decode_data_uri().unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_render_result_rejects_garbage() {
        assert!(render_result(b"not an image").is_err());
    }

    #[test]
    fn test_behavior_yaml() {
        let behavior: StubBehavior =
            serde_yaml::from_str("mode: fail\nstatus: 500\ndetail: model overloaded\n").unwrap();
        assert_eq!(
            behavior,
            StubBehavior::Fail {
                status: 500,
                detail: Some("model overloaded".to_string()),
                delay_ms: 0,
            }
        );
        let default: StubBehavior = serde_yaml::from_str("mode: succeed").unwrap();
        assert_eq!(default, StubBehavior::default());
    }
}
