//! Inference backend contract
//!
//! The backend is an opaque HTTP endpoint taking a multipart form with both
//! images and the four generation parameters. A 2xx reply carries
//! `result_image` and `processing_time`; anything else may carry a `detail`
//! string explaining the failure.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Result, TryOnFailure};
use crate::types::{GenerationResult, HealthStatus, ImagePayload, SlotKind, TryOnRequest};

pub const FIELD_GUIDANCE_SCALE: &str = "guidance_scale";
pub const FIELD_INFERENCE_STEPS: &str = "num_inference_steps";
pub const FIELD_SEED: &str = "seed";
pub const FIELD_REF_ACCELERATION: &str = "ref_acceleration";

/// Something that can turn a try-on request into a result
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn generate(
        &self,
        request: TryOnRequest,
    ) -> std::result::Result<GenerationResult, TryOnFailure>;
}

/// Backend reached over HTTP with multipart uploads
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: Url,
    health_url: Url,
}

impl HttpBackend {
    /// Build a backend from client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: config.endpoint_url()?,
            health_url: config.health_url()?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Query the backend health route
    pub async fn health(&self) -> Result<HealthStatus> {
        let status = self
            .client
            .get(self.health_url.clone())
            .send()
            .await?
            .error_for_status()?
            .json::<HealthStatus>()
            .await?;
        Ok(status)
    }
}

/// Build the multipart body for a request
pub fn build_form(request: &TryOnRequest) -> Form {
    let params = &request.parameters;
    Form::new()
        .part(SlotKind::Person.form_field(), image_part(&request.person))
        .part(SlotKind::Garment.form_field(), image_part(&request.garment))
        .text(FIELD_GUIDANCE_SCALE, params.guidance_scale.to_string())
        .text(FIELD_INFERENCE_STEPS, params.inference_steps.to_string())
        .text(FIELD_SEED, params.seed.to_string())
        .text(FIELD_REF_ACCELERATION, params.ref_acceleration.to_string())
}

fn image_part(payload: &ImagePayload) -> Part {
    let part = Part::bytes(payload.data().to_vec()).file_name(payload.file_name().to_string());
    match part.mime_str(payload.mime_type()) {
        Ok(part) => part,
        Err(e) => {
            warn!("Ignoring unusable mime type {}: {}", payload.mime_type(), e);
            Part::bytes(payload.data().to_vec()).file_name(payload.file_name().to_string())
        }
    }
}

/// Pull a non-empty `detail` string out of an error body
pub fn extract_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("detail")
        .and_then(|d| d.as_str())
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl InferenceBackend for HttpBackend {
    async fn generate(
        &self,
        request: TryOnRequest,
    ) -> std::result::Result<GenerationResult, TryOnFailure> {
        info!(
            "Posting try-on request to {} ({} + {} bytes, steps={}, seed={})",
            self.endpoint,
            request.person.len(),
            request.garment.len(),
            request.parameters.inference_steps,
            request.parameters.seed
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(build_form(&request))
            .send()
            .await
            .map_err(|e| TryOnFailure::Network(e.to_string()))?;

        let status = response.status();
        debug!("Backend replied with {}", status);

        if status.is_success() {
            response
                .json::<GenerationResult>()
                .await
                .map_err(|e| TryOnFailure::MalformedResponse(e.to_string()))
        } else {
            let body = response.bytes().await.unwrap_or_default();
            Err(TryOnFailure::Backend {
                status: status.as_u16(),
                detail: extract_detail(&body),
            })
        }
    }
}
