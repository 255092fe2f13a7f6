//! Core types for the try-on client

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::preview::PreviewHandle;

/// Which upload slot an image belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Person,
    Garment,
}

impl SlotKind {
    /// Multipart field name the backend expects for this slot
    pub fn form_field(&self) -> &'static str {
        match self {
            SlotKind::Person => "human_image",
            SlotKind::Garment => "garment_image",
        }
    }
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotKind::Person => write!(f, "person"),
            SlotKind::Garment => write!(f, "garment"),
        }
    }
}

/// Raw image bytes plus the metadata sent alongside them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    file_name: String,
    mime_type: String,
    data: Bytes,
}

impl ImagePayload {
    /// Build a payload, guessing the mime type from the file name
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .to_string();
        Self {
            file_name,
            mime_type,
            data: data.into(),
        }
    }

    /// Read a payload from disk
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::InvalidImage(format!("{} has no file name", path.display())))?;
        Ok(Self::new(file_name, data))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Holder for one uploaded image and its preview.
///
/// The preview is present exactly when the payload is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadSlot {
    content: Option<(ImagePayload, PreviewHandle)>,
}

impl UploadSlot {
    pub fn is_loaded(&self) -> bool {
        self.content.is_some()
    }

    pub fn payload(&self) -> Option<&ImagePayload> {
        self.content.as_ref().map(|(payload, _)| payload)
    }

    pub fn preview(&self) -> Option<&PreviewHandle> {
        self.content.as_ref().map(|(_, preview)| preview)
    }

    /// Store a new image, handing back the preview it displaced
    pub(crate) fn fill(
        &mut self,
        payload: ImagePayload,
        preview: PreviewHandle,
    ) -> Option<PreviewHandle> {
        self.content
            .replace((payload, preview))
            .map(|(_, old)| old)
    }

    /// Empty the slot, handing back its preview
    pub(crate) fn clear(&mut self) -> Option<PreviewHandle> {
        self.content.take().map(|(_, preview)| preview)
    }
}

pub const GUIDANCE_SCALE_MIN: f64 = 0.1;
pub const GUIDANCE_SCALE_MAX: f64 = 5.0;
pub const INFERENCE_STEPS_MIN: u32 = 10;
pub const INFERENCE_STEPS_MAX: u32 = 50;
/// Random seeds are drawn from `[0, SEED_RANDOM_BOUND)`
pub const SEED_RANDOM_BOUND: u64 = 1_000_000;

/// Knobs forwarded to the model with every request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub guidance_scale: f64,
    pub inference_steps: u32,
    pub seed: u64,
    pub ref_acceleration: bool,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            guidance_scale: 2.5,
            inference_steps: 30,
            seed: 42,
            ref_acceleration: false,
        }
    }
}

impl GenerationParameters {
    /// Store a single parameter, clamping ranged values into bounds.
    /// A NaN guidance scale has no place in the range and is dropped.
    pub fn apply(&mut self, value: ParameterValue) {
        if value.is_nan() {
            return;
        }
        match value {
            ParameterValue::GuidanceScale(v) => {
                self.guidance_scale = v.clamp(GUIDANCE_SCALE_MIN, GUIDANCE_SCALE_MAX);
            }
            ParameterValue::InferenceSteps(v) => {
                let clamped = v.clamp(INFERENCE_STEPS_MIN as i64, INFERENCE_STEPS_MAX as i64);
                self.inference_steps = clamped as u32;
            }
            ParameterValue::Seed(v) => self.seed = v,
            ParameterValue::RefAcceleration(v) => self.ref_acceleration = v,
        }
    }
}

/// One parameter edit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    GuidanceScale(f64),
    InferenceSteps(i64),
    Seed(u64),
    RefAcceleration(bool),
}

impl ParameterValue {
    /// Parse a `(name, value)` pair as typed on a command line or in a scenario.
    ///
    /// Names are accepted in both `snake_case` and `camelCase`.
    pub fn parse(name: &str, value: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidParameter {
            name: name.to_string(),
            reason,
        };
        let value = value.trim();

        match name {
            "guidance_scale" | "guidanceScale" => {
                let v: f64 = value.parse().map_err(|e| invalid(format!("{}", e)))?;
                if v.is_nan() {
                    return Err(invalid("not a number".to_string()));
                }
                Ok(ParameterValue::GuidanceScale(v))
            }
            "inference_steps" | "inferenceSteps" | "num_inference_steps" => value
                .parse()
                .map(ParameterValue::InferenceSteps)
                .map_err(|e| invalid(format!("{}", e))),
            "seed" => value
                .parse()
                .map(ParameterValue::Seed)
                .map_err(|e| invalid(format!("{}", e))),
            "ref_acceleration" | "refAcceleration" => value
                .parse()
                .map(ParameterValue::RefAcceleration)
                .map_err(|e| invalid(format!("{}", e))),
            other => Err(Error::UnknownParameter(other.to_string())),
        }
    }

    /// True for a guidance scale that is not a number
    pub fn is_nan(&self) -> bool {
        matches!(self, ParameterValue::GuidanceScale(v) if v.is_nan())
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParameterValue::GuidanceScale(_) => "guidance_scale",
            ParameterValue::InferenceSteps(_) => "inference_steps",
            ParameterValue::Seed(_) => "seed",
            ParameterValue::RefAcceleration(_) => "ref_acceleration",
        }
    }
}

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

impl Default for SessionPhase {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Submitting => write!(f, "submitting"),
            SessionPhase::Succeeded => write!(f, "succeeded"),
            SessionPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Identifies one dispatched request. Tokens only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(pub u64);

impl RequestToken {
    pub fn next(self) -> Self {
        RequestToken(self.0 + 1)
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the client knows about the current try-on attempt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub person: UploadSlot,
    pub garment: UploadSlot,
    pub parameters: GenerationParameters,
    pub result: Option<GenerationResult>,
    pub error: Option<String>,
    pub(crate) latest_request: RequestToken,
}

impl SessionState {
    pub fn slot(&self, kind: SlotKind) -> &UploadSlot {
        match kind {
            SlotKind::Person => &self.person,
            SlotKind::Garment => &self.garment,
        }
    }

    pub(crate) fn slot_mut(&mut self, kind: SlotKind) -> &mut UploadSlot {
        match kind {
            SlotKind::Person => &mut self.person,
            SlotKind::Garment => &mut self.garment,
        }
    }

    /// Token of the most recent dispatch or reset
    pub fn latest_request(&self) -> RequestToken {
        self.latest_request
    }

    /// Whether the submit action should be offered
    pub fn can_submit(&self) -> bool {
        self.phase != SessionPhase::Submitting && self.person.is_loaded() && self.garment.is_loaded()
    }

    pub fn result_image(&self) -> Option<&str> {
        self.result.as_ref().map(|r| r.result_image.as_str())
    }

    pub fn processing_time(&self) -> Option<f64> {
        self.result.as_ref().map(|r| r.processing_time)
    }
}

/// Captured request contents; later slot edits do not reach it
#[derive(Debug, Clone, PartialEq)]
pub struct TryOnRequest {
    pub person: ImagePayload,
    pub garment: ImagePayload,
    pub parameters: GenerationParameters,
}

/// Successful backend response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Image reference, usually a `data:` URI
    pub result_image: String,
    /// Seconds the backend spent generating
    pub processing_time: f64,
}

impl GenerationResult {
    pub fn summary(&self) -> String {
        format!("Processing completed in {:.2} seconds", self.processing_time)
    }

    pub fn is_data_uri(&self) -> bool {
        self.result_image.starts_with("data:")
    }

    /// Decode a `data:<mime>;base64,<payload>` reference
    pub fn decode_data_uri(&self) -> Result<Vec<u8>> {
        let rest = self
            .result_image
            .strip_prefix("data:")
            .ok_or_else(|| Error::InvalidImage("result is not a data URI".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::InvalidImage("data URI has no payload".to_string()))?;
        if !header.ends_with(";base64") {
            return Err(Error::InvalidImage(format!(
                "unsupported data URI encoding: {}",
                header
            )));
        }
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::InvalidImage(format!("bad base64 payload: {}", e)))
    }
}

/// Backend `/health` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        let mut params = GenerationParameters::default();
        params.apply(ParameterValue::GuidanceScale(10.0));
        params.apply(ParameterValue::InferenceSteps(1));
        assert_eq!(params.guidance_scale, 5.0);
        assert_eq!(params.inference_steps, 10);

        params.apply(ParameterValue::GuidanceScale(-3.0));
        params.apply(ParameterValue::InferenceSteps(500));
        assert_eq!(params.guidance_scale, 0.1);
        assert_eq!(params.inference_steps, 50);
    }

    #[test]
    fn test_parse_parameter_names() {
        assert_eq!(
            ParameterValue::parse("guidanceScale", "3.5").unwrap(),
            ParameterValue::GuidanceScale(3.5)
        );
        assert_eq!(
            ParameterValue::parse("inference_steps", "-4").unwrap(),
            ParameterValue::InferenceSteps(-4)
        );
        assert_eq!(
            ParameterValue::parse("ref_acceleration", "true").unwrap(),
            ParameterValue::RefAcceleration(true)
        );
        assert!(matches!(
            ParameterValue::parse("seed", "-1"),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(matches!(
            ParameterValue::parse("guidance_scale", "NaN"),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(matches!(
            ParameterValue::parse("strength", "1"),
            Err(Error::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_payload_mime_guess() {
        let payload = ImagePayload::new("human.jpg", vec![1u8, 2, 3]);
        assert_eq!(payload.mime_type(), "image/jpeg");
        assert_eq!(payload.len(), 3);

        let unknown = ImagePayload::new("blob", vec![1u8]);
        assert_eq!(unknown.mime_type(), "application/octet-stream");
    }

    #[test]
    fn test_decode_data_uri() {
        let result = GenerationResult {
            result_image: "data:image/jpeg;base64,aGVsbG8=".to_string(),
            processing_time: 12.346,
        };
        assert_eq!(result.decode_data_uri().unwrap(), b"hello");
        assert_eq!(result.summary(), "Processing completed in 12.35 seconds");

        let url = GenerationResult {
            result_image: "https://example.test/out.jpg".to_string(),
            processing_time: 1.0,
        };
        assert!(!url.is_data_uri());
        assert!(url.decode_data_uri().is_err());
    }
}
