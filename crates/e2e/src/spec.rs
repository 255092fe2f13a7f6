//! Declarative YAML scenario specification

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tryon_common::{SessionPhase, SlotKind, SubmitOutcome};

use crate::error::{E2eError, E2eResult};
use crate::fixtures::FixtureImage;
use crate::stub::StubBehavior;

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// How the stub backend answers at the start of the scenario
    #[serde(default)]
    pub backend: StubBehavior,

    /// Steps to execute in order
    pub steps: Vec<ScenarioStep>,

    /// Directory the scenario was loaded from; relative upload paths resolve here
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Load an image into a slot, from disk or generated
    Upload {
        slot: SlotKind,
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        fixture: Option<FixtureImage>,
        /// Upload a zero-length file
        #[serde(default)]
        empty: bool,
        #[serde(default)]
        expect_rejected: bool,
    },

    /// Edit a generation parameter; the value is parsed as the form would
    SetParameter {
        name: String,
        value: serde_yaml::Value,
    },

    /// Replace the seed with a random one
    RandomSeed,

    /// Submit and wait for the outcome
    Submit {
        #[serde(default)]
        expect: Option<OutcomeKind>,
    },

    /// Submit in the background; collect it with `await_pending`
    SubmitDetached,

    /// Wait for the background submission
    AwaitPending {
        #[serde(default)]
        expect: Option<OutcomeKind>,
    },

    /// Poll until the session reaches a phase
    WaitForPhase {
        phase: SessionPhase,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Clear the whole session
    Reset,

    /// Change how the stub answers from here on
    SetBackend { behavior: StubBehavior },

    /// Assert on the session state
    Expect(StateExpectation),

    /// Assert on the number of upload requests the backend received
    ExpectCalls { count: usize },

    /// Assert on the text fields of the last upload request
    ExpectRequest {
        #[serde(default)]
        fields: BTreeMap<String, String>,
        #[serde(default)]
        images: Vec<String>,
    },

    /// Assert on the number of live preview handles
    ExpectPreviews { live: usize },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_wait_timeout() -> u64 {
    5000
}

/// Observable state assertions; unset fields are not checked
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateExpectation {
    #[serde(default)]
    pub phase: Option<SessionPhase>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub no_error: bool,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub result_prefix: Option<String>,
    #[serde(default)]
    pub no_result: bool,
    #[serde(default)]
    pub person_loaded: Option<bool>,
    #[serde(default)]
    pub garment_loaded: Option<bool>,
    #[serde(default)]
    pub guidance_scale: Option<f64>,
    #[serde(default)]
    pub inference_steps: Option<u32>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub ref_acceleration: Option<bool>,
    #[serde(default)]
    pub can_submit: Option<bool>,
}

/// Serializable mirror of [`SubmitOutcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Rejected,
    AlreadyInFlight,
    Succeeded,
    Failed,
    Superseded,
}

impl From<SubmitOutcome> for OutcomeKind {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Rejected => OutcomeKind::Rejected,
            SubmitOutcome::AlreadyInFlight => OutcomeKind::AlreadyInFlight,
            SubmitOutcome::Completed(SessionPhase::Succeeded) => OutcomeKind::Succeeded,
            SubmitOutcome::Completed(_) => OutcomeKind::Failed,
            SubmitOutcome::Superseded => OutcomeKind::Superseded,
        }
    }
}

impl ScenarioStep {
    /// Short label used in step results and logs
    pub fn label(&self) -> String {
        match self {
            ScenarioStep::Upload { slot, .. } => format!("upload {}", slot),
            ScenarioStep::SetParameter { name, .. } => format!("set {}", name),
            ScenarioStep::RandomSeed => "random seed".to_string(),
            ScenarioStep::Submit { .. } => "submit".to_string(),
            ScenarioStep::SubmitDetached => "submit (detached)".to_string(),
            ScenarioStep::AwaitPending { .. } => "await pending".to_string(),
            ScenarioStep::WaitForPhase { phase, .. } => format!("wait for {}", phase),
            ScenarioStep::Reset => "reset".to_string(),
            ScenarioStep::SetBackend { .. } => "set backend".to_string(),
            ScenarioStep::Expect(_) => "expect state".to_string(),
            ScenarioStep::ExpectCalls { count } => format!("expect {} call(s)", count),
            ScenarioStep::ExpectRequest { .. } => "expect request".to_string(),
            ScenarioStep::ExpectPreviews { live } => format!("expect {} preview(s)", live),
            ScenarioStep::Log { .. } => "log".to_string(),
        }
    }
}

impl ScenarioSpec {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut spec = Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))?;
        spec.source_dir = path.parent().map(Path::to_path_buf);
        Ok(spec)
    }

    /// Load all scenarios from a directory, ordered by file name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            specs.push(Self::from_file(entry.path())?);
        }

        Ok(specs)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.has_tag(tag)).collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Render a YAML scalar the way a form field would hold it
pub fn scalar_text(value: &serde_yaml::Value) -> E2eResult<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(E2eError::SpecParse(format!(
            "parameter value must be a scalar, got {:?}",
            other
        ))),
    }
}
