//! Scenario runner that drives a controller against the stub or a live backend

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use tryon_common::{
    ClientConfig, HttpBackend, ImagePayload, ParameterValue, SessionState, SubmitOutcome,
    TryOnController,
};

use crate::error::{E2eError, E2eResult};
use crate::server::StubServer;
use crate::spec::{scalar_text, OutcomeKind, ScenarioSpec, ScenarioStep, StateExpectation};

/// Scenarios with this tag depend on stub-only controls
pub const STUB_ONLY_TAG: &str = "stub";

/// Result of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub skipped: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

impl TestResult {
    fn skipped(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            skipped: true,
            duration_ms: 0,
            steps: vec![],
            error: Some(reason.to_string()),
        }
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,

    /// Run against this backend instead of a stub. Scenarios tagged
    /// `stub` are skipped.
    pub backend_url: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            specs_dir: PathBuf::from("crates/e2e/specs"),
            output_dir: PathBuf::from("test-results"),
            backend_url: None,
        }
    }
}

/// Mutable state threaded through one scenario's steps
struct ScenarioContext<'a> {
    spec: &'a ScenarioSpec,
    controller: TryOnController,
    stub: Option<&'a StubServer>,
    pending: Option<JoinHandle<SubmitOutcome>>,
}

/// Main scenario runner
pub struct ScenarioRunner {
    config: RunnerConfig,
    stub: Option<StubServer>,
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config, stub: None }
    }

    /// Start the stub server unless a live backend is configured
    pub async fn start_stub(&mut self) -> E2eResult<()> {
        if self.stub.is_some() || self.config.backend_url.is_some() {
            return Ok(());
        }
        self.stub = Some(StubServer::start(Default::default()).await?);
        Ok(())
    }

    pub async fn stop_stub(&mut self) {
        if let Some(stub) = self.stub.take() {
            stub.stop().await;
        }
    }

    /// Run all scenarios in the specs directory
    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let specs = ScenarioSpec::load_all(&self.config.specs_dir)?;
        self.run_specs(&specs).await
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = ScenarioSpec::load_all(&self.config.specs_dir)?;
        let filtered: Vec<ScenarioSpec> = specs.into_iter().filter(|s| s.has_tag(tag)).collect();
        self.run_specs(&filtered).await
    }

    /// Run a specific scenario by name
    pub async fn run_test(&mut self, name: &str) -> E2eResult<TestResult> {
        let specs = ScenarioSpec::load_all(&self.config.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;

        self.start_stub().await?;
        self.run_spec(&spec).await
    }

    /// Run a list of scenarios
    pub async fn run_specs(&mut self, specs: &[ScenarioSpec]) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        let mut results = Vec::new();
        let (mut passed, mut failed, mut skipped) = (0, 0, 0);

        self.start_stub().await?;

        info!("Running {} scenario(s)...", specs.len());

        for spec in specs {
            let result = match self.run_spec(spec).await {
                Ok(result) => result,
                Err(e) => TestResult {
                    name: spec.name.clone(),
                    success: false,
                    skipped: false,
                    duration_ms: 0,
                    steps: vec![],
                    error: Some(e.to_string()),
                },
            };

            if result.skipped {
                skipped += 1;
                info!("- {} (skipped)", result.name);
            } else if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Scenario results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(TestSuiteResult {
            total: specs.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    fn client_config(&self) -> E2eResult<ClientConfig> {
        let mut config = ClientConfig::default();
        match (&self.config.backend_url, &self.stub) {
            (Some(url), _) => config.base_url = url.clone(),
            (None, Some(stub)) => config.base_url = stub.base_url().to_string(),
            (None, None) => {
                return Err(E2eError::StubStartup("stub server not started".to_string()))
            }
        }
        Ok(config)
    }

    /// Run a single scenario with a fresh controller
    pub async fn run_spec(&mut self, spec: &ScenarioSpec) -> E2eResult<TestResult> {
        if self.config.backend_url.is_some() && spec.has_tag(STUB_ONLY_TAG) {
            return Ok(TestResult::skipped(&spec.name, "requires the stub backend"));
        }

        let start = Instant::now();
        debug!("Running scenario: {}", spec.name);

        if let Some(stub) = &self.stub {
            stub.reset(spec.backend.clone());
        }

        let backend = HttpBackend::from_config(&self.client_config()?)?;
        let mut ctx = ScenarioContext {
            spec,
            controller: TryOnController::new(Arc::new(backend)),
            stub: self.stub.as_ref(),
            pending: None,
        };

        let mut step_results = Vec::new();
        let mut test_error = None;

        for step in &spec.steps {
            let step_start = Instant::now();
            let outcome = execute_step(&mut ctx, step).await;
            let result = StepResult {
                step: step.label(),
                success: outcome.is_ok(),
                duration_ms: step_start.elapsed().as_millis() as u64,
                error: outcome.err().map(|e| e.to_string()),
            };

            if !result.success {
                test_error = result.error.clone();
                step_results.push(result);
                break;
            }
            step_results.push(result);
        }

        // Don't leave a detached request running into the next scenario
        if let Some(pending) = ctx.pending.take() {
            pending.abort();
        }

        Ok(TestResult {
            name: spec.name.clone(),
            success: test_error.is_none(),
            skipped: false,
            duration_ms: start.elapsed().as_millis() as u64,
            steps: step_results,
            error: test_error,
        })
    }

    /// Write results to `test-results.json` in the output directory
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn step_failed(step: &ScenarioStep, reason: impl Into<String>) -> E2eError {
    E2eError::StepFailed {
        step: step.label(),
        reason: reason.into(),
    }
}

fn check_outcome(expected: Option<OutcomeKind>, actual: SubmitOutcome) -> E2eResult<()> {
    match expected {
        Some(kind) if kind != OutcomeKind::from(actual) => Err(E2eError::AssertionFailed(format!(
            "expected submit outcome {:?}, got {:?}",
            kind, actual
        ))),
        _ => Ok(()),
    }
}

async fn execute_step(ctx: &mut ScenarioContext<'_>, step: &ScenarioStep) -> E2eResult<()> {
    match step {
        ScenarioStep::Upload {
            slot,
            path,
            fixture,
            empty,
            expect_rejected,
        } => {
            let payload = if *empty {
                ImagePayload::new(format!("{}.png", slot), Bytes::new())
            } else if let Some(path) = path {
                let resolved = match &ctx.spec.source_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                ImagePayload::from_path(&resolved).await?
            } else {
                let fixture = fixture.clone().unwrap_or_default();
                let name = format!("{}.{}", slot, fixture.extension());
                ImagePayload::new(name, fixture.render()?)
            };

            match (ctx.controller.set_image(*slot, payload), *expect_rejected) {
                (Ok(()), false) | (Err(_), true) => Ok(()),
                (Ok(()), true) => Err(step_failed(step, "upload was accepted")),
                (Err(e), false) => Err(e.into()),
            }
        }

        ScenarioStep::SetParameter { name, value } => {
            let value = ParameterValue::parse(name, &scalar_text(value)?)?;
            ctx.controller.set_parameter(value)?;
            Ok(())
        }

        ScenarioStep::RandomSeed => {
            let seed = ctx.controller.generate_random_seed();
            debug!("Random seed {}", seed);
            Ok(())
        }

        ScenarioStep::Submit { expect } => {
            let outcome = ctx.controller.submit().await;
            check_outcome(*expect, outcome)
        }

        ScenarioStep::SubmitDetached => {
            if ctx.pending.is_some() {
                return Err(step_failed(step, "a detached submit is already pending"));
            }
            let controller = ctx.controller.clone();
            ctx.pending = Some(tokio::spawn(async move { controller.submit().await }));
            Ok(())
        }

        ScenarioStep::AwaitPending { expect } => {
            let pending = ctx
                .pending
                .take()
                .ok_or_else(|| step_failed(step, "no detached submit to await"))?;
            let outcome = pending
                .await
                .map_err(|e| step_failed(step, format!("submit task failed: {}", e)))?;
            check_outcome(*expect, outcome)
        }

        ScenarioStep::WaitForPhase { phase, timeout_ms } => {
            let deadline = Instant::now() + Duration::from_millis(*timeout_ms);
            while ctx.controller.phase() != *phase {
                if Instant::now() >= deadline {
                    return Err(E2eError::Timeout(format!(
                        "phase {} (still {})",
                        phase,
                        ctx.controller.phase()
                    )));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok(())
        }

        ScenarioStep::Reset => {
            ctx.controller.reset();
            Ok(())
        }

        ScenarioStep::SetBackend { behavior } => {
            let stub = ctx
                .stub
                .ok_or_else(|| step_failed(step, "no stub backend to configure"))?;
            stub.set_behavior(behavior.clone());
            Ok(())
        }

        ScenarioStep::Expect(expectation) => check_state(&ctx.controller.state(), expectation),

        ScenarioStep::ExpectCalls { count } => {
            let stub = ctx
                .stub
                .ok_or_else(|| step_failed(step, "call counts need the stub backend"))?;
            if stub.calls() != *count {
                return Err(E2eError::AssertionFailed(format!(
                    "expected {} backend call(s), got {}",
                    count,
                    stub.calls()
                )));
            }
            Ok(())
        }

        ScenarioStep::ExpectRequest { fields, images } => {
            let stub = ctx
                .stub
                .ok_or_else(|| step_failed(step, "request capture needs the stub backend"))?;
            let request = stub
                .last_request()
                .ok_or_else(|| E2eError::AssertionFailed("no request received".to_string()))?;

            for (name, expected) in fields {
                match request.fields.get(name) {
                    Some(actual) if actual == expected => {}
                    actual => {
                        return Err(E2eError::AssertionFailed(format!(
                            "field {}: expected {:?}, got {:?}",
                            name, expected, actual
                        )))
                    }
                }
            }
            for name in images {
                if !request.images.contains_key(name) {
                    return Err(E2eError::AssertionFailed(format!("image part {} missing", name)));
                }
            }
            Ok(())
        }

        ScenarioStep::ExpectPreviews { live } => {
            let actual = ctx.controller.previews().live_count();
            if actual != *live {
                return Err(E2eError::AssertionFailed(format!(
                    "expected {} live preview(s), got {}",
                    live, actual
                )));
            }
            Ok(())
        }

        ScenarioStep::Log { message } => {
            info!("[{}] {}", ctx.spec.name, message);
            Ok(())
        }
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// Compare the observable session against an expectation
pub fn check_state(state: &SessionState, expected: &StateExpectation) -> E2eResult<()> {
    let mut problems = Vec::new();

    if let Some(phase) = expected.phase {
        if state.phase != phase {
            problems.push(format!("phase: expected {}, got {}", phase, state.phase));
        }
    }
    if let Some(message) = &expected.error {
        if state.error.as_deref() != Some(message.as_str()) {
            problems.push(format!("error: expected {:?}, got {:?}", message, state.error));
        }
    }
    if expected.no_error && state.error.is_some() {
        problems.push(format!("error: expected none, got {:?}", state.error));
    }
    if let Some(time) = expected.processing_time {
        match state.processing_time() {
            Some(actual) if close(actual, time) => {}
            actual => problems.push(format!("processing_time: expected {}, got {:?}", time, actual)),
        }
    }
    if let Some(prefix) = &expected.result_prefix {
        match state.result_image() {
            Some(image) if image.starts_with(prefix.as_str()) => {}
            Some(image) => problems.push(format!(
                "result: expected prefix {:?}, got {:?}",
                prefix,
                image.chars().take(32).collect::<String>()
            )),
            None => problems.push(format!("result: expected prefix {:?}, got none", prefix)),
        }
    }
    if expected.no_result && state.result.is_some() {
        problems.push("result: expected none".to_string());
    }
    if let Some(loaded) = expected.person_loaded {
        if state.person.is_loaded() != loaded {
            problems.push(format!("person_loaded: expected {}", loaded));
        }
    }
    if let Some(loaded) = expected.garment_loaded {
        if state.garment.is_loaded() != loaded {
            problems.push(format!("garment_loaded: expected {}", loaded));
        }
    }

    let params = &state.parameters;
    if let Some(v) = expected.guidance_scale {
        if !close(params.guidance_scale, v) {
            problems.push(format!("guidance_scale: expected {}, got {}", v, params.guidance_scale));
        }
    }
    if let Some(v) = expected.inference_steps {
        if params.inference_steps != v {
            problems.push(format!("inference_steps: expected {}, got {}", v, params.inference_steps));
        }
    }
    if let Some(v) = expected.seed {
        if params.seed != v {
            problems.push(format!("seed: expected {}, got {}", v, params.seed));
        }
    }
    if let Some(v) = expected.ref_acceleration {
        if params.ref_acceleration != v {
            problems.push(format!("ref_acceleration: expected {}, got {}", v, params.ref_acceleration));
        }
    }
    if let Some(v) = expected.can_submit {
        if state.can_submit() != v {
            problems.push(format!("can_submit: expected {}", v));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tryon_common::SessionPhase;

    #[test]
    fn test_check_state_defaults() {
        let state = SessionState::default();
        let expected = StateExpectation {
            phase: Some(SessionPhase::Idle),
            no_error: true,
            no_result: true,
            person_loaded: Some(false),
            guidance_scale: Some(2.5),
            inference_steps: Some(30),
            seed: Some(42),
            ref_acceleration: Some(false),
            can_submit: Some(false),
            ..Default::default()
        };
        check_state(&state, &expected).unwrap();
    }

    #[test]
    fn test_check_state_collects_every_mismatch() {
        let state = SessionState::default();
        let expected = StateExpectation {
            phase: Some(SessionPhase::Succeeded),
            seed: Some(7),
            ..Default::default()
        };
        let err = check_state(&state, &expected).unwrap_err().to_string();
        assert!(err.contains("phase"));
        assert!(err.contains("seed"));
    }

    #[test]
    fn test_result_prefix_mismatch_with_multibyte_reference() {
        let mut state = SessionState::default();
        state.phase = SessionPhase::Succeeded;
        state.result = Some(tryon_common::GenerationResult {
            result_image: format!("{}{}", "x".repeat(31), "ééééé"),
            processing_time: 1.0,
        });
        let expected = StateExpectation {
            result_prefix: Some("data:".to_string()),
            ..Default::default()
        };

        let err = check_state(&state, &expected).unwrap_err();
        assert!(matches!(err, E2eError::AssertionFailed(_)));
        assert!(err.to_string().contains("xxxé"));
    }

    #[test]
    fn test_check_outcome() {
        assert!(check_outcome(None, SubmitOutcome::Rejected).is_ok());
        assert!(check_outcome(Some(OutcomeKind::Rejected), SubmitOutcome::Rejected).is_ok());
        assert!(check_outcome(
            Some(OutcomeKind::Succeeded),
            SubmitOutcome::Completed(SessionPhase::Failed)
        )
        .is_err());
    }
}
