//! Controller behaviour against in-memory backends

use async_trait::async_trait;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use tryon_common::{
    GenerationParameters, GenerationResult, ImagePayload, InferenceBackend, ParameterValue,
    SessionPhase, SlotKind, SubmitOutcome, TryOnController, TryOnFailure, TryOnRequest,
};

/// Backend that counts calls, optionally waits for a release signal, then
/// answers with a canned outcome
struct ScriptedBackend {
    calls: AtomicUsize,
    outcome: Result<GenerationResult, TryOnFailure>,
    gate: Option<Arc<Notify>>,
    delay: Duration,
    seen: parking_lot::Mutex<Vec<TryOnRequest>>,
}

impl ScriptedBackend {
    fn answering(outcome: Result<GenerationResult, TryOnFailure>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            outcome,
            gate: None,
            delay: Duration::ZERO,
            seen: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn generate(&self, request: TryOnRequest) -> Result<GenerationResult, TryOnFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(request);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}

fn success() -> GenerationResult {
    GenerationResult {
        result_image: "data:image/jpeg;base64,/9j/4AAQ".to_string(),
        processing_time: 12.34,
    }
}

fn load_both(controller: &TryOnController) {
    controller
        .set_image(SlotKind::Person, ImagePayload::new("human.jpg", vec![0xFF, 0xD8, 0x01]))
        .unwrap();
    controller
        .set_image(SlotKind::Garment, ImagePayload::new("garment.jpg", vec![0xFF, 0xD8, 0x02]))
        .unwrap();
}

async fn wait_for_phase(controller: &TryOnController, phase: SessionPhase) {
    while controller.phase() != phase {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_successful_round_trip() {
    let backend = Arc::new(ScriptedBackend::answering(Ok(success())));
    let controller = TryOnController::new(backend.clone());
    load_both(&controller);

    let outcome = controller.submit().await;
    assert_eq!(outcome, SubmitOutcome::Completed(SessionPhase::Succeeded));

    let state = controller.state();
    assert_eq!(state.phase, SessionPhase::Succeeded);
    assert_eq!(state.processing_time(), Some(12.34));
    assert_eq!(state.result_image(), Some("data:image/jpeg;base64,/9j/4AAQ"));
    assert!(state.error.is_none());

    let seen = backend.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].parameters, GenerationParameters::default());
    assert_eq!(seen[0].person.file_name(), "human.jpg");
}

#[tokio::test]
async fn test_backend_detail_is_surfaced() {
    let backend = Arc::new(ScriptedBackend::answering(Err(TryOnFailure::Backend {
        status: 500,
        detail: Some("model overloaded".to_string()),
    })));
    let controller = TryOnController::new(backend);
    load_both(&controller);

    assert_eq!(
        controller.submit().await,
        SubmitOutcome::Completed(SessionPhase::Failed)
    );
    assert_eq!(controller.state().error.as_deref(), Some("model overloaded"));
}

#[tokio::test]
async fn test_network_error_uses_generic_message() {
    let backend = Arc::new(ScriptedBackend::answering(Err(TryOnFailure::Network(
        "connection refused".to_string(),
    ))));
    let controller = TryOnController::new(backend);
    load_both(&controller);

    controller.submit().await;
    let state = controller.state();
    assert_eq!(state.phase, SessionPhase::Failed);
    assert_eq!(
        state.error.as_deref(),
        Some(tryon_common::error::GENERIC_FAILURE_MESSAGE)
    );
}

#[tokio::test]
async fn test_submit_with_missing_image_makes_no_call() {
    let backend = Arc::new(ScriptedBackend::answering(Ok(success())));
    let controller = TryOnController::new(backend.clone());
    controller
        .set_image(SlotKind::Garment, ImagePayload::new("garment.jpg", vec![1u8]))
        .unwrap();

    assert_eq!(controller.submit().await, SubmitOutcome::Rejected);
    assert_eq!(controller.phase(), SessionPhase::Failed);
    assert_eq!(controller.state().error.as_deref(), Some("both images required"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_rapid_double_submit_sends_one_request() {
    let backend = Arc::new(
        ScriptedBackend::answering(Ok(success())).delayed(Duration::from_millis(20)),
    );
    let controller = TryOnController::new(backend.clone());
    load_both(&controller);

    let (first, second) = tokio::join!(controller.submit(), controller.submit());
    assert_eq!(first, SubmitOutcome::Completed(SessionPhase::Succeeded));
    assert_eq!(second, SubmitOutcome::AlreadyInFlight);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_reset_during_submit_discards_response() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(ScriptedBackend::answering(Ok(success())).gated(gate.clone()));
    let controller = TryOnController::new(backend.clone());
    load_both(&controller);

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit().await }
    });
    wait_for_phase(&controller, SessionPhase::Submitting).await;

    controller.reset();
    gate.notify_one();

    assert_eq!(pending.await.unwrap(), SubmitOutcome::Superseded);
    let state = controller.state();
    assert_eq!(state.phase, SessionPhase::Idle);
    assert!(state.result.is_none());
    assert!(!state.person.is_loaded());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_stale_failure_does_not_clobber_new_request() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(
        ScriptedBackend::answering(Err(TryOnFailure::Backend {
            status: 503,
            detail: Some("warming up".to_string()),
        }))
        .gated(gate.clone()),
    );
    let controller = TryOnController::new(backend.clone());
    load_both(&controller);

    let stale = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit().await }
    });
    wait_for_phase(&controller, SessionPhase::Submitting).await;
    controller.reset();
    controller.set_parameter(ParameterValue::Seed(7)).unwrap();

    gate.notify_one();
    assert_eq!(stale.await.unwrap(), SubmitOutcome::Superseded);

    let state = controller.state();
    assert_eq!(state.phase, SessionPhase::Idle);
    assert!(state.error.is_none());
    assert_eq!(state.parameters.seed, 7);
}

#[tokio::test]
async fn test_slot_edit_while_submitting_keeps_captured_payload() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(ScriptedBackend::answering(Ok(success())).gated(gate.clone()));
    let controller = TryOnController::new(backend.clone());
    load_both(&controller);

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit().await }
    });
    wait_for_phase(&controller, SessionPhase::Submitting).await;

    controller
        .set_image(SlotKind::Person, ImagePayload::new("other.png", vec![9u8; 8]))
        .unwrap();
    gate.notify_one();

    assert_eq!(
        pending.await.unwrap(),
        SubmitOutcome::Completed(SessionPhase::Succeeded)
    );
    assert_eq!(backend.seen.lock()[0].person.file_name(), "human.jpg");
    assert_eq!(
        controller.state().person.payload().map(|p| p.file_name().to_string()),
        Some("other.png".to_string())
    );
}

#[tokio::test]
async fn test_resubmit_after_success_and_failure() {
    let backend = Arc::new(ScriptedBackend::answering(Ok(success())));
    let controller = TryOnController::new(backend.clone());

    assert_eq!(controller.submit().await, SubmitOutcome::Rejected);
    load_both(&controller);
    assert_eq!(controller.phase(), SessionPhase::Idle);

    assert_eq!(
        controller.submit().await,
        SubmitOutcome::Completed(SessionPhase::Succeeded)
    );
    assert_eq!(
        controller.submit().await,
        SubmitOutcome::Completed(SessionPhase::Succeeded)
    );
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_reset_is_idempotent_and_restores_defaults() {
    let backend = Arc::new(ScriptedBackend::answering(Ok(success())));
    let controller = TryOnController::new(backend);
    load_both(&controller);
    controller.set_parameter(ParameterValue::GuidanceScale(4.2)).unwrap();
    controller.set_parameter(ParameterValue::InferenceSteps(12)).unwrap();
    controller.set_parameter(ParameterValue::RefAcceleration(true)).unwrap();
    controller.submit().await;

    controller.reset();
    controller.reset();

    let state = controller.state();
    assert_eq!(state.phase, SessionPhase::Idle);
    assert!(!state.person.is_loaded() && !state.garment.is_loaded());
    assert!(state.person.preview().is_none());
    assert_eq!(state.parameters, GenerationParameters::default());
    assert!(state.result.is_none() && state.error.is_none());
}

#[tokio::test]
async fn test_previews_are_released_exactly_once() {
    let backend = Arc::new(ScriptedBackend::answering(Ok(success())));
    let controller = TryOnController::new(backend);

    load_both(&controller);
    let first = controller.state().person.preview().cloned().unwrap();
    controller
        .set_image(SlotKind::Person, ImagePayload::new("again.jpg", vec![3u8]))
        .unwrap();

    assert!(!controller.previews().is_live(&first));
    assert_eq!(controller.previews().live_count(), 2);

    controller.reset();
    assert_eq!(controller.previews().live_count(), 0);
    controller.reset();
    assert_eq!(controller.previews().live_count(), 0);
}

#[test]
fn test_empty_image_is_rejected() {
    let backend = Arc::new(ScriptedBackend::answering(Ok(success())));
    let controller = TryOnController::new(backend);

    let err = controller
        .set_image(SlotKind::Person, ImagePayload::new("empty.jpg", Vec::<u8>::new()))
        .unwrap_err();
    assert!(matches!(err, tryon_common::Error::InvalidImage(_)));
    assert!(!controller.state().person.is_loaded());
    assert_eq!(controller.previews().live_count(), 0);
}

#[test]
fn test_parameter_clamping_and_random_seed() {
    let backend = Arc::new(ScriptedBackend::answering(Ok(success())));
    let controller = TryOnController::new(backend);

    controller.set_parameter(ParameterValue::GuidanceScale(10.0)).unwrap();
    controller.set_parameter(ParameterValue::InferenceSteps(1)).unwrap();
    let params = controller.state().parameters;
    assert_eq!(params.guidance_scale, 5.0);
    assert_eq!(params.inference_steps, 10);

    assert!(controller
        .set_parameter(ParameterValue::GuidanceScale(f64::NAN))
        .is_err());
    assert_eq!(controller.state().parameters.guidance_scale, 5.0);

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    for _ in 0..100 {
        let seed = controller.generate_random_seed_with(&mut rng);
        assert!(seed < 1_000_000);
        assert_eq!(controller.state().parameters.seed, seed);
    }
}
