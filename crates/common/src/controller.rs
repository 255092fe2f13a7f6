//! Try-on client controller
//!
//! Mediates between user input, the two upload slots, the generation
//! parameters and a single outstanding backend request. All mutations
//! funnel through [`reduce`] under one lock, so every transition is atomic
//! and observers always see a consistent [`SessionState`].

use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::InferenceBackend;
use crate::error::{Error, Result};
use crate::preview::PreviewRegistry;
use crate::reducer::{reduce, Effect, Event, Transition};
use crate::types::{
    ImagePayload, ParameterValue, SessionPhase, SessionState, SlotKind, SEED_RANDOM_BOUND,
};

/// How a call to [`TryOnController::submit`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Precondition failed; the session is `Failed` and nothing was sent
    Rejected,
    /// A request was already outstanding; nothing happened
    AlreadyInFlight,
    /// The response was applied and left the session in this phase
    Completed(SessionPhase),
    /// The response arrived after a reset and was discarded
    Superseded,
}

struct Inner {
    state: Mutex<SessionState>,
    backend: Arc<dyn InferenceBackend>,
    previews: PreviewRegistry,
}

/// Shared handle to one client session
#[derive(Clone)]
pub struct TryOnController {
    inner: Arc<Inner>,
}

impl TryOnController {
    /// Create a controller in `Idle` with default parameters and empty slots
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::default()),
                backend,
                previews: PreviewRegistry::new(),
            }),
        }
    }

    /// Snapshot of the current session
    pub fn state(&self) -> SessionState {
        self.inner.state.lock().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.lock().phase
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.inner.previews
    }

    /// Load an image into a slot, replacing whatever was there
    pub fn set_image(&self, slot: SlotKind, payload: ImagePayload) -> Result<()> {
        if payload.is_empty() {
            return Err(Error::InvalidImage(format!(
                "{} image {} is empty",
                slot,
                payload.file_name()
            )));
        }

        info!(
            "Loaded {} image {} ({}, {} bytes)",
            slot,
            payload.file_name(),
            payload.mime_type(),
            payload.len()
        );
        let preview = self.inner.previews.create(&payload);
        self.apply(Event::ImageSelected {
            slot,
            payload,
            preview,
        });
        Ok(())
    }

    /// Edit one generation parameter. Ranged values are clamped.
    pub fn set_parameter(&self, value: ParameterValue) -> Result<()> {
        if value.is_nan() {
            return Err(Error::InvalidParameter {
                name: value.name().to_string(),
                reason: "not a number".to_string(),
            });
        }
        self.apply(Event::ParameterChanged(value));
        Ok(())
    }

    /// Draw and store a seed in `[0, 1_000_000)`
    pub fn generate_random_seed(&self) -> u64 {
        self.generate_random_seed_with(&mut rand::thread_rng())
    }

    pub fn generate_random_seed_with<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let seed = rng.gen_range(0..SEED_RANDOM_BOUND);
        self.apply(Event::ParameterChanged(ParameterValue::Seed(seed)));
        debug!("Generated random seed {}", seed);
        seed
    }

    /// Send the loaded images to the backend and wait for the outcome.
    ///
    /// Only one request is ever outstanding; calling this again while
    /// `Submitting` returns immediately.
    pub async fn submit(&self) -> SubmitOutcome {
        let transition = self.apply(Event::SubmitRequested);
        if transition.ignored {
            debug!("Submit ignored, request already in flight");
            return SubmitOutcome::AlreadyInFlight;
        }

        let (token, request) = match transition.dispatch() {
            Some((token, request)) => (token, request.clone()),
            None => {
                info!("Submit rejected: both images required");
                return SubmitOutcome::Rejected;
            }
        };

        info!("Dispatching try-on request {}", token);
        let outcome = self.inner.backend.generate(request).await;
        match &outcome {
            Ok(result) => info!("Request {} succeeded: {}", token, result.summary()),
            Err(failure) => warn!("Request {} failed: {}", token, failure),
        }

        let resolved = self.apply(Event::ResponseReceived { token, outcome });
        if resolved.ignored {
            warn!("Discarding stale response for request {}", token);
            SubmitOutcome::Superseded
        } else {
            SubmitOutcome::Completed(resolved.state.phase)
        }
    }

    /// Clear both slots, the result and any error; restore defaults
    pub fn reset(&self) {
        self.apply(Event::ResetRequested);
        info!("Session reset");
    }

    fn apply(&self, event: Event) -> Transition {
        let transition = {
            let mut state = self.inner.state.lock();
            let transition = reduce(std::mem::take(&mut *state), event);
            *state = transition.state.clone();
            transition
        };

        for effect in &transition.effects {
            if let Effect::ReleasePreview(handle) = effect {
                if let Err(e) = self.inner.previews.release(handle) {
                    debug!("{}", e);
                }
            }
        }
        transition
    }
}
