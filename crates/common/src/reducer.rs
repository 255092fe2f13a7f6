//! Session state transitions
//!
//! Every change to a [`SessionState`] goes through [`reduce`], a pure
//! function from `(state, event)` to a [`Transition`]. Side effects the
//! caller must carry out (issuing a request, releasing a preview) are
//! returned as [`Effect`]s rather than performed here.
//!
//! ```text
//! Idle --submit(valid)--> Submitting --success--> Succeeded
//! Idle --submit(invalid)--> Failed
//! Submitting --failure--> Failed
//! any --reset--> Idle
//! ```
//!
//! Each dispatch is stamped with a fresh [`RequestToken`]; a response is
//! applied only while its token is the session's latest. Reset advances the
//! token, so anything still in flight resolves into the void.

use tracing::debug;

use crate::error::TryOnFailure;
use crate::preview::PreviewHandle;
use crate::types::{
    GenerationResult, ImagePayload, ParameterValue, RequestToken, SessionPhase, SessionState,
    SlotKind, TryOnRequest,
};

/// Input to the session state machine
#[derive(Debug, Clone)]
pub enum Event {
    ImageSelected {
        slot: SlotKind,
        payload: ImagePayload,
        preview: PreviewHandle,
    },
    ParameterChanged(ParameterValue),
    SubmitRequested,
    ResponseReceived {
        token: RequestToken,
        outcome: Result<GenerationResult, TryOnFailure>,
    },
    ResetRequested,
}

/// Work the caller owes after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send exactly this request to the backend
    Dispatch {
        token: RequestToken,
        request: TryOnRequest,
    },
    /// Release a preview that no slot owns any more
    ReleasePreview(PreviewHandle),
}

/// Result of applying one event
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: SessionState,
    pub effects: Vec<Effect>,
    /// The event had no effect (re-entrant submit, stale response)
    pub ignored: bool,
}

impl Transition {
    fn applied(state: SessionState, effects: Vec<Effect>) -> Self {
        Self {
            state,
            effects,
            ignored: false,
        }
    }

    fn ignored(state: SessionState) -> Self {
        Self {
            state,
            effects: Vec::new(),
            ignored: true,
        }
    }

    /// The request to dispatch, if the transition produced one
    pub fn dispatch(&self) -> Option<(RequestToken, &TryOnRequest)> {
        self.effects.iter().find_map(|effect| match effect {
            Effect::Dispatch { token, request } => Some((*token, request)),
            _ => None,
        })
    }
}

/// Apply an event to the session
pub fn reduce(mut state: SessionState, event: Event) -> Transition {
    let from = state.phase;

    let transition = match event {
        Event::ImageSelected {
            slot,
            payload,
            preview,
        } => {
            let effects = state
                .slot_mut(slot)
                .fill(payload, preview)
                .map(Effect::ReleasePreview)
                .into_iter()
                .collect();
            state.error = None;
            if state.phase == SessionPhase::Failed {
                state.phase = SessionPhase::Idle;
            }
            Transition::applied(state, effects)
        }

        Event::ParameterChanged(value) => {
            if value.is_nan() {
                return Transition::ignored(state);
            }
            state.parameters.apply(value);
            Transition::applied(state, Vec::new())
        }

        Event::SubmitRequested => {
            if state.phase == SessionPhase::Submitting {
                return Transition::ignored(state);
            }

            let captured = match (state.person.payload(), state.garment.payload()) {
                (Some(person), Some(garment)) => Some(TryOnRequest {
                    person: person.clone(),
                    garment: garment.clone(),
                    parameters: state.parameters,
                }),
                _ => None,
            };

            state.result = None;
            match captured {
                Some(request) => {
                    let token = state.latest_request.next();
                    state.latest_request = token;
                    state.phase = SessionPhase::Submitting;
                    state.error = None;
                    Transition::applied(state, vec![Effect::Dispatch { token, request }])
                }
                None => {
                    state.phase = SessionPhase::Failed;
                    state.error = Some(TryOnFailure::MissingImages.user_message());
                    Transition::applied(state, Vec::new())
                }
            }
        }

        Event::ResponseReceived { token, outcome } => {
            if state.phase != SessionPhase::Submitting || token != state.latest_request {
                return Transition::ignored(state);
            }

            match outcome {
                Ok(result) => {
                    state.phase = SessionPhase::Succeeded;
                    state.result = Some(result);
                    state.error = None;
                }
                Err(failure) => {
                    state.phase = SessionPhase::Failed;
                    state.result = None;
                    state.error = Some(failure.user_message());
                }
            }
            Transition::applied(state, Vec::new())
        }

        Event::ResetRequested => {
            let effects = [state.person.clear(), state.garment.clear()]
                .into_iter()
                .flatten()
                .map(Effect::ReleasePreview)
                .collect();
            let next = SessionState {
                latest_request: state.latest_request.next(),
                ..SessionState::default()
            };
            Transition::applied(next, effects)
        }
    };

    if from != transition.state.phase {
        debug!("Session transition: {} -> {}", from, transition.state.phase);
    }
    transition
}
