//! Try-On Client Common Library
//!
//! Session state, the client controller, and the backend contract shared by
//! the `tryon` CLI and the scenario harness.

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod preview;
pub mod reducer;
pub mod samples;
pub mod types;

// Re-export commonly used types
pub use backend::{HttpBackend, InferenceBackend};
pub use config::ClientConfig;
pub use controller::{SubmitOutcome, TryOnController};
pub use error::{Error, FailureKind, Result, TryOnFailure};
pub use preview::{PreviewHandle, PreviewRegistry};
pub use types::*;

/// Client version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name offered when saving a generated image
pub const DEFAULT_RESULT_FILE: &str = "tryon-result.jpg";
