//! Try-On E2E Scenario Framework
//!
//! This crate drives the try-on controller end to end:
//! - Serves a stub inference backend in-process (axum, multipart)
//! - Parses declarative YAML scenarios
//! - Runs each scenario against a fresh controller over real HTTP
//! - Writes a JSON report of every step
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Scenario Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── start_stub() -> StubServer                           │
//! │    ├── run_spec(spec: ScenarioSpec) -> TestResult           │
//! │    └── write_results(suite) -> test-results.json            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioSpec (YAML)                                        │
//! │    ├── name, description, tags                              │
//! │    ├── backend: succeed | fail { status, detail }           │
//! │    └── steps: [ScenarioStep]                                │
//! │          ├── upload { slot, path | fixture | empty }        │
//! │          ├── set_parameter { name, value }                  │
//! │          ├── submit / submit_detached / await_pending       │
//! │          ├── reset                                          │
//! │          └── expect { phase?, error?, seed?, ... }          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod fixtures;
pub mod runner;
pub mod server;
pub mod spec;
pub mod stub;

pub use error::{E2eError, E2eResult};
pub use runner::ScenarioRunner;
pub use server::StubServer;
pub use spec::{ScenarioSpec, ScenarioStep};
pub use stub::StubBehavior;
