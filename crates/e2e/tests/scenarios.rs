//! Runs every scenario under `specs/` against the in-process stub

use std::path::PathBuf;

use tryon_e2e::runner::RunnerConfig;
use tryon_e2e::{ScenarioRunner, ScenarioSpec};

fn specs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("specs")
}

#[test]
fn test_all_scenarios_parse() {
    let specs = ScenarioSpec::load_all(&specs_dir()).unwrap();
    assert!(specs.len() >= 9);

    let mut names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), specs.len(), "scenario names must be unique");

    assert!(!ScenarioSpec::filter_by_tag(&specs, "smoke").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scenarios_pass_against_stub() {
    let output = tempfile::TempDir::new().unwrap();
    let mut runner = ScenarioRunner::with_config(RunnerConfig {
        specs_dir: specs_dir(),
        output_dir: output.path().to_path_buf(),
        backend_url: None,
    });

    let suite = runner.run_all().await.unwrap();
    for result in suite.results.iter().filter(|r| !r.success) {
        eprintln!("{} failed: {:?}", result.name, result.error);
        for step in &result.steps {
            eprintln!("  {} ok={} {:?}", step.step, step.success, step.error);
        }
    }
    assert_eq!(suite.failed, 0);
    assert_eq!(suite.skipped, 0);
    assert_eq!(suite.passed, suite.total);

    let path = runner.write_results(&suite).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["total"], suite.total);

    runner.stop_stub().await;
}

#[tokio::test]
async fn test_stub_only_scenarios_skipped_for_live_backend() {
    let output = tempfile::TempDir::new().unwrap();
    let mut runner = ScenarioRunner::with_config(RunnerConfig {
        specs_dir: specs_dir(),
        output_dir: output.path().to_path_buf(),
        // Never contacted: the scenarios that would reach it are stub-only
        backend_url: Some("http://127.0.0.1:9".to_string()),
    });

    let suite = runner.run_tagged("validation").await.unwrap();
    let missing = suite
        .results
        .iter()
        .find(|r| r.name == "missing-image")
        .unwrap();
    assert!(missing.skipped);

    let empty = suite
        .results
        .iter()
        .find(|r| r.name == "empty-upload")
        .unwrap();
    assert!(empty.success && !empty.skipped);
}

#[tokio::test]
async fn test_failing_step_stops_scenario() {
    let yaml = r#"
name: wrong-expectation
steps:
  - action: expect
    phase: succeeded
  - action: log
    message: never reached
"#;
    let spec = ScenarioSpec::from_yaml(yaml).unwrap();
    let mut runner = ScenarioRunner::with_config(RunnerConfig {
        specs_dir: specs_dir(),
        output_dir: std::env::temp_dir(),
        backend_url: None,
    });

    let suite = runner.run_specs(&[spec]).await.unwrap();
    assert_eq!(suite.failed, 1);
    let result = &suite.results[0];
    assert_eq!(result.steps.len(), 1);
    assert!(result.error.as_deref().unwrap().contains("phase"));

    runner.stop_stub().await;
}
