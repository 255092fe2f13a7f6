//! Scenario runner entry point
//!
//! Runs the YAML scenarios against the in-process stub, or against a live
//! backend with `--backend-url`.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tryon_e2e::runner::{RunnerConfig, TestSuiteResult};
use tryon_e2e::{E2eResult, ScenarioRunner};

#[derive(Parser, Debug)]
#[command(name = "tryon-e2e")]
#[command(about = "Scenario runner for the try-on client")]
struct Args {
    /// Path to scenario directory
    #[arg(short, long, default_value = "crates/e2e/specs")]
    specs: PathBuf,

    /// Run only scenarios matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    name: Option<String>,

    /// Run against a live backend instead of the stub
    #[arg(long, env = "TRYON_BASE_URL")]
    backend_url: Option<String>,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn run(args: Args) -> E2eResult<bool> {
    let config = RunnerConfig {
        specs_dir: args.specs,
        output_dir: args.output,
        backend_url: args.backend_url,
    };

    let mut runner = ScenarioRunner::with_config(config);
    runner.start_stub().await?;

    let results = if let Some(name) = args.name {
        let result = runner.run_test(&name).await?;
        let failed = usize::from(!result.success);
        TestSuiteResult {
            total: 1,
            passed: usize::from(result.success && !result.skipped),
            failed,
            skipped: usize::from(result.skipped),
            duration_ms: result.duration_ms,
            results: vec![result],
        }
    } else if let Some(tag) = args.tag {
        runner.run_tagged(&tag).await?
    } else {
        runner.run_all().await?
    };

    runner.write_results(&results)?;
    runner.stop_stub().await;

    Ok(results.failed == 0)
}
