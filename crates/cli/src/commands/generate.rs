//! Generate Command

use anyhow::{bail, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tryon_common::samples::download_file;
use tryon_common::{
    ClientConfig, GenerationResult, HttpBackend, ImagePayload, ParameterValue, SessionPhase,
    SessionState, SlotKind, SubmitOutcome, TryOnController,
};

use crate::output::{abbreviate, print_error, print_info, print_item, print_success, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct GenerateArgs {
    /// Person image
    #[arg(long)]
    pub person: PathBuf,

    /// Garment image
    #[arg(long)]
    pub garment: PathBuf,

    /// Guidance scale (0.1 - 5.0, clamped)
    #[arg(long)]
    pub guidance_scale: Option<f64>,

    /// Inference steps (10 - 50, clamped)
    #[arg(long, allow_hyphen_values = true)]
    pub steps: Option<i64>,

    /// Seed
    #[arg(long, conflicts_with = "random_seed")]
    pub seed: Option<u64>,

    /// Draw a random seed instead
    #[arg(long)]
    pub random_seed: bool,

    /// Enable reference acceleration
    #[arg(long)]
    pub ref_acceleration: bool,

    /// Save the generated image here (bare flag: tryon-result.jpg)
    #[arg(short, long, num_args = 0..=1, default_missing_value = tryon_common::DEFAULT_RESULT_FILE)]
    pub output: Option<PathBuf>,
}

impl GenerateArgs {
    /// Parameter edits requested on the command line, in form order
    pub fn parameter_edits(&self) -> Vec<ParameterValue> {
        let mut edits = Vec::new();
        if let Some(v) = self.guidance_scale {
            edits.push(ParameterValue::GuidanceScale(v));
        }
        if let Some(v) = self.steps {
            edits.push(ParameterValue::InferenceSteps(v));
        }
        if let Some(v) = self.seed {
            edits.push(ParameterValue::Seed(v));
        }
        if self.ref_acceleration {
            edits.push(ParameterValue::RefAcceleration(true));
        }
        edits
    }
}

/// Generation display wrapper for serialization
#[derive(Serialize)]
pub struct GenerationDisplay {
    pub phase: String,
    pub guidance_scale: f64,
    pub inference_steps: u32,
    pub seed: u64,
    pub ref_acceleration: bool,
    pub processing_time: Option<f64>,
    pub result_image: Option<String>,
    pub error: Option<String>,
}

impl From<&SessionState> for GenerationDisplay {
    fn from(state: &SessionState) -> Self {
        Self {
            phase: state.phase.to_string(),
            guidance_scale: state.parameters.guidance_scale,
            inference_steps: state.parameters.inference_steps,
            seed: state.parameters.seed,
            ref_acceleration: state.parameters.ref_acceleration,
            processing_time: state.processing_time(),
            result_image: state.result_image().map(str::to_string),
            error: state.error.clone(),
        }
    }
}

impl TableDisplay for GenerationDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Phase", "Guidance", "Steps", "Seed", "Ref Accel", "Time", "Result"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.phase.clone(),
            format!("{:.1}", self.guidance_scale),
            self.inference_steps.to_string(),
            self.seed.to_string(),
            self.ref_acceleration.to_string(),
            self.processing_time
                .map(|t| format!("{:.2}s", t))
                .unwrap_or_else(|| "-".to_string()),
            self.result_image
                .as_deref()
                .map(|r| abbreviate(r, 40))
                .or_else(|| self.error.clone())
                .unwrap_or_default(),
        ]
    }
}

pub async fn execute(args: GenerateArgs, config: &ClientConfig, format: OutputFormat) -> Result<()> {
    let backend = HttpBackend::from_config(config)?;
    print_info(&format!("Backend: {}", backend.endpoint()));
    let controller = TryOnController::new(Arc::new(backend));

    for (slot, path) in [(SlotKind::Person, &args.person), (SlotKind::Garment, &args.garment)] {
        let payload = ImagePayload::from_path(path)
            .await
            .with_context(|| format!("reading {} image {}", slot, path.display()))?;
        controller.set_image(slot, payload)?;
    }

    for edit in args.parameter_edits() {
        controller.set_parameter(edit)?;
    }
    if args.random_seed {
        let seed = controller.generate_random_seed();
        print_info(&format!("Using random seed {}", seed));
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Generating try-on image...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let outcome = controller.submit().await;
    spinner.finish_and_clear();

    let state = controller.state();
    print_item(&GenerationDisplay::from(&state), format);

    match (outcome, &state.result) {
        (SubmitOutcome::Completed(SessionPhase::Succeeded), Some(result)) => {
            print_success(&result.summary());
            if let Some(path) = &args.output {
                save_result(result, path).await?;
                print_success(&format!("Saved result to {}", path.display()));
            }
            Ok(())
        }
        _ => {
            print_error(state.error.as_deref().unwrap_or("generation did not complete"));
            std::process::exit(1);
        }
    }
}

/// Write the result image to disk, decoding data URIs and fetching URLs
pub async fn save_result(result: &GenerationResult, path: &Path) -> Result<()> {
    if result.is_data_uri() {
        let bytes = result.decode_data_uri()?;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
    } else if result.result_image.starts_with("http://") || result.result_image.starts_with("https://") {
        let client = reqwest::Client::new();
        download_file(&client, &result.result_image, path).await?;
    } else {
        bail!("unsupported result reference: {}", abbreviate(&result.result_image, 40));
    }
    Ok(())
}
