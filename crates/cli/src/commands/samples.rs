//! Sample Image Commands

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use tryon_common::samples::{default_samples, fetch_samples, FetchReport, FetchStatus};

use crate::output::{print_list, print_success, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct FetchSamplesArgs {
    /// Directory to place the images in
    #[arg(short, long, default_value = "test-assets")]
    pub dir: PathBuf,
}

/// Sample display wrapper for serialization
#[derive(Serialize)]
pub struct SampleDisplay {
    pub slot: String,
    pub path: String,
    pub status: String,
    pub bytes: Option<u64>,
    pub sha256: Option<String>,
}

impl From<FetchReport> for SampleDisplay {
    fn from(report: FetchReport) -> Self {
        let (status, bytes, sha256) = match report.status {
            FetchStatus::Downloaded(file) => ("downloaded", Some(file.bytes), Some(file.sha256)),
            FetchStatus::AlreadyPresent => ("present", None, None),
        };
        Self {
            slot: report.slot.to_string(),
            path: report.path.display().to_string(),
            status: status.to_string(),
            bytes,
            sha256,
        }
    }
}

impl TableDisplay for SampleDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Slot", "Path", "Status", "Size", "SHA-256"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.slot.clone(),
            self.path.clone(),
            self.status.clone(),
            self.bytes.map(|b| format!("{}B", b)).unwrap_or_else(|| "-".to_string()),
            self.sha256
                .as_deref()
                .map(|h| h.chars().take(12).collect())
                .unwrap_or_else(|| "-".to_string()),
        ]
    }
}

pub async fn execute(args: FetchSamplesArgs, format: OutputFormat) -> Result<()> {
    let client = reqwest::Client::new();
    let reports = fetch_samples(&client, &default_samples(), &args.dir).await?;

    let displays: Vec<SampleDisplay> = reports.into_iter().map(SampleDisplay::from).collect();
    print_list(&displays, format);
    print_success(&format!("Sample images ready in {}", args.dir.display()));
    Ok(())
}
