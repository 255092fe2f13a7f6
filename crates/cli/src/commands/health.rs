//! Health Command

use anyhow::Result;
use serde::Serialize;

use tryon_common::{ClientConfig, HealthStatus, HttpBackend};

use crate::output::{print_error, print_item, OutputFormat, TableDisplay};

/// Health display wrapper for serialization
#[derive(Serialize)]
pub struct HealthDisplay {
    pub endpoint: String,
    pub status: String,
    pub model_loaded: bool,
}

impl HealthDisplay {
    fn new(endpoint: String, health: HealthStatus) -> Self {
        Self {
            endpoint,
            status: health.status,
            model_loaded: health.model_loaded,
        }
    }
}

impl TableDisplay for HealthDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Endpoint", "Status", "Model Loaded"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.endpoint.clone(),
            self.status.clone(),
            if self.model_loaded { "yes" } else { "no" }.to_string(),
        ]
    }
}

pub async fn execute(config: &ClientConfig, format: OutputFormat) -> Result<()> {
    let backend = HttpBackend::from_config(config)?;
    let health_url = config.health_url()?;

    match backend.health().await {
        Ok(health) => {
            print_item(&HealthDisplay::new(health_url.to_string(), health), format);
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Backend is not responding at {}: {}", health_url, e));
            std::process::exit(1);
        }
    }
}
