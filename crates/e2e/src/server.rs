//! Stub server management - binding, serving and health checking

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::stub::{self, ReceivedRequest, StubBehavior, StubState};

/// Handle to a running stub inference server
pub struct StubServer {
    state: Arc<StubState>,
    addr: SocketAddr,
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StubServer {
    /// Bind an ephemeral port on loopback and start serving
    pub async fn start(behavior: StubBehavior) -> E2eResult<Self> {
        Self::start_with(StubServerConfig {
            behavior,
            ..Default::default()
        })
        .await
    }

    pub async fn start_with(config: StubServerConfig) -> E2eResult<Self> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.port.unwrap_or(0)))
            .await
            .map_err(|e| E2eError::StubStartup(format!("bind failed: {}", e)))?;
        let addr = listener.local_addr()?;
        let base_url = format!("http://{}", addr);

        info!("Starting stub inference server on {}", addr);

        let state = Arc::new(StubState::new(config.behavior));
        let app = stub::router(state.clone());
        let (tx, rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!("Stub server exited with error: {}", e);
            }
        });

        let server = StubServer {
            state,
            addr,
            base_url,
            shutdown: Some(tx),
            task: Some(task),
        };

        server.wait_for_healthy(config.startup_timeout).await?;

        info!("Stub server is healthy at {}", server.base_url);
        Ok(server)
    }

    /// Wait for the stub to answer its health route
    async fn wait_for_healthy(&self, timeout_duration: Duration) -> E2eResult<()> {
        let health_url = format!("{}/health", self.base_url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => warn!("Health check returned {}", resp.status()),
                Err(e) if !e.is_connect() => warn!("Health check error: {}", e),
                Err(_) => {}
            }

            sleep(Duration::from_millis(50)).await;
        }

        Err(E2eError::HealthCheck(attempts))
    }

    /// Base URL, without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload endpoint under the `/api` prefix
    pub fn upload_url(&self) -> String {
        format!("{}/api/try-on/upload", self.base_url)
    }

    pub fn set_behavior(&self, behavior: StubBehavior) {
        self.state.set_behavior(behavior);
    }

    pub fn calls(&self) -> usize {
        self.state.calls()
    }

    pub fn last_request(&self) -> Option<ReceivedRequest> {
        self.state.last_request()
    }

    /// Clear recorded calls between scenarios
    pub fn reset(&self, behavior: StubBehavior) {
        self.state.clear();
        self.state.set_behavior(behavior);
    }

    /// Stop serving and wait for the task to finish
    pub async fn stop(mut self) {
        self.signal_shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            info!("Stopping stub server on {}", self.addr);
            let _ = tx.send(());
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.signal_shutdown();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Configuration for starting a stub server
#[derive(Debug, Clone)]
pub struct StubServerConfig {
    /// Initial behavior
    pub behavior: StubBehavior,

    /// Port to listen on (None = ephemeral)
    pub port: Option<u16>,

    /// Timeout for startup health checks
    pub startup_timeout: Duration,
}

impl Default for StubServerConfig {
    fn default() -> Self {
        Self {
            behavior: StubBehavior::default(),
            port: None,
            startup_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_stop() {
        let server = StubServer::start(StubBehavior::default()).await.unwrap();
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
        assert_eq!(server.calls(), 0);

        let resp = reqwest::get(format!("{}/api/health", server.base_url()))
            .await
            .unwrap();
        assert!(resp.status().is_success());

        let url = server.base_url().to_string();
        server.stop().await;
        assert!(reqwest::get(format!("{}/health", url)).await.is_err());
    }
}
