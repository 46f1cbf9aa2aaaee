//! chromedriver process management

use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};

use super::webdriver::WebDriverClient;
use crate::utils::{binary_resolver, RunConfig};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A chromedriver child process listening on localhost
pub struct ChromedriverService {
    child: Child,
    port: u16,
}

impl ChromedriverService {
    /// Spawn chromedriver and wait until it reports ready
    pub async fn start(config: &RunConfig) -> Result<Self> {
        let binary = binary_resolver::find_chromedriver()?;
        let port = config.chromedriver_port;

        println!(
            "  {} Starting chromedriver on port {}",
            "⏳".yellow(),
            port.to_string().cyan()
        );

        let child = Command::new(&binary)
            .arg(format!("--port={}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", binary.display()))?;

        let mut service = Self { child, port };
        service
            .wait_ready(config)
            .await
            .context("chromedriver did not become ready")?;
        Ok(service)
    }

    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    async fn wait_ready(&mut self, config: &RunConfig) -> Result<()> {
        let probe = WebDriverClient::new(&self.url(), config)?;
        let timeout = Duration::from_millis(config.connection_retry_timeout_ms);
        let started = Instant::now();

        while started.elapsed() < timeout {
            if let Some(status) = self.child.try_wait()? {
                anyhow::bail!("chromedriver exited early with {}", status);
            }
            if probe.is_ready().await {
                log::debug!("chromedriver ready after {:?}", started.elapsed());
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        anyhow::bail!("timed out after {:?}", timeout)
    }

    /// Kill the process and reap it
    pub async fn stop(mut self) -> Result<()> {
        if self.child.try_wait()?.is_none() {
            self.child.kill().await.context("Failed to stop chromedriver")?;
        }
        Ok(())
    }
}

/// WebDriver endpoint for this run: an external server, or a spawned chromedriver
pub async fn resolve_endpoint(config: &RunConfig) -> Result<(String, Option<ChromedriverService>)> {
    match config.webdriver_url {
        Some(ref url) => Ok((url.clone(), None)),
        None => {
            let service = ChromedriverService::start(config).await?;
            Ok((service.url(), Some(service)))
        }
    }
}
