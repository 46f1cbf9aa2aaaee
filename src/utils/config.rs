use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "e2e.yaml";

/// Run configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunConfig {
    /// Glob pattern for spec files
    pub specs: String,

    /// Concurrent sessions. Only one test runs at a time.
    pub max_instances: u32,

    /// How long expectations keep polling before failing (ms)
    pub wait_timeout_ms: u64,

    /// Poll interval for expectations (ms)
    pub wait_interval_ms: u64,

    /// Per-request timeout towards the WebDriver server (ms)
    pub connection_retry_timeout_ms: u64,

    /// Attempts when opening a new session
    pub connection_retry_count: u32,

    /// Upper bound for a single test (ms)
    pub default_timeout_interval_ms: u64,

    pub browser_name: String,
    pub window_size: String,
    pub lang: String,

    /// Extra arguments appended to goog:chromeOptions.args
    pub chrome_args: Vec<String>,

    /// Keep the browser visible (drops --no-sandbox/--disable-gpu)
    pub show_browser: bool,

    /// Use an already running WebDriver server instead of spawning chromedriver
    pub webdriver_url: Option<String>,
    pub chromedriver_port: u16,

    /// Raw Allure results
    pub results_dir: PathBuf,

    /// Rendered Allure report
    pub report_dir: PathBuf,

    /// Launch the report viewer after generation
    pub serve_report: bool,
    pub serve_host: String,
    pub serve_port: u16,

    pub log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            specs: "./specs/*.yaml".to_string(),
            max_instances: 1,
            wait_timeout_ms: 1000,
            wait_interval_ms: 100,
            connection_retry_timeout_ms: 90_000,
            connection_retry_count: 3,
            default_timeout_interval_ms: 100_000,
            browser_name: "chrome".to_string(),
            window_size: "1920,1080".to_string(),
            lang: "en".to_string(),
            chrome_args: Vec::new(),
            show_browser: false,
            webdriver_url: None,
            chromedriver_port: 9515,
            results_dir: PathBuf::from("./reports/allure-results"),
            report_dir: PathBuf::from("./reports/allure-report"),
            serve_report: false,
            serve_host: "localhost".to_string(),
            serve_port: 9000,
            log_level: "info".to_string(),
        }
    }
}

impl RunConfig {
    /// Load config from a YAML file. Missing fields fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: RunConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    /// Load the explicit config path, or `e2e.yaml` if present, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply run limits. Call once logging is up, since adjustments are logged.
    pub fn normalized(mut self) -> Self {
        if self.max_instances != 1 {
            log::warn!(
                "maxInstances={} ignored, tests share a single session",
                self.max_instances
            );
            self.max_instances = 1;
        }
        self
    }

    /// Whether the browser runs without a visible window
    pub fn headless(&self) -> bool {
        !self.show_browser
    }
}
