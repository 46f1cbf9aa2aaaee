//! Allure results writer
//!
//! Records one result file per test into the raw results directory, in the
//! layout the Allure command-line tool reads (`<uuid>-result.json` plus
//! `<uuid>-attachment.<ext>` files).

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::types::{
    AllureStatus, Attachment, Label, Stage, StatusDetails, StepResult, TestResultRecord,
};

#[derive(Default)]
struct ReporterState {
    current: Option<TestResultRecord>,
    /// Open steps, innermost last
    steps: Vec<StepResult>,
}

/// Incremental writer for Allure raw results
pub struct AllureReporter {
    results_dir: PathBuf,
    state: Mutex<ReporterState>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Stable id linking runs of the same test across history
pub fn history_id(full_name: &str) -> String {
    Sha256::digest(full_name.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn attachment_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "text/plain" => "txt",
        "application/json" => "json",
        "text/html" => "html",
        _ => "bin",
    }
}

fn close_steps(state: &mut ReporterState, message: &str) {
    while let Some(mut step) = state.steps.pop() {
        if step.stage == Stage::Running {
            step.status = AllureStatus::Broken;
            if step.status_details.message.is_none() {
                step.status_details.message = Some(message.to_string());
            }
            step.stage = Stage::Finished;
            step.stop = Some(now_ms());
        }

        if let Some(parent) = state.steps.last_mut() {
            parent.steps.push(step);
        } else if let Some(current) = state.current.as_mut() {
            current.steps.push(step);
        }
    }
}

impl AllureReporter {
    /// Create the reporter, making sure the results directory exists
    pub fn new(results_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(results_dir).with_context(|| {
            format!("Failed to create results dir: {}", results_dir.display())
        })?;
        Ok(Self {
            results_dir: results_dir.to_path_buf(),
            state: Mutex::new(ReporterState::default()),
        })
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a new test entry. Any entry left open is discarded.
    pub fn start_test(&self, suite: &str, name: &str) -> String {
        let uuid = Uuid::new_v4().to_string();
        let full_name = format!("{} {}", suite, name);

        let record = TestResultRecord {
            uuid: uuid.clone(),
            history_id: history_id(&full_name),
            name: name.to_string(),
            full_name,
            status: AllureStatus::Passed,
            status_details: StatusDetails::default(),
            stage: Stage::Running,
            steps: Vec::new(),
            attachments: Vec::new(),
            labels: vec![
                Label::new("suite", suite),
                Label::new("framework", env!("CARGO_PKG_NAME")),
                Label::new("language", "rust"),
            ],
            start: now_ms(),
            stop: None,
        };

        let mut state = self.lock();
        if let Some(stale) = state.current.replace(record) {
            log::warn!("Discarding unfinished report entry '{}'", stale.name);
        }
        state.steps.clear();
        uuid
    }

    /// Write `data` next to the results and link it to the innermost open
    /// step, or to the current test when no step is open.
    pub fn add_attachment(&self, name: &str, data: &[u8], mime_type: &str) -> Result<()> {
        let source = format!(
            "{}-attachment.{}",
            Uuid::new_v4(),
            attachment_extension(mime_type)
        );
        let path = self.results_dir.join(&source);
        std::fs::write(&path, data)
            .with_context(|| format!("Failed to write attachment: {}", path.display()))?;

        let attachment = Attachment {
            name: name.to_string(),
            source,
            mime_type: mime_type.to_string(),
        };

        let mut state = self.lock();
        if let Some(step) = state.steps.last_mut() {
            step.attachments.push(attachment);
        } else if let Some(current) = state.current.as_mut() {
            current.attachments.push(attachment);
        } else {
            anyhow::bail!("No report entry open for attachment '{}'", name);
        }
        Ok(())
    }

    /// Record a named sub-step around `body`.
    ///
    /// The step is `broken` if the body returns an error, or `failed` if
    /// [`fail_current_step`](Self::fail_current_step) was called inside it.
    pub async fn step<F, T>(&self, name: &str, body: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.lock().steps.push(StepResult {
            name: name.to_string(),
            status: AllureStatus::Passed,
            status_details: StatusDetails::default(),
            stage: Stage::Running,
            steps: Vec::new(),
            attachments: Vec::new(),
            start: now_ms(),
            stop: None,
        });

        let result = body.await;

        let mut state = self.lock();
        if let Some(mut step) = state.steps.pop() {
            if let Err(ref e) = result {
                step.status = AllureStatus::Broken;
                step.status_details.message = Some(e.to_string());
            }
            step.stage = Stage::Finished;
            step.stop = Some(now_ms());

            if let Some(parent) = state.steps.last_mut() {
                parent.steps.push(step);
            } else if let Some(current) = state.current.as_mut() {
                current.steps.push(step);
            }
        }

        result
    }

    /// Mark the innermost open step and all its ancestors as failed
    pub fn fail_current_step(&self, message: &str) {
        let mut state = self.lock();
        let depth = state.steps.len();
        for (i, step) in state.steps.iter_mut().enumerate() {
            step.status = AllureStatus::Failed;
            if i + 1 == depth {
                step.status_details.message = Some(message.to_string());
            }
        }
    }

    /// Close every step still open as `broken`, innermost first.
    /// Used when a step body was dropped before it could finish.
    pub fn close_open_steps(&self, message: &str) {
        let mut state = self.lock();
        close_steps(&mut state, message);
    }

    /// Close the current entry and write `<uuid>-result.json`.
    /// Steps left open are recorded as `broken`.
    pub fn end_test(&self, status: AllureStatus, details: StatusDetails) -> Result<PathBuf> {
        let mut state = self.lock();
        close_steps(&mut state, "Step did not finish");
        let mut record = state
            .current
            .take()
            .ok_or_else(|| anyhow::anyhow!("No report entry open"))?;
        drop(state);

        record.status = status;
        record.status_details = details;
        record.stage = Stage::Finished;
        record.stop = Some(now_ms());

        let path = self.results_dir.join(format!("{}-result.json", record.uuid));
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write result: {}", path.display()))?;
        Ok(path)
    }

    /// Write `environment.properties` shown on the report overview
    pub fn write_environment(&self, entries: &[(&str, String)]) -> Result<()> {
        let content: String = entries
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, value))
            .collect();
        let path = self.results_dir.join("environment.properties");
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
