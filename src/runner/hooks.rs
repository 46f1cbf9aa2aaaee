//! Run lifecycle hooks
//!
//! Called by the executor at fixed points of a run:
//! `before_test` and `after_test` around every test, `after` once the last
//! test finished, and `on_complete` after the session is gone.
//! The browser session is always passed in explicitly.

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use super::state::{TestCase, TestResult};
use crate::driver::BrowserSession;
use crate::report::{propagate_history, AllureReporter, GenerateError, ReportTool};
use crate::utils::RunConfig;

pub const SCREENSHOT_MIME: &str = "image/png";

/// Where and how to serve the rendered report
#[derive(Debug, Clone, PartialEq)]
pub struct ServeOptions {
    pub host: String,
    pub port: u16,
}

/// What `on_complete` ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// Report rendered; carries the number of history files copied back,
    /// or `None` if the copy failed
    Generated { history_files: Option<usize> },
    /// The report tool could not run or exited non-zero
    Failed,
}

pub struct RunHooks {
    results_dir: PathBuf,
    report_dir: PathBuf,
    serve: Option<ServeOptions>,
    tool: Arc<dyn ReportTool>,
}

/// A test needs a screenshot when it errored or any expectation failed
pub fn is_failure(test: &TestCase, result: &TestResult) -> bool {
    result.error.is_some() || !test.failed_expectations.is_empty()
}

/// Attachment name for a screenshot taken at `at`, free of `:` and `.`
pub fn screenshot_name(at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(|c: char| c == ':' || c == '.', "_");
    format!("screenshot_{}", stamp)
}

impl RunHooks {
    pub fn new(config: &RunConfig, tool: Box<dyn ReportTool>) -> Self {
        let serve = config.serve_report.then(|| ServeOptions {
            host: config.serve_host.clone(),
            port: config.serve_port,
        });
        Self {
            results_dir: config.results_dir.clone(),
            report_dir: config.report_dir.clone(),
            serve,
            tool: Arc::from(tool),
        }
    }

    /// Start every test from a clean, maximized browser
    pub async fn before_test(
        &self,
        session: &mut dyn BrowserSession,
        _test: &TestCase,
    ) -> Result<()> {
        session
            .reload_session()
            .await
            .context("Failed to reload session")?;
        session
            .maximize_window()
            .await
            .context("Failed to maximize window")?;
        Ok(())
    }

    /// Attach a screenshot to the current report entry if the test failed.
    /// Returns whether a screenshot was attached.
    pub async fn after_test(
        &self,
        session: &dyn BrowserSession,
        reporter: &AllureReporter,
        test: &TestCase,
        result: &TestResult,
    ) -> Result<bool> {
        if !is_failure(test, result) {
            return Ok(false);
        }

        let encoded = session
            .take_screenshot()
            .await
            .context("Failed to take screenshot")?;
        let image = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .context("Failed to decode screenshot")?;

        let name = screenshot_name(Utc::now());
        reporter.add_attachment(&name, &image, SCREENSHOT_MIME)?;
        println!("    {} Attached {}", "📸", name.dimmed());
        Ok(true)
    }

    /// Close the window and end the session, if one is still alive.
    /// The session is deleted even if closing the window fails; the first
    /// error is returned. The slot is empty afterwards, so calling this twice
    /// is harmless.
    pub async fn after(&self, slot: &mut Option<Box<dyn BrowserSession>>) -> Result<()> {
        let Some(mut session) = slot.take() else {
            return Ok(());
        };
        if session.session_id().is_none() {
            return Ok(());
        }

        let closed = session.close_window().await.context("Failed to close window");
        let deleted = session
            .delete_session()
            .await
            .context("Failed to delete session");
        closed.and(deleted)
    }

    /// Run a blocking report tool call off the async workers
    async fn run_tool<F>(&self, call: F) -> Result<(), GenerateError>
    where
        F: FnOnce(&dyn ReportTool) -> Result<(), GenerateError> + Send + 'static,
    {
        let tool = Arc::clone(&self.tool);
        tokio::task::spawn_blocking(move || call(tool.as_ref()))
            .await
            .unwrap_or_else(|e| Err(GenerateError::Spawn(io::Error::new(io::ErrorKind::Other, e))))
    }

    /// Render the report, carry history forward and optionally serve it.
    /// Never fails: tool and copy errors are logged.
    pub async fn on_complete(&self) -> CompletionOutcome {
        println!("\n{} Generating Allure report", "📊".blue());

        let (results_dir, report_dir) = (self.results_dir.clone(), self.report_dir.clone());
        let generated = self
            .run_tool(move |tool| tool.generate(&results_dir, &report_dir))
            .await;
        if let Err(e) = generated {
            match e {
                GenerateError::Spawn(err) => {
                    log::error!("Generating report failed: {}", err);
                }
                GenerateError::Failed { stderr, .. } => {
                    log::error!("Generating report failed: {}", stderr);
                }
            }
            return CompletionOutcome::Failed;
        }

        let history_files = match propagate_history(&self.report_dir, &self.results_dir) {
            Ok(count) => {
                log::debug!("Copied {} history file(s) into results", count);
                Some(count)
            }
            Err(e) => {
                log::error!("Copying report history failed: {}", e);
                None
            }
        };

        println!("{} Generating report completed.", "✅".green());

        if let Some(ref serve) = self.serve {
            println!(
                "{} Serving report at {}. Press Ctrl+C to exit.",
                "🌐".blue(),
                format!("http://{}:{}", serve.host, serve.port).cyan()
            );
            let (report_dir, host, port) = (self.report_dir.clone(), serve.host.clone(), serve.port);
            let served = self
                .run_tool(move |tool| tool.open(&report_dir, &host, port))
                .await;
            if let Err(e) = served {
                log::error!("Serving report failed: {}", e);
            }
        }

        CompletionOutcome::Generated { history_files }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::driver::ElementRef;
    use crate::runner::state::{FailedExpectation, TestError};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// 1x1 transparent PNG
    pub const PNG_BASE64: &str =
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[derive(Clone, Default)]
    pub struct MockSession {
        pub calls: Arc<Mutex<Vec<String>>>,
        pub session: Option<String>,
        pub existing: Vec<String>,
        pub title: String,
        pub close_fails: bool,
    }

    impl MockSession {
        pub fn open() -> Self {
            Self {
                session: Some("mock".to_string()),
                ..Self::default()
            }
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        pub fn count(&self, call: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.as_str() == call)
                .count()
        }
    }

    #[async_trait]
    impl BrowserSession for MockSession {
        fn session_id(&self) -> Option<&str> {
            self.session.as_deref()
        }
        async fn navigate(&self, url: &str) -> Result<()> {
            self.record(&format!("navigate {}", url));
            Ok(())
        }
        async fn find_element(&self, css: &str) -> Result<Option<ElementRef>> {
            self.record("find_element");
            Ok(self
                .existing
                .iter()
                .any(|e| e == css)
                .then(|| ElementRef(css.to_string())))
        }
        async fn title(&self) -> Result<String> {
            Ok(self.title.clone())
        }
        async fn reload_session(&mut self) -> Result<()> {
            self.record("reload_session");
            self.session = Some("mock".to_string());
            Ok(())
        }
        async fn maximize_window(&self) -> Result<()> {
            self.record("maximize_window");
            Ok(())
        }
        async fn take_screenshot(&self) -> Result<String> {
            self.record("take_screenshot");
            Ok(PNG_BASE64.to_string())
        }
        async fn close_window(&self) -> Result<()> {
            self.record("close_window");
            if self.close_fails {
                anyhow::bail!("no such window");
            }
            Ok(())
        }
        async fn delete_session(&mut self) -> Result<()> {
            self.record("delete_session");
            self.session = None;
            Ok(())
        }
    }

    /// Report tool double that writes an optional history file on success
    #[derive(Clone, Default)]
    pub struct FakeTool {
        pub exit_code: Option<i32>,
        pub spawn_fails: bool,
        pub history: Vec<(&'static str, &'static str)>,
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl ReportTool for FakeTool {
        fn generate(&self, _results: &Path, report: &Path) -> Result<(), GenerateError> {
            self.calls.lock().unwrap().push("generate".to_string());
            if self.spawn_fails {
                return Err(GenerateError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "allure not found",
                )));
            }
            if let Some(code) = self.exit_code.filter(|c| *c != 0) {
                return Err(GenerateError::Failed {
                    status: Some(code),
                    stderr: "boom".to_string(),
                });
            }
            for (file, content) in &self.history {
                let path = report.join("history").join(file);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, content).unwrap();
            }
            Ok(())
        }

        fn open(&self, _report: &Path, host: &str, port: u16) -> Result<(), GenerateError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("open {}:{}", host, port));
            Ok(())
        }
    }

    fn hooks_in(dir: &Path, tool: FakeTool, serve: bool) -> RunHooks {
        let config = RunConfig {
            results_dir: dir.join("allure-results"),
            report_dir: dir.join("allure-report"),
            serve_report: serve,
            ..RunConfig::default()
        };
        RunHooks::new(&config, Box::new(tool))
    }

    fn attachment_count(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("-attachment."))
            .count()
    }

    #[test]
    fn test_screenshot_name_is_filesystem_safe() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let name = screenshot_name(at);
        assert_eq!(name, "screenshot_2024-03-05T14_07_09_000Z");
        assert!(!name.contains(':'));
        assert!(!name.contains('.'));

        let later = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 10).unwrap();
        assert_ne!(screenshot_name(later), name);
    }

    #[tokio::test]
    async fn test_before_test_reloads_then_maximizes() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = hooks_in(dir.path(), FakeTool::default(), false);
        let mut session = MockSession::open();

        hooks
            .before_test(&mut session, &TestCase::new("Suite", "t"))
            .await
            .unwrap();

        assert_eq!(
            *session.calls.lock().unwrap(),
            vec!["reload_session", "maximize_window"]
        );
    }

    #[tokio::test]
    async fn test_passing_test_takes_no_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = hooks_in(dir.path(), FakeTool::default(), false);
        let reporter = AllureReporter::new(&dir.path().join("allure-results")).unwrap();
        let session = MockSession::open();
        let test = TestCase::new("Suite", "t");

        reporter.start_test("Suite", "t");
        let result = TestResult::from_run(&test, None);
        let captured = hooks
            .after_test(&session, &reporter, &test, &result)
            .await
            .unwrap();

        assert!(!captured);
        assert_eq!(session.count("take_screenshot"), 0);
        assert_eq!(attachment_count(reporter.results_dir()), 0);
    }

    #[tokio::test]
    async fn test_errored_test_gets_one_png_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = hooks_in(dir.path(), FakeTool::default(), false);
        let reporter = AllureReporter::new(&dir.path().join("allure-results")).unwrap();
        let session = MockSession::open();
        let test = TestCase::new("Suite", "t");

        reporter.start_test("Suite", "t");
        let result = TestResult::from_run(&test, Some(TestError::new("x")));
        assert!(hooks
            .after_test(&session, &reporter, &test, &result)
            .await
            .unwrap());

        let path = reporter
            .end_test(
                crate::report::types::AllureStatus::Broken,
                Default::default(),
            )
            .unwrap();
        let record: crate::report::types::TestResultRecord =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(session.count("take_screenshot"), 1);
        assert_eq!(record.attachments.len(), 1);
        assert_eq!(record.attachments[0].mime_type, "image/png");
        assert!(record.attachments[0].name.starts_with("screenshot_"));

        let bytes =
            std::fs::read(reporter.results_dir().join(&record.attachments[0].source)).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }

    #[tokio::test]
    async fn test_failed_expectation_triggers_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = hooks_in(dir.path(), FakeTool::default(), false);
        let reporter = AllureReporter::new(&dir.path().join("allure-results")).unwrap();
        let session = MockSession::open();
        let mut test = TestCase::new("Suite", "t");
        test.failed_expectations.push(FailedExpectation {
            matcher_name: "toBeExisting".to_string(),
            message: "#foobar".to_string(),
        });

        reporter.start_test("Suite", "t");
        let result = TestResult::from_run(&test, None);
        hooks
            .after_test(&session, &reporter, &test, &result)
            .await
            .unwrap();

        assert_eq!(session.count("take_screenshot"), 1);
        assert_eq!(attachment_count(reporter.results_dir()), 1);
    }

    #[tokio::test]
    async fn test_after_twice_is_noop_second_time() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = hooks_in(dir.path(), FakeTool::default(), false);
        let session = MockSession::open();
        let calls = session.calls.clone();
        let mut slot: Option<Box<dyn BrowserSession>> = Some(Box::new(session));

        hooks.after(&mut slot).await.unwrap();
        assert!(slot.is_none());
        hooks.after(&mut slot).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["close_window", "delete_session"]);
    }

    #[tokio::test]
    async fn test_after_deletes_session_when_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = hooks_in(dir.path(), FakeTool::default(), false);
        let session = MockSession {
            close_fails: true,
            ..MockSession::open()
        };
        let calls = session.calls.clone();
        let mut slot: Option<Box<dyn BrowserSession>> = Some(Box::new(session));

        let err = hooks.after(&mut slot).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to close window"));
        assert!(slot.is_none());
        assert_eq!(*calls.lock().unwrap(), vec!["close_window", "delete_session"]);

        hooks.after(&mut slot).await.unwrap();
    }

    #[tokio::test]
    async fn test_after_skips_dead_session() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = hooks_in(dir.path(), FakeTool::default(), false);
        let session = MockSession::default();
        let calls = session.calls.clone();
        let mut slot: Option<Box<dyn BrowserSession>> = Some(Box::new(session));

        hooks.after(&mut slot).await.unwrap();
        assert!(slot.is_none());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_on_complete_without_prior_history() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = hooks_in(dir.path(), FakeTool::default(), false);

        let outcome = hooks.on_complete().await;

        assert_eq!(
            outcome,
            CompletionOutcome::Generated {
                history_files: Some(0)
            }
        );
        assert!(dir.path().join("allure-report/history").is_dir());
        assert!(dir.path().join("allure-results/history").is_dir());
    }

    #[tokio::test]
    async fn test_on_complete_copies_history_and_serves() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool {
            exit_code: Some(0),
            history: vec![("history-trend.json", "[1]"), ("categories-trend.json", "[2]")],
            ..FakeTool::default()
        };
        let calls = tool.calls.clone();
        let hooks = hooks_in(dir.path(), tool, true);

        let outcome = hooks.on_complete().await;

        assert_eq!(
            outcome,
            CompletionOutcome::Generated {
                history_files: Some(2)
            }
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("allure-results/history/history-trend.json"))
                .unwrap(),
            "[1]"
        );
        assert_eq!(*calls.lock().unwrap(), vec!["generate", "open localhost:9000"]);
    }

    #[tokio::test]
    async fn test_on_complete_history_copy_error_is_logged_only() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool {
            history: vec![("history-trend.json", "[1]")],
            ..FakeTool::default()
        };
        let calls = tool.calls.clone();
        let hooks = hooks_in(dir.path(), tool, true);
        // A file where the results history directory should be
        std::fs::create_dir_all(dir.path().join("allure-results")).unwrap();
        std::fs::write(dir.path().join("allure-results/history"), "not a dir").unwrap();

        let outcome = hooks.on_complete().await;

        assert_eq!(
            outcome,
            CompletionOutcome::Generated {
                history_files: None
            }
        );
        assert!(dir.path().join("allure-report/history").is_dir());
        assert_eq!(*calls.lock().unwrap(), vec!["generate", "open localhost:9000"]);
    }

    #[tokio::test]
    async fn test_on_complete_tool_failure_returns_normally() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool {
            exit_code: Some(1),
            ..FakeTool::default()
        };
        let calls = tool.calls.clone();
        let hooks = hooks_in(dir.path(), tool, true);

        assert_eq!(hooks.on_complete().await, CompletionOutcome::Failed);
        assert!(!dir.path().join("allure-results/history").exists());
        assert_eq!(*calls.lock().unwrap(), vec!["generate"]);
    }

    #[tokio::test]
    async fn test_on_complete_spawn_failure_returns_normally() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool {
            spawn_fails: true,
            ..FakeTool::default()
        };
        let hooks = hooks_in(dir.path(), tool, false);

        assert_eq!(hooks.on_complete().await, CompletionOutcome::Failed);
    }
}
