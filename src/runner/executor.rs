use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::events::{ConsoleEventListener, EventEmitter, TestEvent};
use super::hooks::{CompletionOutcome, RunHooks};
use super::state::{FailedExpectation, RunSummary, TestCase, TestError, TestResult};
use crate::driver::BrowserSession;
use crate::parser::{SpecFile, TestCommand, TestDefinition};
use crate::report::types::{AllureStatus, StatusDetails};
use crate::report::AllureReporter;
use crate::utils::RunConfig;

/// Runs spec files one test at a time against a single browser session
pub struct TestExecutor {
    config: RunConfig,
    hooks: RunHooks,
    reporter: Arc<AllureReporter>,
    emitter: EventEmitter,
    summary: RunSummary,
    depth: usize,
}

impl TestExecutor {
    pub fn new(config: RunConfig, hooks: RunHooks, reporter: AllureReporter) -> Self {
        let (emitter, receiver) = EventEmitter::new();

        // Start console listener in background
        tokio::spawn(ConsoleEventListener::listen(receiver));

        Self {
            config,
            hooks,
            reporter: Arc::new(reporter),
            emitter,
            summary: RunSummary::default(),
            depth: 0,
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Run every test of every spec, in order
    pub async fn run_specs(
        &mut self,
        slot: &mut Option<Box<dyn BrowserSession>>,
        specs: &[SpecFile],
    ) -> Result<()> {
        self.emitter.emit(TestEvent::RunStarted {
            spec_count: specs.len(),
        });

        for spec in specs {
            self.emitter.emit(TestEvent::SuiteStarted {
                suite: spec.suite.clone(),
                file: spec.path.clone(),
            });
            for definition in &spec.tests {
                let session = slot
                    .as_deref_mut()
                    .ok_or_else(|| anyhow::anyhow!("No browser session available"))?;
                self.run_test(session, spec, definition).await?;
            }
        }
        Ok(())
    }

    /// Run one test between the before/after hooks and record it
    pub async fn run_test(
        &mut self,
        session: &mut dyn BrowserSession,
        spec: &SpecFile,
        definition: &TestDefinition,
    ) -> Result<TestResult> {
        let mut test = TestCase::new(&spec.suite, &definition.name);
        self.emitter.emit(TestEvent::TestStarted {
            name: definition.name.clone(),
        });
        self.reporter.start_test(&spec.suite, &definition.name);
        test.start();

        let reset = self.hooks.before_test(session, &test).await;
        let error = match reset {
            Ok(()) => self.run_body(&*session, &mut test, &definition.commands).await,
            Err(e) => Some(TestError::new(format!("{:#}", e))),
        };
        let result = TestResult::from_run(&test, error);

        let capture = self
            .hooks
            .after_test(&*session, &self.reporter, &test, &result)
            .await;

        let (status, details) = report_status(&test, &result);
        self.reporter.end_test(status, details)?;

        self.summary.record(&result);
        self.emitter.emit(TestEvent::TestFinished {
            name: definition.name.clone(),
            result: result.clone(),
            failed_expectations: test.failed_expectations.len(),
        });

        capture?;
        Ok(result)
    }

    /// Execute the test commands under the per-test timeout
    async fn run_body(
        &mut self,
        session: &dyn BrowserSession,
        test: &mut TestCase,
        commands: &[TestCommand],
    ) -> Option<TestError> {
        let limit = Duration::from_millis(self.config.default_timeout_interval_ms);
        self.depth = 0;

        match tokio::time::timeout(limit, self.run_commands(session, test, commands)).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(TestError::new(format!("{:#}", e))),
            Err(_) => {
                let message = format!(
                    "Timeout: test did not complete within {}ms",
                    limit.as_millis()
                );
                // The dropped body leaves its steps open
                self.reporter.close_open_steps(&message);
                Some(TestError::new(message))
            }
        }
    }

    async fn run_commands(
        &mut self,
        session: &dyn BrowserSession,
        test: &mut TestCase,
        commands: &[TestCommand],
    ) -> Result<()> {
        for command in commands {
            self.emitter.emit(TestEvent::CommandStarted {
                command: command.display_name(),
                depth: self.depth,
            });

            match command {
                TestCommand::Url(url) => {
                    session
                        .navigate(url)
                        .await
                        .with_context(|| format!("Failed to open {}", url))?;
                }
                TestCommand::Step { name, commands } => {
                    let reporter = self.reporter.clone();
                    self.depth += 1;
                    let result = reporter
                        .step(name, Box::pin(self.run_commands(session, test, commands)))
                        .await;
                    self.depth -= 1;
                    result?;
                }
                TestCommand::ExpectExisting(css) => {
                    let found = self
                        .poll(|| async move {
                            Ok::<_, anyhow::Error>(session.find_element(css).await?.is_some())
                        })
                        .await?;
                    if !found {
                        self.fail_expectation(
                            test,
                            "toBeExisting",
                            format!(
                                "Expected element \"{}\" to exist within {}ms",
                                css, self.config.wait_timeout_ms
                            ),
                        );
                    }
                }
                TestCommand::ExpectTitle(text) => {
                    let found = self
                        .poll(|| async move {
                            Ok::<_, anyhow::Error>(session.title().await?.contains(text.as_str()))
                        })
                        .await?;
                    if !found {
                        let actual = session.title().await.unwrap_or_default();
                        self.fail_expectation(
                            test,
                            "toHaveTitle",
                            format!("Expected title to contain \"{}\", got \"{}\"", text, actual),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Re-check `probe` every wait interval until it holds or the wait timeout passes
    async fn poll<F, Fut>(&self, mut probe: F) -> Result<bool>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<bool>>,
    {
        let deadline = Instant::now() + Duration::from_millis(self.config.wait_timeout_ms);
        let interval = Duration::from_millis(self.config.wait_interval_ms.max(1));

        loop {
            if probe().await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Record a soft assertion failure; the test keeps running
    fn fail_expectation(&self, test: &mut TestCase, matcher: &str, message: String) {
        self.reporter.fail_current_step(&message);
        self.emitter.emit(TestEvent::ExpectationFailed {
            message: message.clone(),
            depth: self.depth,
        });
        test.failed_expectations.push(FailedExpectation {
            matcher_name: matcher.to_string(),
            message,
        });
    }

    /// End the browser session
    pub async fn teardown(&mut self, slot: &mut Option<Box<dyn BrowserSession>>) -> Result<()> {
        self.hooks.after(slot).await
    }

    /// Print the summary and build the report
    pub async fn complete(&mut self) -> CompletionOutcome {
        self.emitter.emit(TestEvent::RunFinished {
            summary: self.summary.clone(),
        });

        // Let the console listener drain before the report tool prints
        tokio::time::sleep(Duration::from_millis(200)).await;

        self.hooks.on_complete().await
    }
}

/// Allure status and details for a finished test
fn report_status(test: &TestCase, result: &TestResult) -> (AllureStatus, StatusDetails) {
    if result.passed {
        return (AllureStatus::Passed, StatusDetails::default());
    }

    let status = if result.error.is_some() {
        AllureStatus::Broken
    } else {
        AllureStatus::Failed
    };

    let mut messages: Vec<String> = test
        .failed_expectations
        .iter()
        .map(|f| f.message.clone())
        .collect();
    if let Some(ref e) = result.error {
        messages.push(e.message.clone());
    }

    (
        status,
        StatusDetails {
            message: Some(messages.join("\n")),
            trace: None,
        },
    )
}
