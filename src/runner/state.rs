use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A soft assertion that did not hold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailedExpectation {
    pub matcher_name: String,
    pub message: String,
}

/// Error that ended a test early. Reported as `broken`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestError {
    pub message: String,
}

impl TestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Descriptor of the running test
#[derive(Debug, Clone)]
pub struct TestCase {
    pub suite: String,
    pub name: String,
    pub failed_expectations: Vec<FailedExpectation>,
    pub started_at: Option<Instant>,
}

impl TestCase {
    pub fn new(suite: &str, name: &str) -> Self {
        Self {
            suite: suite.to_string(),
            name: name.to_string(),
            failed_expectations: Vec::new(),
            started_at: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }
}

/// Outcome of one executed test
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub passed: bool,
    pub error: Option<TestError>,
    pub duration_ms: u64,
}

impl TestResult {
    /// Build the result from what the test body produced
    pub fn from_run(test: &TestCase, error: Option<TestError>) -> Self {
        let duration_ms = test
            .started_at
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or(0);
        Self {
            passed: error.is_none() && test.failed_expectations.is_empty(),
            error,
            duration_ms,
        }
    }
}

/// Counts for the whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub broken: u32,
}

impl RunSummary {
    pub fn record(&mut self, result: &TestResult) {
        self.total += 1;
        if result.passed {
            self.passed += 1;
        } else if result.error.is_some() {
            self.broken += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_expectation(mut test: TestCase) -> TestCase {
        test.failed_expectations.push(FailedExpectation {
            matcher_name: "toBeExisting".to_string(),
            message: "missing".to_string(),
        });
        test
    }

    #[test]
    fn test_result_fails_on_expectation() {
        let mut test = with_expectation(TestCase::new("Suite", "t"));
        test.start();
        let result = TestResult::from_run(&test, None);
        assert!(!result.passed);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_summary_counts() {
        let clean = TestCase::new("Suite", "t");
        let soft_failed = with_expectation(TestCase::new("Suite", "t"));
        let mut summary = RunSummary::default();
        summary.record(&TestResult::from_run(&clean, None));
        summary.record(&TestResult::from_run(&clean, Some(TestError::new("session lost"))));
        summary.record(&TestResult::from_run(&soft_failed, None));
        // An error wins over failed expectations
        summary.record(&TestResult::from_run(
            &soft_failed,
            Some(TestError::new("timeout")),
        ));

        assert_eq!(
            summary,
            RunSummary {
                total: 4,
                passed: 1,
                failed: 1,
                broken: 2
            }
        );
        assert!(!summary.all_passed());
    }
}
