use super::state::{RunSummary, TestResult};
use colored::Colorize;
use tokio::sync::broadcast;

/// Test execution events for console updates
#[derive(Debug, Clone)]
pub enum TestEvent {
    RunStarted {
        spec_count: usize,
    },
    RunFinished {
        summary: RunSummary,
    },

    SuiteStarted {
        suite: String,
        file: String,
    },

    TestStarted {
        name: String,
    },
    TestFinished {
        name: String,
        result: TestResult,
        failed_expectations: usize,
    },

    CommandStarted {
        command: String,
        depth: usize,
    },
    ExpectationFailed {
        message: String,
        depth: usize,
    },
}

/// Event emitter for broadcasting test events
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<TestEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }
}

/// Format an event as a console line
pub fn format_event(event: &TestEvent) -> String {
    match event {
        TestEvent::RunStarted { spec_count } => {
            format!("{} Running {} spec file(s)", "▶".green().bold(), spec_count)
        }
        TestEvent::SuiteStarted { suite, file } => {
            format!("\n{} {}", suite.bold(), format!("({})", file).dimmed())
        }
        TestEvent::TestStarted { name } => format!("  {} {}", "•".blue(), name),
        TestEvent::CommandStarted { command, depth } => {
            format!("{}{} {}", "  ".repeat(depth + 2), "›".dimmed(), command.dimmed())
        }
        TestEvent::ExpectationFailed { message, depth } => {
            format!("{}{} {}", "  ".repeat(depth + 2), "✗".red(), message.red())
        }
        TestEvent::TestFinished {
            name,
            result,
            failed_expectations,
        } => {
            if result.passed {
                format!("  {} {} ({}ms)", "✅".green(), name, result.duration_ms)
            } else if let Some(ref e) = result.error {
                format!("  {} {}: {}", "❌".red(), name, e.message.red())
            } else {
                format!(
                    "  {} {}: {} failed expectation(s)",
                    "❌".red(),
                    name,
                    failed_expectations
                )
            }
        }
        TestEvent::RunFinished { summary } => format!(
            "\n{} {} passed, {} failed, {} broken, {} total",
            "■".bold(),
            summary.passed.to_string().green(),
            summary.failed.to_string().red(),
            summary.broken.to_string().yellow(),
            summary.total
        ),
    }
}

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => println!("{}", format_event(&event)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Console listener skipped {} event(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
