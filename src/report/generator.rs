//! Allure command-line invocation

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::utils::binary_resolver;

#[derive(Debug, Error)]
pub enum GenerateError {
    /// The tool process could not be started
    #[error("failed to spawn report tool: {0}")]
    Spawn(#[from] io::Error),

    /// The tool ran and exited non-zero
    #[error("report tool exited with {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },
}

/// External report tool. Calls block until the tool exits.
pub trait ReportTool: Send + Sync {
    /// Render `results_dir` into `report_dir`, clearing the previous report
    fn generate(&self, results_dir: &Path, report_dir: &Path) -> Result<(), GenerateError>;

    /// Serve `report_dir` until the viewer is stopped
    fn open(&self, report_dir: &Path, host: &str, port: u16) -> Result<(), GenerateError>;
}

/// The `allure` command-line tool
#[derive(Debug, Clone)]
pub struct AllureCli {
    program: PathBuf,
}

impl Default for AllureCli {
    fn default() -> Self {
        let name = binary_resolver::allure_command_name();
        let program = binary_resolver::find_binary(name).unwrap_or_else(|_| PathBuf::from(name));
        Self { program }
    }
}

impl AllureCli {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn generate_args(results_dir: &Path, report_dir: &Path) -> Vec<String> {
        vec![
            "generate".to_string(),
            results_dir.display().to_string(),
            "-o".to_string(),
            report_dir.display().to_string(),
            "--clean".to_string(),
        ]
    }

    pub fn open_args(report_dir: &Path, host: &str, port: u16) -> Vec<String> {
        vec![
            "open".to_string(),
            report_dir.display().to_string(),
            "-h".to_string(),
            host.to_string(),
            "-p".to_string(),
            port.to_string(),
        ]
    }

    fn run(&self, args: &[String]) -> Result<(), GenerateError> {
        log::debug!("Running {} {}", self.program.display(), args.join(" "));
        let output = Command::new(&self.program).args(args).output()?;

        if output.status.success() {
            Ok(())
        } else {
            Err(GenerateError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl ReportTool for AllureCli {
    fn generate(&self, results_dir: &Path, report_dir: &Path) -> Result<(), GenerateError> {
        self.run(&Self::generate_args(results_dir, report_dir))
    }

    fn open(&self, report_dir: &Path, host: &str, port: u16) -> Result<(), GenerateError> {
        let status = Command::new(&self.program)
            .args(Self::open_args(report_dir, host, port))
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(GenerateError::Failed {
                status: status.code(),
                stderr: String::new(),
            })
        }
    }
}
