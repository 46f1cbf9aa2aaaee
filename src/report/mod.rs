pub mod allure;
pub mod generator;
pub mod history;
pub mod types;

pub use allure::AllureReporter;
pub use generator::{AllureCli, GenerateError, ReportTool};
pub use history::{propagate_history, HistoryError};
