pub mod driver;
pub mod parser;
pub mod report;
pub mod runner;
pub mod utils;

// Re-export common items
pub use runner::{generate_report, run_tests};
pub use utils::RunConfig;
