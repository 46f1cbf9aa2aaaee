pub mod types;
pub mod yaml;

pub use types::{SpecFile, TestCommand, TestDefinition};
pub use yaml::{discover_specs, parse_spec_file};
