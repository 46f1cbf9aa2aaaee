/// A spec file: one suite of browser tests
#[derive(Debug, Clone, PartialEq)]
pub struct SpecFile {
    pub suite: String,
    pub path: String,
    pub tests: Vec<TestDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestDefinition {
    pub name: String,
    pub commands: Vec<TestCommand>,
}

/// Commands available inside a test
#[derive(Debug, Clone, PartialEq)]
pub enum TestCommand {
    /// Navigate to a URL
    Url(String),
    /// Named report step wrapping nested commands
    Step {
        name: String,
        commands: Vec<TestCommand>,
    },
    /// Soft assertion: an element matching the CSS selector exists
    ExpectExisting(String),
    /// Soft assertion: the document title contains the text
    ExpectTitle(String),
}

impl TestCommand {
    pub fn display_name(&self) -> String {
        match self {
            TestCommand::Url(url) => format!("url {}", url),
            TestCommand::Step { name, .. } => format!("step \"{}\"", name),
            TestCommand::ExpectExisting(css) => format!("expectExisting {}", css),
            TestCommand::ExpectTitle(text) => format!("expectTitle \"{}\"", text),
        }
    }
}
