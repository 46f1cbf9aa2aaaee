use super::types::{SpecFile, TestCommand, TestDefinition};
use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// Parse a YAML spec file
pub fn parse_spec_file(path: &Path) -> Result<SpecFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    parse_spec_content(&content, path)
        .with_context(|| format!("Invalid spec file: {}", path.display()))
}

/// Parse YAML content into a SpecFile. The suite defaults to the file stem.
pub fn parse_spec_content(content: &str, source_path: &Path) -> Result<SpecFile> {
    let root: Value = serde_yaml::from_str(content)?;
    let map = root
        .as_mapping()
        .ok_or_else(|| anyhow::anyhow!("Spec must be a mapping with 'suite' and 'tests'"))?;

    let suite = match map.get("suite") {
        Some(v) => v
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("'suite' must be a string"))?
            .to_string(),
        None => source_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "default".to_string()),
    };

    let tests_value = map
        .get("tests")
        .ok_or_else(|| anyhow::anyhow!("Missing 'tests' list"))?;
    let tests_seq = tests_value
        .as_sequence()
        .ok_or_else(|| anyhow::anyhow!("'tests' must be a list"))?;

    let mut tests = Vec::new();
    for (i, test_value) in tests_seq.iter().enumerate() {
        let test_map = test_value
            .as_mapping()
            .ok_or_else(|| anyhow::anyhow!("Test #{} must be a mapping", i + 1))?;
        let name = test_map
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Test #{} is missing 'name'", i + 1))?
            .to_string();
        let commands = parse_commands(test_map)
            .with_context(|| format!("In test '{}'", name))?;
        tests.push(TestDefinition { name, commands });
    }

    Ok(SpecFile {
        suite,
        path: source_path.display().to_string(),
        tests,
    })
}

fn parse_commands(map: &Mapping) -> Result<Vec<TestCommand>> {
    match map.get("commands") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(seq)) => seq.iter().map(parse_command_value).collect(),
        Some(_) => anyhow::bail!("'commands' must be a list"),
    }
}

/// Parse a single-key command mapping such as `url: https://...`
pub fn parse_command_value(value: &Value) -> Result<TestCommand> {
    let map = value
        .as_mapping()
        .ok_or_else(|| anyhow::anyhow!("Command must be a mapping, got: {:?}", value))?;
    if map.len() != 1 {
        anyhow::bail!("Command must have exactly one key, got {}", map.len());
    }
    let (key, arg) = map
        .iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty command"))?;
    let key = key
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Command name must be a string"))?;

    let string_arg = || -> Result<String> {
        arg.as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("'{}' expects a string", key))
    };

    match key {
        "url" => Ok(TestCommand::Url(string_arg()?)),
        "expectExisting" => Ok(TestCommand::ExpectExisting(string_arg()?)),
        "expectTitle" => Ok(TestCommand::ExpectTitle(string_arg()?)),
        "step" => {
            let step_map = arg
                .as_mapping()
                .ok_or_else(|| anyhow::anyhow!("'step' expects a mapping with name and commands"))?;
            let name = step_map
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("'step' is missing 'name'"))?
                .to_string();
            Ok(TestCommand::Step {
                name,
                commands: parse_commands(step_map)?,
            })
        }
        other => anyhow::bail!("Unknown command: {}", other),
    }
}

/// Expand a glob into a sorted list of spec files
pub fn discover_specs(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = glob::glob(pattern)
        .with_context(|| format!("Invalid specs pattern: {}", pattern))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        anyhow::bail!("No spec files match '{}'", pattern);
    }
    Ok(files)
}
