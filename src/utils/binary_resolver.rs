use anyhow::Result;
use std::path::PathBuf;

/// Find a binary next to the current executable or on the system PATH
pub fn find_binary(name: &str) -> Result<PathBuf> {
    let mut checked_paths = Vec::new();

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let sibling_path = exe_dir.join(name);
            checked_paths.push(format!("Sibling: {:?}", sibling_path));
            if sibling_path.is_file() {
                return Ok(sibling_path);
            }
        }
    } else {
        checked_paths.push("Failed to get current_exe".to_string());
    }

    if let Ok(path) = which::which(name) {
        return Ok(path);
    }
    checked_paths.push("System PATH".to_string());

    Err(anyhow::anyhow!(
        "Could not find binary '{}'. Checked:\n{}",
        name,
        checked_paths.join("\n")
    ))
}

/// Allure command-line name for the current platform
pub fn allure_command_name() -> &'static str {
    if cfg!(windows) {
        "allure.cmd"
    } else {
        "allure"
    }
}

/// Find chromedriver (chromedriver.exe on Windows)
pub fn find_chromedriver() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        find_binary("chromedriver.exe").or_else(|_| find_binary("chromedriver"))
    }
    #[cfg(not(windows))]
    {
        find_binary("chromedriver")
    }
}
