use crate::utils::RunConfig;
use serde_json::{json, Value};

/// Args always passed to Chrome
const BASE_ARGS: &[&str] = &["--disable-dev-shm-usage"];

/// Args dropped when the browser should stay visible
const HIDDEN_ARGS: &[&str] = &["--no-sandbox", "--disable-gpu"];

/// Build the goog:chromeOptions argument list
pub fn chrome_args(config: &RunConfig) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    if config.headless() {
        args.extend(HIDDEN_ARGS.iter().map(|a| a.to_string()));
    }
    args.push(format!("--window-size={}", config.window_size));
    args.push(format!("--lang={}", config.lang));
    args.extend(BASE_ARGS.iter().map(|a| a.to_string()));
    args.extend(config.chrome_args.iter().cloned());
    args
}

/// W3C new-session payload
pub fn session_request(config: &RunConfig) -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": config.browser_name,
                "goog:chromeOptions": {
                    "args": chrome_args(config),
                }
            }
        }
    })
}
