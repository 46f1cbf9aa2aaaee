use anyhow::Result;
use async_trait::async_trait;

/// Opaque reference to an element found in the current page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

/// Browser session interface used by the runner and the lifecycle hooks
///
/// The session is owned by the runner and handed to each hook explicitly.
/// Implementations only forward requests to the automation backend.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Current session id, if a session is open
    fn session_id(&self) -> Option<&str>;

    /// Navigate the current window to `url`
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Find the first element matching a CSS selector.
    /// Returns `None` when nothing matches.
    async fn find_element(&self, css: &str) -> Result<Option<ElementRef>>;

    /// Current document title
    async fn title(&self) -> Result<String>;

    /// Replace the session with a fresh one (clean cookies, history, storage)
    async fn reload_session(&mut self) -> Result<()>;

    async fn maximize_window(&self) -> Result<()>;

    /// Capture the viewport. Returns base64 encoded PNG.
    async fn take_screenshot(&self) -> Result<String>;

    async fn close_window(&self) -> Result<()>;

    /// End the session. Further calls fail.
    async fn delete_session(&mut self) -> Result<()>;
}
