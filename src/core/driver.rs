use crate::errors::Result;
use crate::types::{ElementHandle, Locator, OptionChoice, TraversalContext};
use async_trait::async_trait;
use serde_json::Value;

/// Capability set the locator and the workflow engine need from a browser.
///
/// Implementations hold no notion of an "active" context: every query names
/// the context it resolves against, and the session decides which one is
/// current.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Load a URL in the top-level document. Every previously returned
    /// handle and context becomes invalid.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Single, non-waiting lookup of the first element matching `locator`.
    async fn query(
        &self,
        context: &TraversalContext,
        locator: &Locator,
    ) -> Result<Option<ElementHandle>>;

    /// Query the shadow root of `host` with a CSS selector. A host without a
    /// shadow root yields `None`.
    async fn query_shadow(&self, host: &ElementHandle, selector: &str)
        -> Result<Option<ElementHandle>>;

    /// Connected, rendered, visible and enabled.
    async fn is_interactable(&self, element: &ElementHandle) -> Result<bool>;

    /// Context of the document nested in a frame element.
    async fn switch_context(&self, frame: &ElementHandle) -> Result<TraversalContext>;

    /// Run a function body with `args` bound to `arguments`, with `document`
    /// resolving to the context's document. Returns the JSON result.
    async fn execute(
        &self,
        context: &TraversalContext,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value>;

    async fn click(&self, element: &ElementHandle) -> Result<()>;

    async fn double_click(&self, element: &ElementHandle) -> Result<()>;

    /// Focus the element and type `text` as key input.
    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<()>;

    /// Rendered text, trimmed.
    async fn text(&self, element: &ElementHandle) -> Result<String>;

    /// Pick an option of a `<select>`. `false` when no option matches.
    async fn select_option(&self, element: &ElementHandle, choice: &OptionChoice)
        -> Result<bool>;

    /// PNG of the visible viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    fn capabilities(&self) -> BrowserCapabilities;

    fn is_running(&self) -> bool;

    /// Release the browser. Safe to call more than once and after a fault.
    async fn close(&self) -> Result<()>;
}

/// Browser capabilities that can be queried
#[derive(Debug, Clone)]
pub struct BrowserCapabilities {
    pub supports_shadow_dom: bool,
    pub supports_frames: bool,
    pub supports_screenshots: bool,
    pub supports_xpath: bool,
}
