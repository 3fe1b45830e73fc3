use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Browser session is closed")]
    SessionClosed,

    #[error("Stale element reference: {0}")]
    StaleElement(String),

    #[error("Traversal context is no longer valid: {0}")]
    ContextInvalid(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Unsupported locator strategy: {0}")]
    UnsupportedLocator(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chrome error: {0}")]
    ChromeError(String),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

// headless_chrome reports everything through anyhow
impl From<anyhow::Error> for BrowserError {
    fn from(err: anyhow::Error) -> Self {
        BrowserError::ChromeError(err.to_string())
    }
}

impl BrowserError {
    /// A reference went stale between two calls of the same poll attempt.
    /// The locator retries these; everything else is a driver fault.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrowserError::StaleElement(_))
    }

    /// Failures of the automation session itself, as opposed to bad input
    /// from the caller.
    pub fn is_driver_fault(&self) -> bool {
        matches!(
            self,
            BrowserError::SessionClosed
                | BrowserError::ContextInvalid(_)
                | BrowserError::JavaScriptFailed(_)
                | BrowserError::NavigationFailed(_)
                | BrowserError::ScreenshotFailed(_)
                | BrowserError::TimeoutError(_)
                | BrowserError::ChromeError(_)
        )
    }
}
