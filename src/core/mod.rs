pub mod config;
pub mod driver;

pub use config::{
    BrowserConfig, BrowserType, Config, LocatorConfig, LoggingConfig, PresetParams, SessionConfig,
    Viewport,
};
pub use driver::{BrowserCapabilities, BrowserDriver};
