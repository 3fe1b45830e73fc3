pub mod browser;
pub mod core;
pub mod errors;
pub mod locator;
pub mod testing;
pub mod types;
pub mod utils;
pub mod workflow;

#[cfg(feature = "chrome")]
pub use browser::ChromeBrowser;
pub use browser::BrowserSession;
pub use crate::core::{BrowserDriver, Config};
pub use errors::{BrowserError, Result};
pub use types::*;
pub use workflow::{Preset, RunReport, Workflow, WorkflowRunner, WorkflowState};
