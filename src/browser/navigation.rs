use crate::core::BrowserDriver;
use crate::errors::{BrowserError, Result};
use crate::types::TraversalContext;
use std::time::Duration;
use tokio::time::Instant;

const READY_STATE_POLL: Duration = Duration::from_millis(100);

pub struct NavigationManager;

impl NavigationManager {
    /// Wait until the top document reports `interactive` or `complete`.
    ///
    /// Script errors while the old page is torn down are retried. Any other
    /// failure, such as a closed session or a lost browser, ends the wait at
    /// once.
    pub async fn wait_for_navigation_complete<D: BrowserDriver + ?Sized>(
        driver: &D,
        timeout: Duration,
    ) -> Result<NavigationResult> {
        let start_time = Instant::now();
        let top = TraversalContext::top();
        let mut last_state = String::new();

        loop {
            match driver
                .execute(&top, "return document.readyState;", vec![])
                .await
            {
                Ok(value) => {
                    last_state = value.as_str().unwrap_or_default().to_string();
                    if last_state == "interactive" || last_state == "complete" {
                        return Ok(NavigationResult {
                            ready_state: last_state,
                            duration_ms: start_time.elapsed().as_millis() as u64,
                        });
                    }
                }
                Err(BrowserError::JavaScriptFailed(e)) => {
                    tracing::debug!("readyState probe failed: {}", e);
                }
                Err(e) => return Err(e),
            }

            if start_time.elapsed() >= timeout {
                return Err(BrowserError::TimeoutError(format!(
                    "page not ready after {}ms (readyState {:?})",
                    timeout.as_millis(),
                    last_state
                )));
            }
            tokio::time::sleep(READY_STATE_POLL).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub ready_state: String,
    pub duration_ms: u64,
}
