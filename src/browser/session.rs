use crate::core::{BrowserDriver, Config, LocatorConfig};
use crate::errors::{BrowserError, Result};
use crate::locator;
use crate::types::{Condition, ElementHandle, LocateOutcome, Locator, OptionChoice, TraversalContext};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::navigation::{NavigationManager, NavigationResult};

/// A driver plus the traversal context that lookups currently resolve in.
pub struct BrowserSession<D: BrowserDriver> {
    driver: Arc<D>,
    context: TraversalContext,
    locator: LocatorConfig,
    navigation_timeout: Duration,
    session_id: String,
    closed: bool,
}

impl<D: BrowserDriver> BrowserSession<D> {
    pub fn new(driver: D, config: &Config) -> Self {
        Self::with_driver(Arc::new(driver), config)
    }

    pub fn with_driver(driver: Arc<D>, config: &Config) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("session {} opened", session_id);

        Self {
            driver,
            context: TraversalContext::top(),
            locator: config.locator.clone(),
            navigation_timeout: Duration::from_millis(config.session.navigation_timeout_ms),
            session_id,
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    pub fn current_context(&self) -> &TraversalContext {
        &self.context
    }

    pub fn locator_config(&self) -> &LocatorConfig {
        &self.locator
    }

    pub fn is_closed(&self) -> bool {
        self.closed || !self.driver.is_running()
    }

    /// Load `url` and wait for the document to become ready. The context
    /// returns to the top document.
    pub async fn navigate(&mut self, url: &str) -> Result<NavigationResult> {
        self.ensure_open()?;
        tracing::debug!("navigating to {}", url);

        self.context = TraversalContext::top();
        self.driver.navigate(url).await?;
        let result =
            NavigationManager::wait_for_navigation_complete(self.driver.as_ref(), self.navigation_timeout)
                .await?;

        tracing::debug!(
            "{} ready ({}) after {}ms",
            url,
            result.ready_state,
            result.duration_ms
        );
        Ok(result)
    }

    pub async fn locate(
        &self,
        locator: &Locator,
        timeout: Duration,
        condition: Condition,
    ) -> Result<LocateOutcome> {
        self.ensure_open()?;
        locator::locate(self.driver.as_ref(), &self.context, locator, timeout, condition).await
    }

    pub async fn locate_in_shadow(
        &self,
        host: &ElementHandle,
        selector: &str,
        timeout: Duration,
    ) -> Result<LocateOutcome> {
        self.ensure_open()?;
        locator::locate_in_shadow(self.driver.as_ref(), host, selector, timeout).await
    }

    /// Shadow host lookup followed by the inner selector, within the
    /// configured host budget.
    pub async fn descend_through_shadow(
        &self,
        host_locator: &Locator,
        inner_selector: &str,
    ) -> Result<LocateOutcome> {
        self.ensure_open()?;
        locator::descend_through_shadow(
            self.driver.as_ref(),
            &self.context,
            host_locator,
            inner_selector,
            self.locator.host_timeout(),
        )
        .await
    }

    /// Make the document inside `frame` the current context.
    pub async fn enter_frame(&mut self, frame: &ElementHandle) -> Result<&TraversalContext> {
        self.ensure_open()?;
        let context = locator::enter_frame(self.driver.as_ref(), frame).await?;
        tracing::debug!("entered frame context {}", context);
        self.context = context;
        Ok(&self.context)
    }

    /// Back to the enclosing document. `false` when already at the top.
    pub fn leave_frame(&mut self) -> bool {
        match self.context.parent() {
            Some(parent) => {
                self.context = parent;
                true
            }
            None => false,
        }
    }

    pub fn reset_context(&mut self) {
        self.context = TraversalContext::top();
    }

    pub async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.ensure_open()?;
        self.driver.click(element).await
    }

    pub async fn double_click(&self, element: &ElementHandle) -> Result<()> {
        self.ensure_open()?;
        self.driver.double_click(element).await
    }

    pub async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.ensure_open()?;
        self.driver.send_keys(element, text).await
    }

    pub async fn text(&self, element: &ElementHandle) -> Result<String> {
        self.ensure_open()?;
        self.driver.text(element).await
    }

    pub async fn select_option(&self, element: &ElementHandle, choice: &OptionChoice) -> Result<bool> {
        self.ensure_open()?;
        self.driver.select_option(element, choice).await
    }

    /// Run a script in the current context.
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.ensure_open()?;
        self.driver.execute(&self.context, script, args).await
    }

    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.driver.screenshot().await
    }

    /// Release the browser. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.context = TraversalContext::top();
        tracing::info!("closing session {}", self.session_id);
        self.driver.close().await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(BrowserError::SessionClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDriver, FakePage, TestHelper, MACROPONENT};

    const LIST: &str = "https://acme.test/incident_list.do";

    fn driver_with_list() -> Arc<FakeDriver> {
        let driver = Arc::new(FakeDriver::new());
        driver.add_page(LIST, TestHelper::list_page(&["INC0001"]));
        driver
    }

    #[tokio::test(start_paused = true)]
    async fn navigate_resets_to_top() {
        let driver = driver_with_list();
        let mut session = TestHelper::session(driver.clone());
        session.navigate(LIST).await.unwrap();

        let frame = session
            .descend_through_shadow(&Locator::tag_prefix("macroponent"), "iframe")
            .await
            .unwrap()
            .found()
            .unwrap();
        session.enter_frame(&frame).await.unwrap();
        assert_eq!(session.current_context().depth(), 1);

        let result = session.navigate(LIST).await.unwrap();
        assert_eq!(result.ready_state, "complete");
        assert!(session.current_context().is_top());
        assert_eq!(driver.current_url().as_deref(), Some(LIST));
    }

    #[tokio::test(start_paused = true)]
    async fn lookups_resolve_in_the_current_context() {
        let driver = driver_with_list();
        let mut session = TestHelper::session(driver);
        session.navigate(LIST).await.unwrap();

        let link = Locator::css("a.linked.formlink");
        let outside = session
            .locate(&link, Duration::ZERO, Condition::Presence)
            .await
            .unwrap();
        assert!(!outside.is_found());

        let frame = session
            .descend_through_shadow(&Locator::tag_prefix(MACROPONENT), "iframe")
            .await
            .unwrap()
            .found()
            .unwrap();
        session.enter_frame(&frame).await.unwrap();

        let inside = session
            .locate(&link, Duration::ZERO, Condition::Interactable)
            .await
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(session.text(&inside).await.unwrap(), "INC0001");

        assert!(session.leave_frame());
        assert!(session.current_context().is_top());
        assert!(!session.leave_frame());
    }

    #[tokio::test(start_paused = true)]
    async fn execute_runs_against_the_current_context() {
        let driver = Arc::new(FakeDriver::new());
        driver.add_page(LIST, FakePage::new("<p>x</p>"));
        driver.respond_to_script("document.title", Value::String("Incidents".into()));
        let mut session = TestHelper::session(driver);
        session.navigate(LIST).await.unwrap();

        let title = session.execute("return document.title;", vec![]).await.unwrap();
        assert_eq!(title, Value::String("Incidents".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_idempotent_and_blocks_further_use() {
        let driver = driver_with_list();
        let mut session = TestHelper::session(driver.clone());
        session.navigate(LIST).await.unwrap();

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.is_closed());
        assert!(driver.is_closed());

        let err = session.navigate(LIST).await.unwrap_err();
        assert!(matches!(err, BrowserError::SessionClosed));
        let err = session.screenshot().await.unwrap_err();
        assert!(matches!(err, BrowserError::SessionClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn session_ids_are_unique() {
        let a = TestHelper::session(Arc::new(FakeDriver::new()));
        let b = TestHelper::session(Arc::new(FakeDriver::new()));
        assert_ne!(a.id(), b.id());
    }
}
