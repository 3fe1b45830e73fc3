use crate::core::{BrowserCapabilities, BrowserConfig, BrowserDriver, BrowserType};
use crate::errors::{BrowserError, Result};
use crate::types::{ElementHandle, Locator, OptionChoice, TraversalContext};
use crate::utils::javascript::{ScriptReply, Scripts};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const EDGE_LOCATIONS: &[&str] = &[
    "/usr/bin/microsoft-edge",
    "/usr/bin/microsoft-edge-stable",
    "/opt/microsoft/msedge/msedge",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
];

/// Chromium-family browser (Chrome or Edge) driven over the DevTools
/// protocol.
pub struct ChromeBrowser {
    browser: Mutex<Option<Browser>>,
    tab: Mutex<Option<Arc<Tab>>>,
    capabilities: BrowserCapabilities,
}

impl ChromeBrowser {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let window_size = (config.viewport.width, config.viewport.height);
        let profile_arg = config
            .profile_name
            .as_ref()
            .map(|name| format!("--profile-directory={}", name));
        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
        ];
        if let Some(ref arg) = profile_arg {
            args.push(OsStr::new(arg));
        }
        if let Some(ref arg) = user_agent_arg {
            args.push(OsStr::new(arg));
        }
        for arg in &config.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some(window_size))
            .path(Self::executable(config)?)
            .user_data_dir(config.profile_dir.clone())
            .idle_browser_timeout(Duration::from_secs(600))
            .args(args)
            .build()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        tracing::info!(
            "launched {:?} (headless: {}, profile: {:?})",
            config.browser_type,
            config.headless,
            config.profile_name
        );

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            tab: Mutex::new(Some(tab)),
            capabilities: Self::supported_capabilities(),
        })
    }

    /// What every launched browser supports, known before launching one.
    pub fn supported_capabilities() -> BrowserCapabilities {
        BrowserCapabilities {
            supports_shadow_dom: true,
            supports_frames: true,
            supports_screenshots: true,
            supports_xpath: true,
        }
    }

    fn executable(config: &BrowserConfig) -> Result<Option<PathBuf>> {
        if let Some(path) = &config.executable {
            return Ok(Some(path.clone()));
        }
        match config.browser_type {
            // headless_chrome finds Chrome on its own
            BrowserType::Chrome => Ok(None),
            BrowserType::Edge => EDGE_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists())
                .map(Some)
                .ok_or_else(|| {
                    BrowserError::LaunchFailed(
                        "Microsoft Edge not found; set browser.executable".to_string(),
                    )
                }),
        }
    }

    fn tab(&self) -> Result<Arc<Tab>> {
        lock(&self.tab)
            .as_ref()
            .cloned()
            .ok_or(BrowserError::SessionClosed)
    }

    /// A round trip to the browser fails once its process or transport is gone.
    fn connection_lost(&self) -> bool {
        match lock(&self.browser).as_ref() {
            Some(browser) => browser.get_version().is_err(),
            None => true,
        }
    }

    /// Evaluate one of the envelope scripts and unpack its reply.
    fn run(&self, script: String) -> Result<Option<Value>> {
        let tab = self.tab()?;
        let result = tab.evaluate(&script, false).map_err(|e| {
            if self.connection_lost() {
                BrowserError::ChromeError(format!("connection to the browser was lost: {}", e))
            } else {
                BrowserError::JavaScriptFailed(e.to_string())
            }
        })?;
        let raw = result
            .value
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BrowserError::JavaScriptFailed("script returned no reply".to_string())
            })?;
        ScriptReply::parse(raw)?.into_result()
    }

    fn run_value(&self, script: String) -> Result<Value> {
        Ok(self.run(script)?.unwrap_or(Value::Null))
    }

    fn element_reply(value: Option<Value>, context: &TraversalContext) -> Option<ElementHandle> {
        value
            .as_ref()
            .and_then(Value::as_str)
            .map(|id| ElementHandle::new(id, context.clone()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl BrowserDriver for ChromeBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.tab()?;
        tab.navigate_to(url)
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn query(
        &self,
        context: &TraversalContext,
        locator: &Locator,
    ) -> Result<Option<ElementHandle>> {
        let value = self.run(Scripts::query(context, locator)?)?;
        Ok(Self::element_reply(value, context))
    }

    async fn query_shadow(
        &self,
        host: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>> {
        let value = self.run(Scripts::query_shadow(&host.id, selector)?)?;
        Ok(Self::element_reply(value, &host.context))
    }

    async fn is_interactable(&self, element: &ElementHandle) -> Result<bool> {
        let value = self.run_value(Scripts::interactable(&element.id)?)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn switch_context(&self, frame: &ElementHandle) -> Result<TraversalContext> {
        self.run(Scripts::enter_frame(&frame.context, &frame.id)?)?;
        Ok(frame.context.child(frame.id.clone()))
    }

    async fn execute(
        &self,
        context: &TraversalContext,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.run_value(Scripts::execute(context, script, &args)?)
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.run(Scripts::click(&element.id)?)?;
        Ok(())
    }

    async fn double_click(&self, element: &ElementHandle) -> Result<()> {
        self.run(Scripts::double_click(&element.id)?)?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.run(Scripts::focus(&element.id)?)?;
        self.tab()?
            .type_str(text)
            .map_err(|e| BrowserError::JavaScriptFailed(e.to_string()))?;
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String> {
        let value = self.run_value(Scripts::text(&element.id)?)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn select_option(
        &self,
        element: &ElementHandle,
        choice: &OptionChoice,
    ) -> Result<bool> {
        let value = self.run_value(Scripts::select_option(&element.id, choice)?)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.tab()?
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))
    }

    fn capabilities(&self) -> BrowserCapabilities {
        self.capabilities.clone()
    }

    fn is_running(&self) -> bool {
        lock(&self.browser).is_some()
    }

    async fn close(&self) -> Result<()> {
        lock(&self.tab).take();
        if lock(&self.browser).take().is_some() {
            tracing::debug!("browser process released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PresetParams;
    use crate::types::Locator;
    use crate::workflow::{Preset, Step, StepAction};

    #[test]
    fn workflows_validate_without_a_running_browser() {
        let params = PresetParams {
            instance: Some(url::Url::parse("https://acme.service-now.com/").unwrap()),
            ..PresetParams::default()
        };
        let capabilities = ChromeBrowser::supported_capabilities();

        for preset in Preset::ALL {
            let workflow = preset.build(&params).unwrap();
            assert!(workflow.validate(&capabilities).is_ok(), "{}", preset.name());
        }

        let mut workflow = Preset::EditTag.build(&params).unwrap();
        workflow.steps.push(Step::new("by xpath", Locator::xpath("//a"), StepAction::Click));
        assert!(workflow.validate(&capabilities).is_ok());

        workflow.list_url = "not a url".into();
        assert!(workflow.validate(&capabilities).is_err());
    }
}
