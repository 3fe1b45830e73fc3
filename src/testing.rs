//! In-memory driver for exercising the locator and workflows without a
//! browser.
//!
//! Pages are plain HTML parsed with `scraper`. Shadow roots are registered
//! per host tag name and frame documents per frame `name` (or `id`). Time is
//! read from `tokio::time`, so tests can run with a paused clock.

use crate::browser::BrowserSession;
use crate::core::{BrowserCapabilities, BrowserDriver, Config};
use crate::errors::{BrowserError, Result};
use crate::types::{ElementHandle, Locator, OptionChoice, Strategy, TraversalContext};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// A top document plus the shadow roots and frame documents it exposes.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    top: String,
    shadows: HashMap<String, String>,
    frames: HashMap<String, String>,
}

impl FakePage {
    pub fn new(top: impl Into<String>) -> Self {
        Self {
            top: top.into(),
            ..Default::default()
        }
    }

    /// Shadow root content for every host with this tag name.
    pub fn with_shadow(mut self, host_tag: &str, html: impl Into<String>) -> Self {
        self.shadows.insert(host_tag.to_ascii_lowercase(), html.into());
        self
    }

    /// Document of the frame whose `name` (or `id`) is `frame`.
    pub fn with_frame(mut self, frame: &str, html: impl Into<String>) -> Self {
        self.frames.insert(frame.to_string(), html.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Navigate(String),
    Click(String),
    DoubleClick(String),
    SendKeys { target: String, text: String },
    Select { target: String, option: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DocKey {
    Top,
    Shadow(String),
    Frame(String),
}

#[derive(Debug, Clone)]
struct HandleRecord {
    doc: DocKey,
    /// Position in document order among all elements.
    index: usize,
    generation: u64,
}

#[derive(Debug, Clone)]
struct Reaction {
    selector: String,
    frame: String,
    html: String,
}

#[derive(Default)]
struct FakeState {
    pages: HashMap<String, VecDeque<FakePage>>,
    current: Option<FakePage>,
    url: Option<String>,
    generations: HashMap<DocKey, u64>,
    handles: HashMap<String, HandleRecord>,
    document: usize,
    next_handle: usize,
    scheduled: Vec<(Instant, FakePage)>,
    reactions: Vec<Reaction>,
    script_responses: Vec<(String, Value)>,
    interactable_failures: VecDeque<BrowserError>,
    interactions: Vec<Interaction>,
    query_count: usize,
    close_at: Option<Instant>,
    closed: bool,
    crashed: bool,
}

pub struct FakeDriver {
    state: Mutex<FakeState>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Register a page for `url`. Several pages for the same URL are served
    /// in order; the last one keeps being served.
    pub fn add_page(&self, url: &str, page: FakePage) {
        self.state()
            .pages
            .entry(url.to_string())
            .or_default()
            .push_back(page);
    }

    /// Replace the loaded page once `delay` has passed.
    pub fn schedule_page(&self, delay: Duration, page: FakePage) {
        self.state().scheduled.push((Instant::now() + delay, page));
    }

    /// Clicking an element matching `selector` loads `html` into `frame`.
    pub fn on_click_load_frame(&self, selector: &str, frame: &str, html: impl Into<String>) {
        self.state().reactions.push(Reaction {
            selector: selector.to_string(),
            frame: frame.to_string(),
            html: html.into(),
        });
    }

    /// Answer `execute` calls whose script contains `needle`.
    pub fn respond_to_script(&self, needle: &str, value: Value) {
        self.state()
            .script_responses
            .push((needle.to_string(), value));
    }

    /// The session dies on its own once `delay` has passed.
    pub fn close_after(&self, delay: Duration) {
        self.state().close_at = Some(Instant::now() + delay);
    }

    /// The browser process dies: calls fail with a transport error.
    pub fn crash(&self) {
        self.state().crashed = true;
    }

    pub fn fail_next_interactable_check(&self, err: BrowserError) {
        self.state().interactable_failures.push_back(err);
    }

    pub fn query_count(&self) -> usize {
        self.state().query_count
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.state().interactions.clone()
    }

    pub fn current_url(&self) -> Option<String> {
        self.state().url.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock, apply everything that is due, and fail if the session is gone.
    fn live_state(&self) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.tick(Instant::now());
        state.ensure_alive()?;
        Ok(state)
    }
}

impl FakeState {
    fn ensure_alive(&self) -> Result<()> {
        if self.crashed {
            return Err(BrowserError::ChromeError(
                "connection to the browser was lost".to_string(),
            ));
        }
        if self.closed {
            return Err(BrowserError::SessionClosed);
        }
        Ok(())
    }

    fn tick(&mut self, now: Instant) {
        if self.close_at.is_some_and(|at| now >= at) {
            self.closed = true;
        }

        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|(at, _)| now >= *at);
        self.scheduled = pending;
        if let Some((_, page)) = due.into_iter().last() {
            self.load(page);
        }
    }

    fn load(&mut self, page: FakePage) {
        self.current = Some(page);
        self.handles.clear();
        self.document += 1;
        self.next_handle = 0;
        for generation in self.generations.values_mut() {
            *generation += 1;
        }
    }

    fn generation(&self, doc: &DocKey) -> u64 {
        self.generations.get(doc).copied().unwrap_or(0)
    }

    fn source(&self, doc: &DocKey) -> Option<&str> {
        let page = self.current.as_ref()?;
        match doc {
            DocKey::Top => Some(page.top.as_str()),
            DocKey::Shadow(host) => page.shadows.get(host).map(String::as_str),
            DocKey::Frame(name) => page.frames.get(name).map(String::as_str),
        }
    }

    fn register(&mut self, doc: DocKey, index: usize) -> String {
        let generation = self.generation(&doc);
        if let Some((id, _)) = self.handles.iter().find(|(_, record)| {
            record.doc == doc && record.index == index && record.generation == generation
        }) {
            return id.clone();
        }

        self.next_handle += 1;
        let id = format!("fake-{}-{}", self.document, self.next_handle);
        self.handles.insert(
            id.clone(),
            HandleRecord {
                doc,
                index,
                generation,
            },
        );
        id
    }

    /// Live record and source for a handle id.
    fn resolve(&self, id: &str) -> Option<(HandleRecord, String)> {
        let record = self.handles.get(id)?;
        if record.generation != self.generation(&record.doc) {
            return None;
        }
        let source = self.source(&record.doc)?.to_string();
        Some((record.clone(), source))
    }

    fn with_element<R>(&self, id: &str, f: impl FnOnce(ElementRef<'_>) -> R) -> Result<R> {
        let (record, source) = self
            .resolve(id)
            .ok_or_else(|| BrowserError::StaleElement(id.to_string()))?;
        let html = Html::parse_document(&source);
        let element = nth_element(&html, record.index)
            .ok_or_else(|| BrowserError::StaleElement(id.to_string()))?;
        Ok(f(element))
    }

    /// Document a context resolves to. Every frame on the path must be live.
    fn document_of(&self, context: &TraversalContext) -> Result<DocKey> {
        let mut doc = DocKey::Top;
        for frame_id in context.frames() {
            let name = self
                .with_element(frame_id, |frame| frame_name(&frame))
                .map_err(|_| {
                    BrowserError::ContextInvalid(format!("frame {} is no longer attached", frame_id))
                })?
                .ok_or_else(|| {
                    BrowserError::ContextInvalid(format!("frame {} has no name", frame_id))
                })?;
            doc = DocKey::Frame(name);
            if self.source(&doc).is_none() {
                return Err(BrowserError::ContextInvalid(format!(
                    "frame {} has no document",
                    frame_id
                )));
            }
        }
        Ok(doc)
    }

    fn find(&self, doc: DocKey, locator: &Locator) -> Result<Option<usize>> {
        let Some(source) = self.source(&doc) else {
            return Ok(None);
        };
        let html = Html::parse_document(source);
        let text_matches = |element: &ElementRef<'_>| match &locator.contains {
            Some(text) => text_of(element).contains(text.as_str()),
            None => true,
        };

        let found = match locator.strategy {
            Strategy::Css => {
                let selector = parse_selector(&locator.selector)?;
                html.select(&selector)
                    .find(|element| text_matches(element))
                    .and_then(|element| index_of(&html, &element))
            }
            Strategy::Id => all_elements(&html).position(|element| {
                element.value().attr("id") == Some(locator.selector.as_str())
                    && text_matches(&element)
            }),
            Strategy::TagPrefix => {
                let prefix = locator.selector.to_ascii_lowercase();
                all_elements(&html).position(|element| {
                    element.value().name().starts_with(&prefix) && text_matches(&element)
                })
            }
            Strategy::XPath => {
                return Err(BrowserError::UnsupportedLocator(
                    "the fake driver does not evaluate XPath".to_string(),
                ))
            }
        };
        Ok(found)
    }

    fn record(&mut self, interaction: Interaction) {
        self.interactions.push(interaction);
    }

    /// Run click reactions for the element behind `id`.
    fn react_to_click(&mut self, id: &str) -> Result<()> {
        let mut hits = Vec::new();
        for reaction in &self.reactions {
            let selector = parse_selector(&reaction.selector)?;
            if self.with_element(id, |element| selector.matches(&element))? {
                hits.push(reaction.clone());
            }
        }

        for reaction in hits {
            if let Some(page) = self.current.as_mut() {
                page.frames.insert(reaction.frame.clone(), reaction.html);
            }
            *self
                .generations
                .entry(DocKey::Frame(reaction.frame))
                .or_default() += 1;
        }
        Ok(())
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| BrowserError::InvalidSelector(format!("{}: {:?}", selector, e)))
}

fn all_elements(html: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    html.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
}

fn nth_element(html: &Html, index: usize) -> Option<ElementRef<'_>> {
    all_elements(html).nth(index)
}

fn index_of(html: &Html, element: &ElementRef<'_>) -> Option<usize> {
    all_elements(html).position(|candidate| candidate.id() == element.id())
}

fn text_of(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn frame_name(element: &ElementRef<'_>) -> Option<String> {
    let tag = element.value().name();
    if tag != "iframe" && tag != "frame" {
        return None;
    }
    element
        .value()
        .attr("name")
        .or_else(|| element.value().attr("id"))
        .map(str::to_string)
}

fn describe(element: &ElementRef<'_>) -> String {
    let value = element.value();
    let tag = value.name();
    if let Some(id) = value.attr("id") {
        return format!("{}#{}", tag, id);
    }
    let classes: Vec<&str> = value
        .attr("class")
        .map(|class| class.split_whitespace().collect())
        .unwrap_or_default();
    if classes.is_empty() {
        tag.to_string()
    } else {
        format!("{}.{}", tag, classes.join("."))
    }
}

fn interactable(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    let style = value
        .attr("style")
        .unwrap_or("")
        .replace(' ', "")
        .to_ascii_lowercase();
    value.attr("disabled").is_none()
        && value.attr("hidden").is_none()
        && !style.contains("display:none")
        && !style.contains("visibility:hidden")
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.live_state()?;
        state.record(Interaction::Navigate(url.to_string()));
        let page = {
            let queue = state.pages.get_mut(url).ok_or_else(|| {
                BrowserError::NavigationFailed(format!("no page registered for {}", url))
            })?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };
        let page = page
            .ok_or_else(|| BrowserError::NavigationFailed(format!("no page left for {}", url)))?;
        state.url = Some(url.to_string());
        state.load(page);
        Ok(())
    }

    async fn query(
        &self,
        context: &TraversalContext,
        locator: &Locator,
    ) -> Result<Option<ElementHandle>> {
        let mut state = self.state();
        state.query_count += 1;
        state.tick(Instant::now());
        state.ensure_alive()?;

        let doc = state.document_of(context)?;
        let Some(index) = state.find(doc.clone(), locator)? else {
            return Ok(None);
        };
        let id = state.register(doc, index);
        Ok(Some(ElementHandle::new(id, context.clone())))
    }

    async fn query_shadow(
        &self,
        host: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>> {
        let mut state = self.live_state()?;
        let tag = state.with_element(&host.id, |element| element.value().name().to_string())?;
        let doc = DocKey::Shadow(tag);
        let Some(index) = state.find(doc.clone(), &Locator::css(selector))? else {
            return Ok(None);
        };
        let id = state.register(doc, index);
        Ok(Some(ElementHandle::new(id, host.context.clone())))
    }

    async fn is_interactable(&self, element: &ElementHandle) -> Result<bool> {
        let mut state = self.live_state()?;
        if let Some(err) = state.interactable_failures.pop_front() {
            return Err(err);
        }
        state.with_element(&element.id, |element| interactable(&element))
    }

    async fn switch_context(&self, frame: &ElementHandle) -> Result<TraversalContext> {
        let state = self.live_state()?;
        state.document_of(&frame.context)?;
        let name = state
            .with_element(&frame.id, |element| frame_name(&element))
            .map_err(|_| {
                BrowserError::ContextInvalid(format!("frame {} is no longer attached", frame.id))
            })?
            .ok_or_else(|| {
                BrowserError::ContextInvalid(format!("element {} is not a frame", frame.id))
            })?;
        if state.source(&DocKey::Frame(name.clone())).is_none() {
            return Err(BrowserError::ContextInvalid(format!(
                "frame {} has no document",
                name
            )));
        }
        Ok(frame.context.child(frame.id.clone()))
    }

    async fn execute(
        &self,
        context: &TraversalContext,
        script: &str,
        _args: Vec<Value>,
    ) -> Result<Value> {
        let state = self.live_state()?;
        state.document_of(context)?;
        if let Some((_, value)) = state
            .script_responses
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
        {
            return Ok(value.clone());
        }
        if script.contains("readyState") {
            return Ok(Value::String("complete".to_string()));
        }
        Ok(Value::Null)
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let mut state = self.live_state()?;
        let target = state.with_element(&element.id, |element| describe(&element))?;
        state.record(Interaction::Click(target));
        state.react_to_click(&element.id)
    }

    async fn double_click(&self, element: &ElementHandle) -> Result<()> {
        let mut state = self.live_state()?;
        let target = state.with_element(&element.id, |element| describe(&element))?;
        state.record(Interaction::DoubleClick(target));
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<()> {
        let mut state = self.live_state()?;
        let target = state.with_element(&element.id, |element| describe(&element))?;
        state.record(Interaction::SendKeys {
            target,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String> {
        let state = self.live_state()?;
        state.with_element(&element.id, |element| text_of(&element))
    }

    async fn select_option(
        &self,
        element: &ElementHandle,
        choice: &OptionChoice,
    ) -> Result<bool> {
        let mut state = self.live_state()?;
        let option_selector = parse_selector("option")?;
        let picked = state.with_element(&element.id, |element| {
            if element.value().name() != "select" {
                return Err(BrowserError::JavaScriptFailed(format!(
                    "{} is not a <select>",
                    describe(&element)
                )));
            }
            let mut options = element.select(&option_selector);
            let option = match choice {
                OptionChoice::VisibleText(label) => {
                    options.find(|option| text_of(option) == label.trim())
                }
                OptionChoice::Index(index) => options.nth(*index),
            };
            Ok(option.map(|option| (describe(&element), text_of(&option))))
        })??;

        match picked {
            Some((target, option)) => {
                state.record(Interaction::Select { target, option });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.live_state()?;
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    fn capabilities(&self) -> BrowserCapabilities {
        BrowserCapabilities {
            supports_shadow_dom: true,
            supports_frames: true,
            supports_screenshots: true,
            supports_xpath: false,
        }
    }

    fn is_running(&self) -> bool {
        let state = self.state();
        !state.closed && !state.crashed
    }

    async fn close(&self) -> Result<()> {
        self.state().closed = true;
        Ok(())
    }
}

pub const MACROPONENT: &str = "macroponent-f51912f4c700201072b211d4d8c26010";

pub struct TestHelper;

impl TestHelper {
    /// Config with no settle delays, for paused-clock tests.
    pub fn config() -> Config {
        let mut config = Config::default();
        config.session.settle_ms = 0;
        config.session.iteration_pause_ms = 0;
        config.session.navigation_timeout_ms = 1_000;
        config
    }

    pub fn session(driver: Arc<FakeDriver>) -> BrowserSession<FakeDriver> {
        BrowserSession::with_driver(driver, &Self::config())
    }

    /// ServiceNow shell: a macroponent host whose shadow root holds the
    /// `gsft_main` iframe.
    pub fn shell(frame_html: impl Into<String>) -> FakePage {
        FakePage::new(format!(
            "<html><body><{0}></{0}></body></html>",
            MACROPONENT
        ))
        .with_shadow(
            MACROPONENT,
            r#"<div class="shell"><iframe id="gsft_main" name="gsft_main" title="Main Content"></iframe></div>"#,
        )
        .with_frame("gsft_main", frame_html)
    }

    /// Incident list where every row belongs to "Group A".
    pub fn list_page(numbers: &[&str]) -> FakePage {
        let rows: Vec<(&str, &str)> = numbers.iter().map(|number| (*number, "Group A")).collect();
        Self::list_page_with_groups(&rows)
    }

    /// Incident list rows as (number, assignment group). Column 10 holds the
    /// group and column 11 the assignee, as in the default list view.
    pub fn list_page_with_groups(rows: &[(&str, &str)]) -> FakePage {
        let body: String = rows
            .iter()
            .enumerate()
            .map(|(i, (number, group))| {
                format!(
                    r#"<tr id="row_incident_{i}">
                        <td><input type="checkbox"></td>
                        <td><button class="list_popup">i</button></td>
                        <td><a class="linked formlink" href="incident.do?sys_id={i}">{number}</a></td>
                        <td>1 - High</td><td>Open</td><td>Network</td><td>Caller {i}</td>
                        <td>Short description {i}</td><td>2024-01-0{d} 10:00:00</td>
                        <td class="vt">{group}</td>
                        <td class="vt"></td>
                    </tr>"#,
                    i = i,
                    d = i + 1,
                    number = number,
                    group = group
                )
            })
            .collect();

        Self::shell(format!(
            r#"<html><body>
                <table id="incident_table"><tbody>{}</tbody></table>
                <input id="sys_display.LIST_EDIT_incident.assigned_to" type="text">
                <a id="cell_edit_ok" class="btn">OK</a>
            </body></html>"#,
            body
        ))
    }

    pub fn empty_list_page() -> FakePage {
        Self::shell(
            r#"<html><body><table id="incident_table"><tbody>
                <tr class="list2_no_records"><td>No records to display</td></tr>
            </tbody></table></body></html>"#,
        )
    }

    /// Incident form as it loads into `gsft_main`.
    pub fn incident_form(number: &str) -> String {
        format!(
            r#"<html><body>
                <h2>{number}</h2>
                <select id="incident.state">
                    <option value="1">New</option>
                    <option value="2">In Progress</option>
                    <option value="3">On Hold</option>
                    <option value="6">Resolved</option>
                </select>
                <span class="tab_header"><span class="tabs2_tab">Notes</span></span>
                <span class="tab_header"><span class="tabs2_tab">Resolution Information</span></span>
                <select id="incident.close_code">
                    <option value="">-- None --</option>
                    <option value="Solution provided">Solution provided</option>
                    <option value="Workaround provided">Workaround provided</option>
                </select>
                <textarea id="incident.close_notes"></textarea>
                <textarea id="activity-stream-work_notes-textarea"></textarea>
                <button class="btn btn-default activity-submit">Post</button>
                <button id="sysverb_update" type="submit">Update</button>
            </body></html>"#,
            number = number
        )
    }

    /// Tag (label) form as it loads into `gsft_main`.
    pub fn tag_form(name: &str) -> String {
        format!(
            r#"<html><body>
                <h2>{name}</h2>
                <select id="label.viewable_by">
                    <option value="me">Me</option>
                    <option value="groups_users">Groups and Users</option>
                    <option value="everyone">Everyone</option>
                </select>
                <input id="sys_display.label.group_list" type="text">
                <input id="sys_display.label.user_list" type="text">
                <button id="sysverb_update" type="submit">Update</button>
            </body></html>"#,
            name = name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_for_a_url_are_served_in_order() {
        let driver = FakeDriver::new();
        driver.add_page("https://acme.test/", FakePage::new("<p id='a'>first</p>"));
        driver.add_page("https://acme.test/", FakePage::new("<p id='b'>second</p>"));

        driver.navigate("https://acme.test/").await.unwrap();
        let first = driver
            .query(&TraversalContext::top(), &Locator::id("a"))
            .await
            .unwrap();
        driver.navigate("https://acme.test/").await.unwrap();
        driver.navigate("https://acme.test/").await.unwrap();
        let second = driver
            .query(&TraversalContext::top(), &Locator::id("b"))
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(driver.current_url().as_deref(), Some("https://acme.test/"));
    }

    #[tokio::test]
    async fn unknown_url_fails_navigation() {
        let driver = FakeDriver::new();
        let err = driver.navigate("https://acme.test/missing").await.unwrap_err();
        assert!(matches!(err, BrowserError::NavigationFailed(_)));
    }

    #[tokio::test]
    async fn handles_go_stale_after_navigation() {
        let driver = FakeDriver::new();
        driver.add_page("https://acme.test/", FakePage::new("<button id='go'>Go</button>"));
        driver.navigate("https://acme.test/").await.unwrap();
        let button = driver
            .query(&TraversalContext::top(), &Locator::id("go"))
            .await
            .unwrap()
            .unwrap();

        driver.navigate("https://acme.test/").await.unwrap();
        let reloaded = driver
            .query(&TraversalContext::top(), &Locator::id("go"))
            .await
            .unwrap()
            .unwrap();

        assert_ne!(reloaded, button);
        let err = driver.click(&button).await.unwrap_err();
        assert!(err.is_transient());
        tokio_test::assert_ok!(driver.click(&reloaded).await);
    }

    #[tokio::test]
    async fn interactions_name_classes_in_document_order() {
        let driver = FakeDriver::new();
        driver.add_page(
            "https://acme.test/",
            FakePage::new("<button class='btn btn-default activity-submit'>Post</button>"),
        );
        driver.navigate("https://acme.test/").await.unwrap();
        let button = driver
            .query(&TraversalContext::top(), &Locator::css("button"))
            .await
            .unwrap()
            .unwrap();

        driver.click(&button).await.unwrap();

        assert_eq!(
            driver.interactions().last(),
            Some(&Interaction::Click("button.btn.btn-default.activity-submit".into()))
        );
    }

    #[tokio::test]
    async fn click_reaction_loads_new_frame_document() {
        let driver = FakeDriver::new();
        driver.add_page("https://acme.test/list", TestHelper::list_page(&["INC1"]));
        driver.on_click_load_frame("a.linked.formlink", "gsft_main", TestHelper::incident_form("INC1"));
        driver.navigate("https://acme.test/list").await.unwrap();

        let host = driver
            .query(&TraversalContext::top(), &Locator::tag_prefix("macroponent"))
            .await
            .unwrap()
            .unwrap();
        let frame = driver.query_shadow(&host, "iframe").await.unwrap().unwrap();
        let context = driver.switch_context(&frame).await.unwrap();
        let link = driver
            .query(&context, &Locator::css("a.linked.formlink"))
            .await
            .unwrap()
            .unwrap();

        driver.click(&link).await.unwrap();

        // same frame context, new document behind it
        let state = driver
            .query(&context, &Locator::id("incident.state"))
            .await
            .unwrap();
        assert!(state.is_some());
        assert!(driver.text(&link).await.unwrap_err().is_transient());
        assert_eq!(
            driver.interactions().last(),
            Some(&Interaction::Click("a.linked.formlink".to_string()))
        );
    }

    #[tokio::test]
    async fn select_option_by_text_and_index() {
        let driver = FakeDriver::new();
        driver.add_page(
            "https://acme.test/form",
            FakePage::new(TestHelper::incident_form("INC1")),
        );
        driver.navigate("https://acme.test/form").await.unwrap();
        let select = driver
            .query(&TraversalContext::top(), &Locator::id("incident.state"))
            .await
            .unwrap()
            .unwrap();

        assert!(driver
            .select_option(&select, &OptionChoice::VisibleText("Resolved".into()))
            .await
            .unwrap());
        assert!(driver
            .select_option(&select, &OptionChoice::Index(1))
            .await
            .unwrap());
        assert!(!driver
            .select_option(&select, &OptionChoice::VisibleText("Closed".into()))
            .await
            .unwrap());

        assert_eq!(
            driver.interactions()[1..],
            [
                Interaction::Select {
                    target: "select#incident.state".into(),
                    option: "Resolved".into()
                },
                Interaction::Select {
                    target: "select#incident.state".into(),
                    option: "In Progress".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn xpath_is_reported_as_unsupported() {
        let driver = FakeDriver::new();
        driver.add_page("https://acme.test/", FakePage::new("<p></p>"));
        driver.navigate("https://acme.test/").await.unwrap();

        let err = driver
            .query(&TraversalContext::top(), &Locator::xpath("//p"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::UnsupportedLocator(_)));
        assert!(!driver.capabilities().supports_xpath);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let driver = FakeDriver::new();
        tokio_test::assert_ok!(driver.close().await);
        tokio_test::assert_ok!(driver.close().await);
        assert!(!driver.is_running());
        tokio_test::assert_err!(driver.navigate("https://acme.test/").await);
    }
}
