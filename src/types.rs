use serde::{Deserialize, Serialize};
use std::fmt;

/// How a selector string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Css,
    #[serde(rename = "xpath")]
    XPath,
    Id,
    /// First element whose tag name starts with the selector
    /// (ServiceNow renders its shell as `macroponent-<hash>`).
    TagPrefix,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Css => "css",
            Strategy::XPath => "xpath",
            Strategy::Id => "id",
            Strategy::TagPrefix => "tag_prefix",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub strategy: Strategy,
    pub selector: String,
    /// Keep only candidates whose rendered text contains this string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
}

impl Locator {
    pub fn new(strategy: Strategy, selector: impl Into<String>) -> Self {
        Self {
            strategy,
            selector: selector.into(),
            contains: None,
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Css, selector)
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, selector)
    }

    pub fn id(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Id, selector)
    }

    pub fn tag_prefix(prefix: impl Into<String>) -> Self {
        Self::new(Strategy::TagPrefix, prefix)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.contains = Some(text.into());
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy.as_str(), self.selector)?;
        if let Some(text) = &self.contains {
            write!(f, " containing {:?}", text)?;
        }
        Ok(())
    }
}

/// What must hold for a located element before `locate` returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Presence,
    Interactable,
}

/// The document scope queries resolve against: the top-level document, or
/// the content document of the last frame in `frames`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TraversalContext {
    frames: Vec<String>,
}

impl TraversalContext {
    pub fn top() -> Self {
        Self::default()
    }

    pub fn is_top(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Handle ids of the frame elements entered, outermost first.
    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    pub fn current_frame(&self) -> Option<&str> {
        self.frames.last().map(String::as_str)
    }

    pub fn child(&self, frame_id: impl Into<String>) -> Self {
        let mut frames = self.frames.clone();
        frames.push(frame_id.into());
        Self { frames }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.frames.is_empty() {
            return None;
        }
        let mut frames = self.frames.clone();
        frames.pop();
        Some(Self { frames })
    }
}

impl fmt::Display for TraversalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            write!(f, "top")
        } else {
            write!(f, "top/{}", self.frames.join("/"))
        }
    }
}

/// A live element, bound to the context it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub id: String,
    pub context: TraversalContext,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>, context: TraversalContext) -> Self {
        Self {
            id: id.into(),
            context,
        }
    }
}

/// Result of a single poll attempt.
#[derive(Debug)]
pub enum PollOutcome {
    Found(ElementHandle),
    /// `matched` is true when an element matched the locator but failed the
    /// condition.
    NotFound { matched: bool },
    TransientError(crate::errors::BrowserError),
}

/// Result of a complete `locate`. Absence is a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateOutcome {
    Found(ElementHandle),
    NotFound,
    /// An element matched but never satisfied the condition in time.
    ConditionTimeout,
}

impl LocateOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, LocateOutcome::Found(_))
    }

    pub fn found(self) -> Option<ElementHandle> {
        match self {
            LocateOutcome::Found(element) => Some(element),
            LocateOutcome::NotFound | LocateOutcome::ConditionTimeout => None,
        }
    }
}

/// Which `<option>` of a `<select>` to pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionChoice {
    VisibleText(String),
    Index(usize),
}

impl fmt::Display for OptionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionChoice::VisibleText(text) => write!(f, "{:?}", text),
            OptionChoice::Index(index) => write!(f, "option #{}", index),
        }
    }
}
