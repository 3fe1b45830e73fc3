use crate::errors::{BrowserError, Result};
use crate::types::{Condition, Locator, OptionChoice};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// One locate-then-act unit of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub locator: Locator,
    /// Falls back to `presence` in the loop and `interactable` in setup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub action: StepAction,
    #[serde(default)]
    pub on_missing: MissingPolicy,
    /// Overrides the session settle delay after this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_ms: Option<u64>,
}

impl Step {
    pub fn new(name: impl Into<String>, locator: Locator, action: StepAction) -> Self {
        Self {
            name: name.into(),
            locator,
            condition: None,
            timeout_ms: None,
            action,
            on_missing: MissingPolicy::default(),
            settle_ms: None,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn on_missing(mut self, policy: MissingPolicy) -> Self {
        self.on_missing = policy;
        self
    }

    pub fn settle(mut self, settle_ms: u64) -> Self {
        self.settle_ms = Some(settle_ms);
        self
    }

    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    Click,
    DoubleClick,
    TypeText { text: TextSource },
    SelectOption { choice: OptionChoice },
    /// Store the element's text in a variable for later steps.
    ReadText { into: String },
}

impl StepAction {
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::Click => "click",
            StepAction::DoubleClick => "double_click",
            StepAction::TypeText { .. } => "type_text",
            StepAction::SelectOption { .. } => "select_option",
            StepAction::ReadText { .. } => "read_text",
        }
    }

    /// Variables this action reads.
    pub fn uses(&self) -> Option<&str> {
        match self {
            StepAction::TypeText { text } => text.variable(),
            _ => None,
        }
    }
}

/// Where typed text comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextSource {
    Literal(String),
    Variable { variable: String },
    Mapped { mapped: MappedText },
}

/// Look a variable up in a table, e.g. assignment group -> assignee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedText {
    pub from: String,
    pub table: BTreeMap<String, String>,
    pub default: String,
}

impl TextSource {
    pub fn literal(text: impl Into<String>) -> Self {
        TextSource::Literal(text.into())
    }

    pub fn variable(&self) -> Option<&str> {
        match self {
            TextSource::Literal(_) => None,
            TextSource::Variable { variable } => Some(variable),
            TextSource::Mapped { mapped } => Some(&mapped.from),
        }
    }

    pub fn resolve(&self, variables: &HashMap<String, String>) -> Result<String> {
        let lookup = |name: &str| {
            variables.get(name).ok_or_else(|| {
                BrowserError::ConfigurationError(format!("variable '{}' has not been read", name))
            })
        };

        match self {
            TextSource::Literal(text) => Ok(text.clone()),
            TextSource::Variable { variable } => lookup(variable).cloned(),
            TextSource::Mapped { mapped } => {
                let key = lookup(&mapped.from)?;
                Ok(mapped
                    .table
                    .get(key.trim())
                    .unwrap_or(&mapped.default)
                    .clone())
            }
        }
    }
}

/// What a step does when its element never shows up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Stop the run as `Aborted`.
    #[default]
    Abort,
    /// The work queue is empty; stop the run as `Done`.
    Finish,
    /// Start the iteration over from the list page.
    Reload,
    Skip,
}

/// Outcome of a performed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub execution_time_ms: u64,
}

impl StepResult {
    pub fn success(step: &str, message: String) -> Self {
        Self {
            step: step.to_string(),
            success: true,
            message,
            data: None,
            execution_time_ms: 0,
        }
    }

    pub fn success_with_data(step: &str, message: String, data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::success(step, message)
        }
    }

    /// The element was missing, or had nothing to act on.
    pub fn missing(step: &str, message: String) -> Self {
        Self {
            step: step.to_string(),
            success: false,
            message,
            data: None,
            execution_time_ms: 0,
        }
    }

    pub fn with_execution_time(mut self, time_ms: u64) -> Self {
        self.execution_time_ms = time_ms;
        self
    }
}
