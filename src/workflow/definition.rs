use crate::core::BrowserCapabilities;
use crate::errors::{BrowserError, Result};
use crate::types::{Locator, Strategy};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::loader::substitute;
use super::step::{MissingPolicy, Step, StepAction, TextSource};

/// A list-driven workflow: open the list, reach its frame, run the steps,
/// repeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Page the setup steps run on, once, before the first iteration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<Step>,
    pub list_url: String,
    /// Shadow host and the frame inside it. Without it the steps run on the
    /// top document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<FramePath>,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    /// Falls back to `session.max_reloads`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reloads: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePath {
    pub host: Locator,
    /// CSS selector of the frame inside the host's shadow root.
    pub inner: String,
}

impl FramePath {
    pub fn servicenow() -> Self {
        Self {
            host: Locator::tag_prefix("macroponent"),
            inner: "iframe".to_string(),
        }
    }
}

impl Workflow {
    /// Check the definition before a browser is touched.
    pub fn validate(&self, capabilities: &BrowserCapabilities) -> Result<()> {
        let invalid = |message: String| {
            Err(BrowserError::ConfigurationError(format!(
                "workflow '{}': {}",
                self.name, message
            )))
        };

        if self.steps.is_empty() {
            return invalid("has no steps".to_string());
        }
        if !self.setup.is_empty() && self.start_url.is_none() {
            return invalid("setup steps need a start_url".to_string());
        }
        for url in self.start_url.iter().chain(std::iter::once(&self.list_url)) {
            if let Err(e) = url::Url::parse(url) {
                return invalid(format!("invalid URL '{}': {}", url, e));
            }
        }

        if let Some(frame) = &self.frame {
            if !capabilities.supports_shadow_dom || !capabilities.supports_frames {
                return invalid("the browser cannot traverse shadow roots and frames".to_string());
            }
            if frame.inner.trim().is_empty() {
                return invalid("frame.inner is empty".to_string());
            }
            self.check_locator(&frame.host, capabilities)?;
        }

        if let Some(step) = self
            .setup
            .iter()
            .find(|step| step.on_missing == MissingPolicy::Reload)
        {
            return invalid(format!("setup step '{}' cannot reload", step.name));
        }

        // variables are cleared before setup and before every iteration
        for steps in [&self.setup, &self.steps] {
            let mut known = HashSet::new();
            for step in steps {
                self.check_locator(&step.locator, capabilities)?;
                if let Some(variable) = step.action.uses() {
                    if !known.contains(variable) {
                        return invalid(format!(
                            "step '{}' uses '{}' before any step reads it",
                            step.name, variable
                        ));
                    }
                }
                if let StepAction::ReadText { into } = &step.action {
                    known.insert(into.as_str());
                }
            }
        }

        Ok(())
    }

    fn check_locator(&self, locator: &Locator, capabilities: &BrowserCapabilities) -> Result<()> {
        if locator.strategy == Strategy::XPath && !capabilities.supports_xpath {
            return Err(BrowserError::UnsupportedLocator(format!(
                "workflow '{}': {} needs XPath support",
                self.name, locator
            )));
        }
        if locator.selector.trim().is_empty() {
            return Err(BrowserError::ConfigurationError(format!(
                "workflow '{}': empty selector",
                self.name
            )));
        }
        Ok(())
    }

    /// Replace `${name}` placeholders in URLs and literal text.
    pub fn substitute(&self, vars: &HashMap<String, String>) -> Result<Workflow> {
        let mut workflow = self.clone();

        workflow.list_url = substitute(&workflow.list_url, vars)?;
        if let Some(url) = &workflow.start_url {
            workflow.start_url = Some(substitute(url, vars)?);
        }
        for step in workflow.setup.iter_mut().chain(workflow.steps.iter_mut()) {
            if let StepAction::TypeText {
                text: TextSource::Literal(text),
            } = &mut step.action
            {
                *text = substitute(text, vars)?;
            }
        }

        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Condition;

    fn caps(xpath: bool) -> BrowserCapabilities {
        BrowserCapabilities {
            supports_shadow_dom: true,
            supports_frames: true,
            supports_screenshots: true,
            supports_xpath: xpath,
        }
    }

    fn workflow(steps: Vec<Step>) -> Workflow {
        Workflow {
            name: "test".into(),
            description: None,
            start_url: None,
            setup: vec![],
            list_url: "https://acme.test/list".into(),
            frame: Some(FramePath::servicenow()),
            steps,
            max_iterations: None,
            max_reloads: None,
        }
    }

    #[test]
    fn xpath_steps_need_xpath_support() {
        let wf = workflow(vec![Step::new(
            "pick",
            Locator::xpath("//select[@id='label.viewable_by']/option[2]"),
            StepAction::Click,
        )]);

        assert!(matches!(
            wf.validate(&caps(false)),
            Err(BrowserError::UnsupportedLocator(_))
        ));
        assert!(wf.validate(&caps(true)).is_ok());
    }

    #[test]
    fn variables_must_be_read_first() {
        let typed = Step::new(
            "type",
            Locator::css("input"),
            StepAction::TypeText {
                text: TextSource::Variable {
                    variable: "group".into(),
                },
            },
        );
        let read = Step::new(
            "read",
            Locator::css("td"),
            StepAction::ReadText {
                into: "group".into(),
            },
        );

        let err = workflow(vec![typed.clone(), read.clone()])
            .validate(&caps(false))
            .unwrap_err();
        assert!(err.to_string().contains("before any step reads it"));
        assert!(workflow(vec![read, typed]).validate(&caps(false)).is_ok());
    }

    #[test]
    fn structural_problems_are_rejected() {
        assert!(workflow(vec![]).validate(&caps(true)).is_err());

        let mut wf = workflow(vec![Step::new("a", Locator::css("a"), StepAction::Click)]);
        wf.list_url = "not a url".into();
        assert!(wf.validate(&caps(true)).is_err());

        let mut wf = workflow(vec![Step::new("a", Locator::css("a"), StepAction::Click)]);
        wf.setup = vec![Step::new("login", Locator::css("b"), StepAction::Click)];
        assert!(wf.validate(&caps(true)).is_err());
        wf.start_url = Some("https://acme.test/login.do".into());
        assert!(wf.validate(&caps(true)).is_ok());
        wf.setup[0].on_missing = MissingPolicy::Reload;
        assert!(wf.validate(&caps(true)).is_err());
    }

    #[test]
    fn substitution_covers_urls_and_literal_text() {
        let mut wf = workflow(vec![Step::new(
            "note",
            Locator::id("activity-stream-work_notes-textarea"),
            StepAction::TypeText {
                text: TextSource::literal("ping ${who}"),
            },
        )
        .when(Condition::Interactable)]);
        wf.list_url = "${instance}incident_list.do".into();

        let vars: HashMap<String, String> = [
            ("instance".to_string(), "https://acme.test/".to_string()),
            ("who".to_string(), "team".to_string()),
        ]
        .into();
        let resolved = wf.substitute(&vars).unwrap();

        assert_eq!(resolved.list_url, "https://acme.test/incident_list.do");
        assert_eq!(
            resolved.steps[0].action,
            StepAction::TypeText {
                text: TextSource::literal("ping team")
            }
        );
        assert!(wf.substitute(&HashMap::new()).is_err());
    }
}
