//! The run loop: a finite state machine over one browser session.
//!
//! ```text
//! NavigatePage --navigated--> LocateHost --frame found--> EnterFrame --entered--> PerformStep(0)
//!      ^                        |   |                                                 |
//!      |    frame missing       |   +--host missing--> Aborted                        |
//!      +---(reloads remain)-----+                                                     |
//!      +------------------- last step done (iterations remain) <----------------------+
//! ```
//!
//! Every exit path closes the session.

use crate::browser::BrowserSession;
use crate::core::{BrowserDriver, Config, SessionConfig};
use crate::errors::{BrowserError, Result};
use crate::types::{Condition, ElementHandle, LocateOutcome};
use crate::utils::screenshot::ScreenshotManager;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::definition::Workflow;
use super::step::{MissingPolicy, Step, StepAction, StepResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    NavigatePage,
    LocateHost,
    EnterFrame,
    PerformStep(usize),
    Done,
    Aborted,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Aborted)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::NavigatePage => write!(f, "navigate_page"),
            WorkflowState::LocateHost => write!(f, "locate_host"),
            WorkflowState::EnterFrame => write!(f, "enter_frame"),
            WorkflowState::PerformStep(i) => write!(f, "perform_step({})", i),
            WorkflowState::Done => write!(f, "done"),
            WorkflowState::Aborted => write!(f, "aborted"),
        }
    }
}

/// What the work done in a state produced.
#[derive(Debug)]
enum Event {
    Navigated,
    HostMissing,
    FrameMissing,
    FrameFound(ElementHandle),
    Entered,
    StepDone,
    StepMissing(MissingPolicy),
    Fault(BrowserError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub workflow: String,
    /// Completed passes over the step list.
    pub iterations: u32,
    pub reloads: u32,
    pub final_state: WorkflowState,
    /// Where the run stopped, e.g. `locate_host` or `perform_step(2: type assignee)`.
    pub stage: String,
    pub reason: Option<String>,
    pub screenshot: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_done(&self) -> bool {
        self.final_state == WorkflowState::Done
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

pub struct WorkflowRunner<D: BrowserDriver> {
    session: BrowserSession<D>,
    workflow: Workflow,
    settings: SessionConfig,
    max_reloads: u32,
    variables: HashMap<String, String>,
    pending_frame: Option<ElementHandle>,
    iterations: u32,
    reloads: u32,
    consecutive_reloads: u32,
    stage: String,
    reason: Option<String>,
}

impl<D: BrowserDriver> WorkflowRunner<D> {
    /// Validate `workflow` against the driver before anything runs.
    pub fn new(session: BrowserSession<D>, workflow: Workflow, config: &Config) -> Result<Self> {
        workflow.validate(&session.driver().capabilities())?;
        let max_reloads = workflow.max_reloads.unwrap_or(config.session.max_reloads);

        Ok(Self {
            session,
            workflow,
            settings: config.session.clone(),
            max_reloads,
            variables: HashMap::new(),
            pending_frame: None,
            iterations: 0,
            reloads: 0,
            consecutive_reloads: 0,
            stage: WorkflowState::NavigatePage.to_string(),
            reason: None,
        })
    }

    /// Run to `Done` or `Aborted`. Failures end up in the report, and the
    /// session is closed either way.
    pub async fn run(mut self) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            "run {} of '{}' started (session {})",
            run_id,
            self.workflow.name,
            self.session.id()
        );

        let final_state = match self.run_setup().await {
            Some(state) => state,
            None => self.run_loop().await,
        };

        let screenshot = if final_state == WorkflowState::Aborted {
            self.capture(&run_id).await
        } else {
            None
        };

        if let Err(e) = self.session.close().await {
            warn!("closing the session failed: {}", e);
        }

        let report = RunReport {
            run_id,
            workflow: self.workflow.name.clone(),
            iterations: self.iterations,
            reloads: self.reloads,
            final_state,
            stage: self.stage.clone(),
            reason: self.reason.clone(),
            screenshot,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            "run {} finished {} at {} after {} iteration(s)",
            report.run_id, report.final_state, report.stage, report.iterations
        );
        report
    }

    async fn run_setup(&mut self) -> Option<WorkflowState> {
        let url = self.workflow.start_url.clone()?;
        info!("setup: opening {}", url);

        self.variables.clear();
        if let Err(e) = self.session.navigate(&url).await {
            return Some(self.stop(WorkflowState::Aborted, "setup".to_string(), e.to_string()));
        }

        for step in self.workflow.setup.clone() {
            let stage = format!("setup({})", step.name);
            match self.execute_step(&step, Condition::Interactable).await {
                Ok(result) if result.success => debug!("{}: {}", stage, result.message),
                Ok(result) => match step.on_missing {
                    MissingPolicy::Skip => warn!("{} skipped: {}", stage, result.message),
                    MissingPolicy::Finish => {
                        return Some(self.stop(WorkflowState::Done, stage, result.message))
                    }
                    MissingPolicy::Abort | MissingPolicy::Reload => {
                        return Some(self.stop(WorkflowState::Aborted, stage, result.message))
                    }
                },
                Err(e) => return Some(self.stop(WorkflowState::Aborted, stage, e.to_string())),
            }
        }

        None
    }

    async fn run_loop(&mut self) -> WorkflowState {
        let mut state = WorkflowState::NavigatePage;
        let mut pause = false;

        loop {
            let event = match state {
                WorkflowState::Done | WorkflowState::Aborted => return state,
                WorkflowState::NavigatePage => {
                    if let Some(max) = self.workflow.max_iterations {
                        if self.iterations >= max {
                            return self.stop(
                                WorkflowState::Done,
                                state.to_string(),
                                format!("reached {} iteration(s)", max),
                            );
                        }
                    }
                    if pause && self.settings.iteration_pause_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.settings.iteration_pause_ms))
                            .await;
                    }
                    self.navigate_list().await
                }
                WorkflowState::LocateHost => self.locate_frame().await,
                WorkflowState::EnterFrame => self.enter_frame().await,
                WorkflowState::PerformStep(index) => self.perform(index).await,
            };

            let next = self.transition(state, event);
            pause = matches!(state, WorkflowState::PerformStep(_))
                && next == WorkflowState::NavigatePage;
            state = next;
        }
    }

    /// The transition table.
    fn transition(&mut self, state: WorkflowState, event: Event) -> WorkflowState {
        use WorkflowState::*;

        match (state, event) {
            (_, Event::Fault(err)) => self.stop(Aborted, self.describe(state), err.to_string()),

            (NavigatePage, Event::Navigated) => {
                if self.workflow.frame.is_some() {
                    LocateHost
                } else {
                    PerformStep(0)
                }
            }

            (LocateHost, Event::HostMissing) => {
                self.stop(Aborted, self.describe(state), "shadow host not found".to_string())
            }
            (LocateHost, Event::FrameMissing) => self.reload(state, "iframe not found".to_string()),
            (LocateHost, Event::FrameFound(frame)) => {
                self.pending_frame = Some(frame);
                EnterFrame
            }

            (EnterFrame, Event::Entered) => PerformStep(0),

            (PerformStep(index), Event::StepDone) => self.advance(index),
            (PerformStep(index), Event::StepMissing(MissingPolicy::Skip)) => {
                warn!("step '{}' skipped: element not found", self.step_name(index));
                self.advance(index)
            }
            (PerformStep(index), Event::StepMissing(MissingPolicy::Finish)) => {
                let reason = format!("queue drained: '{}' not found", self.step_name(index));
                self.stop(Done, self.describe(state), reason)
            }
            (PerformStep(index), Event::StepMissing(MissingPolicy::Reload)) => {
                let reason = format!("'{}' not found", self.step_name(index));
                self.reload(state, reason)
            }
            (PerformStep(index), Event::StepMissing(MissingPolicy::Abort)) => {
                let reason = format!("'{}' not found", self.step_name(index));
                self.stop(Aborted, self.describe(state), reason)
            }

            (state, event) => self.stop(
                Aborted,
                self.describe(state),
                format!("unexpected {:?} in {}", event, state),
            ),
        }
    }

    fn advance(&mut self, index: usize) -> WorkflowState {
        if index + 1 < self.workflow.steps.len() {
            return WorkflowState::PerformStep(index + 1);
        }

        self.iterations += 1;
        self.consecutive_reloads = 0;
        info!("iteration {} of '{}' complete", self.iterations, self.workflow.name);

        match self.workflow.max_iterations {
            Some(max) if self.iterations >= max => self.stop(
                WorkflowState::Done,
                self.describe(WorkflowState::PerformStep(index)),
                format!("reached {} iteration(s)", max),
            ),
            _ => WorkflowState::NavigatePage,
        }
    }

    fn reload(&mut self, state: WorkflowState, reason: String) -> WorkflowState {
        if self.consecutive_reloads < self.max_reloads {
            self.consecutive_reloads += 1;
            self.reloads += 1;
            warn!(
                "{}; reloading ({}/{})",
                reason, self.consecutive_reloads, self.max_reloads
            );
            WorkflowState::NavigatePage
        } else {
            self.stop(
                WorkflowState::Aborted,
                self.describe(state),
                format!("{} (gave up after {} reload(s))", reason, self.max_reloads),
            )
        }
    }

    fn stop(&mut self, terminal: WorkflowState, stage: String, reason: String) -> WorkflowState {
        match terminal {
            WorkflowState::Aborted => error!("'{}' aborted at {}: {}", self.workflow.name, stage, reason),
            _ => info!("'{}' done at {}: {}", self.workflow.name, stage, reason),
        }
        self.stage = stage;
        self.reason = Some(reason);
        terminal
    }

    fn describe(&self, state: WorkflowState) -> String {
        match state {
            WorkflowState::PerformStep(index) => {
                format!("perform_step({}: {})", index, self.step_name(index))
            }
            other => other.to_string(),
        }
    }

    fn step_name(&self, index: usize) -> &str {
        self.workflow
            .steps
            .get(index)
            .map(|step| step.name.as_str())
            .unwrap_or("?")
    }

    async fn navigate_list(&mut self) -> Event {
        self.variables.clear();
        self.pending_frame = None;
        info!(
            "iteration {}: opening {}",
            self.iterations + 1,
            self.workflow.list_url
        );

        match self.session.navigate(&self.workflow.list_url).await {
            Ok(_) => Event::Navigated,
            Err(e) => Event::Fault(e),
        }
    }

    /// Host and frame share the host budget; absence of each is reported
    /// separately so a missing frame can trigger a reload.
    async fn locate_frame(&mut self) -> Event {
        let Some(frame) = self.workflow.frame.clone() else {
            return Event::Fault(BrowserError::ConfigurationError(
                "workflow has no frame path".to_string(),
            ));
        };
        let budget = self.session.locator_config().host_timeout();
        let started = Instant::now();

        let host = match self
            .session
            .locate(&frame.host, budget, Condition::Presence)
            .await
        {
            Ok(LocateOutcome::Found(host)) => host,
            Ok(_) => return Event::HostMissing,
            Err(e) => return Event::Fault(e),
        };
        debug!("shadow host {} found", frame.host);

        let remaining = budget.saturating_sub(started.elapsed());
        match self
            .session
            .locate_in_shadow(&host, &frame.inner, remaining)
            .await
        {
            Ok(LocateOutcome::Found(element)) => Event::FrameFound(element),
            Ok(_) => Event::FrameMissing,
            Err(e) => Event::Fault(e),
        }
    }

    async fn enter_frame(&mut self) -> Event {
        let Some(frame) = self.pending_frame.take() else {
            return Event::Fault(BrowserError::ContextInvalid(
                "no frame was located".to_string(),
            ));
        };
        match self.session.enter_frame(&frame).await {
            Ok(_) => Event::Entered,
            Err(e) => Event::Fault(e),
        }
    }

    async fn perform(&mut self, index: usize) -> Event {
        let Some(step) = self.workflow.steps.get(index).cloned() else {
            return Event::Fault(BrowserError::ConfigurationError(format!(
                "no step {}",
                index
            )));
        };

        match self.execute_step(&step, Condition::Presence).await {
            Ok(result) if result.success => {
                debug!(
                    "{} ({}ms): {}",
                    step.name, result.execution_time_ms, result.message
                );
                Event::StepDone
            }
            Ok(result) => {
                debug!("{}: {}", step.name, result.message);
                Event::StepMissing(step.on_missing)
            }
            Err(e) => Event::Fault(e),
        }
    }

    /// Locate the step's element and apply its action. Absence is an
    /// unsuccessful result; errors are faults.
    async fn execute_step(&mut self, step: &Step, default_condition: Condition) -> Result<StepResult> {
        let started = Instant::now();
        let timeout = step.timeout_or(self.session.locator_config().default_timeout());
        let condition = step.condition.unwrap_or(default_condition);

        let element = match self.session.locate(&step.locator, timeout, condition).await? {
            LocateOutcome::Found(element) => element,
            LocateOutcome::NotFound => {
                return Ok(StepResult::missing(
                    &step.name,
                    format!("{} not found", step.locator),
                ))
            }
            LocateOutcome::ConditionTimeout => {
                return Ok(StepResult::missing(
                    &step.name,
                    format!("{} never became {:?}", step.locator, condition),
                ))
            }
        };

        let result = match &step.action {
            StepAction::Click => {
                self.session.click(&element).await?;
                StepResult::success(&step.name, format!("clicked {}", step.locator))
            }
            StepAction::DoubleClick => {
                self.session.double_click(&element).await?;
                StepResult::success(&step.name, format!("double-clicked {}", step.locator))
            }
            StepAction::TypeText { text } => {
                let value = text.resolve(&self.variables)?;
                self.session.send_keys(&element, &value).await?;
                StepResult::success(&step.name, format!("typed {:?}", value))
            }
            StepAction::SelectOption { choice } => {
                if self.session.select_option(&element, choice).await? {
                    StepResult::success(&step.name, format!("selected {}", choice))
                } else {
                    StepResult::missing(&step.name, format!("no option {}", choice))
                }
            }
            StepAction::ReadText { into } => {
                let text = self.session.text(&element).await?;
                self.variables.insert(into.clone(), text.clone());
                StepResult::success_with_data(
                    &step.name,
                    format!("{} = {:?}", into, text),
                    serde_json::Value::String(text),
                )
            }
        };

        let settle = step.settle_ms.unwrap_or(self.settings.settle_ms);
        if result.success && settle > 0 {
            tokio::time::sleep(Duration::from_millis(settle)).await;
        }

        Ok(result.with_execution_time(started.elapsed().as_millis() as u64))
    }

    async fn capture(&self, run_id: &str) -> Option<PathBuf> {
        let dir = self.settings.screenshot_dir.as_ref()?;
        let label = format!("{}-{}", self.workflow.name, run_id);

        match ScreenshotManager::save_to_dir(&self.session, dir, &label).await {
            Ok(path) => {
                info!("abort screenshot written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("could not capture abort screenshot: {}", e);
                None
            }
        }
    }
}
