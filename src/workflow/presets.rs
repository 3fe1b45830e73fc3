//! The built-in ServiceNow workflows.

use crate::core::PresetParams;
use crate::errors::{BrowserError, Result};
use crate::types::{Condition, Locator, OptionChoice};
use url::Url;

use super::definition::{FramePath, Workflow};
use super::step::{MappedText, MissingPolicy, Step, StepAction, TextSource};

const ASSIGN_LIST: &str = "nav_to.do?uri=incident_list.do";
const TAG_LIST: &str = "nav_to.do?uri=incident.list";
const MY_ACTIVE_INCIDENTS: &str = "nav_to.do?uri=incident_list.do%3Fsysparm_query%3Dactive%3Dtrue%5Eassigned_to%3Djavascript:gs.getUserID()%5EORDERBYDESCsys_created_on%26sysparm_view%3Dessentials";
const ACTIVE_INCIDENTS: &str = "nav_to.do?uri=incident_list.do%3Fsysparm_query%3Dactive%3Dtrue%5EORDERBYDESCsys_created_on%26sysparm_view%3Ddefault";

const ROW_CELL: &str = "tr[id^='row_incident_'] > *";
const RECORD_LINK: &str = "a.linked.formlink";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    AssignTask,
    EditTag,
    ResolveIncidents,
    UpdateIncidents,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::AssignTask,
        Preset::EditTag,
        Preset::ResolveIncidents,
        Preset::UpdateIncidents,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::AssignTask => "assign-task",
            Preset::EditTag => "edit-tag",
            Preset::ResolveIncidents => "resolve-incidents",
            Preset::UpdateIncidents => "update-incidents",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Preset::AssignTask => "Assign list rows to the implementer mapped from their assignment group",
            Preset::EditTag => "Share tags with the configured group",
            Preset::ResolveIncidents => "Resolve my active incidents with the configured close code and note",
            Preset::UpdateIncidents => "Post a work note asking for an update on active incidents",
        }
    }

    pub fn from_name(name: &str) -> Option<Preset> {
        Self::ALL.into_iter().find(|preset| preset.name() == name)
    }

    pub fn build(&self, params: &PresetParams) -> Result<Workflow> {
        let instance = params.instance()?;
        let steps = match self {
            Preset::AssignTask => assign_task(params),
            Preset::EditTag => edit_tag(params),
            Preset::ResolveIncidents => resolve_incidents(params),
            Preset::UpdateIncidents => update_incidents(params),
        };
        let list = match self {
            Preset::AssignTask => ASSIGN_LIST,
            Preset::EditTag => TAG_LIST,
            Preset::ResolveIncidents => MY_ACTIVE_INCIDENTS,
            Preset::UpdateIncidents => ACTIVE_INCIDENTS,
        };

        let mut workflow = Workflow {
            name: self.name().to_string(),
            description: Some(self.description().to_string()),
            start_url: None,
            setup: vec![],
            list_url: join(instance, list)?,
            frame: Some(FramePath::servicenow()),
            steps,
            max_iterations: params.max_iterations,
            max_reloads: None,
        };

        if let Some(account) = &params.account {
            workflow.start_url = Some(join(instance, "login.do")?);
            workflow.setup.push(
                Step::new(
                    "pick account",
                    Locator::css(format!("[data-test-id='{}']", account.replace('\'', "\\'"))),
                    StepAction::Click,
                )
                .when(Condition::Interactable),
            );
        }

        Ok(workflow)
    }
}

fn join(instance: &Url, path: &str) -> Result<String> {
    instance
        .join(path)
        .map(String::from)
        .map_err(|e| BrowserError::ConfigurationError(format!("{}{}: {}", instance, path, e)))
}

fn open_record() -> Step {
    Step::new("open record", Locator::css(RECORD_LINK), StepAction::Click)
        .on_missing(MissingPolicy::Finish)
}

fn assign_task(params: &PresetParams) -> Vec<Step> {
    vec![
        Step::new(
            "read assignment group",
            Locator::css(format!("{}:nth-child(10)", ROW_CELL)),
            StepAction::ReadText {
                into: "group".to_string(),
            },
        )
        .on_missing(MissingPolicy::Finish),
        Step::new(
            "open assignee cell",
            Locator::css(format!("{}:nth-child(11)", ROW_CELL)),
            StepAction::DoubleClick,
        ),
        Step::new(
            "type assignee",
            Locator::css(r"input#sys_display\.LIST_EDIT_incident\.assigned_to"),
            StepAction::TypeText {
                text: TextSource::Mapped {
                    mapped: MappedText {
                        from: "group".to_string(),
                        table: params.assignees.clone(),
                        default: params.default_assignee.clone(),
                    },
                },
            },
        )
        .timeout(3_000),
        Step::new(
            "confirm assignment",
            Locator::css("a#cell_edit_ok"),
            StepAction::Click,
        )
        .timeout(5_000),
    ]
}

fn edit_tag(params: &PresetParams) -> Vec<Step> {
    vec![
        open_record(),
        Step::new(
            "viewable by",
            Locator::id("label.viewable_by"),
            StepAction::SelectOption {
                choice: OptionChoice::Index(1),
            },
        ),
        Step::new(
            "type group",
            Locator::id("sys_display.label.group_list"),
            StepAction::TypeText {
                text: TextSource::literal(params.tag_group.clone()),
            },
        ),
        Step::new(
            "leave group field",
            Locator::id("sys_display.label.user_list"),
            StepAction::Click,
        ),
        Step::new("update", Locator::id("sysverb_update"), StepAction::Click),
    ]
}

fn resolve_incidents(params: &PresetParams) -> Vec<Step> {
    vec![
        open_record(),
        Step::new(
            "set state",
            Locator::css(r"select#incident\.state"),
            StepAction::SelectOption {
                choice: OptionChoice::VisibleText("Resolved".to_string()),
            },
        ),
        Step::new(
            "resolution tab",
            Locator::css("span.tab_header span.tabs2_tab").with_text("Resolution Information"),
            StepAction::Click,
        )
        .when(Condition::Interactable),
        Step::new(
            "close code",
            Locator::id("incident.close_code"),
            StepAction::SelectOption {
                choice: OptionChoice::VisibleText(params.close_code.clone()),
            },
        ),
        Step::new(
            "resolution note",
            Locator::css(r"textarea#incident\.close_notes"),
            StepAction::TypeText {
                text: TextSource::literal(params.resolution_note.clone()),
            },
        ),
        Step::new("update", Locator::id("sysverb_update"), StepAction::Click),
    ]
}

fn update_incidents(params: &PresetParams) -> Vec<Step> {
    vec![
        open_record(),
        Step::new(
            "work note",
            Locator::id("activity-stream-work_notes-textarea"),
            StepAction::TypeText {
                text: TextSource::literal(params.work_note.clone()),
            },
        ),
        Step::new(
            "post",
            Locator::css("button.btn.btn-default.activity-submit"),
            StepAction::Click,
        ),
    ]
}
