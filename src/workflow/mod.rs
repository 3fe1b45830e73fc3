pub mod definition;
pub mod loader;
pub mod machine;
pub mod presets;
pub mod step;

pub use definition::{FramePath, Workflow};
pub use loader::{load_workflow, parse_var, substitute};
pub use machine::{RunReport, WorkflowRunner, WorkflowState};
pub use presets::Preset;
pub use step::{MappedText, MissingPolicy, Step, StepAction, StepResult, TextSource};
